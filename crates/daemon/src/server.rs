// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control socket: a length-prefixed JSON request/response loop over a
//! Unix domain socket. Every request maps 1:1 to a core operation from
//! `oj-engine` — this module does no business logic of its own, matching
//! the local operator surface this codebase's control protocol describes.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use oj_core::{CoreError, RunId, TaskId, TaskRuntimeId};
use oj_storage::{RunFilter, Store};
use oj_wire::{ControlRequest, ControlResponse, DaemonStatusReport, IncidentSummary};
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::supervisor::Supervisor;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind control socket at {path}: {source}")]
    Bind { path: String, source: std::io::Error },
    #[error("failed to remove stale socket at {path}: {source}")]
    RemoveStale { path: String, source: std::io::Error },
}

/// Shared context every connection handler reads from; cheap to clone
/// (everything behind it is already an `Arc`).
#[derive(Clone)]
pub struct ServerContext {
    pub supervisor: Arc<Supervisor>,
    pub start_time: Instant,
    pub version: &'static str,
}

/// Binds the control socket and serves connections until `shutdown` fires.
/// A stale socket file left behind by a crashed daemon is removed before
/// binding, since a Unix listener refuses to bind over an existing path.
pub async fn run_control_server(socket_path: &Path, ctx: ServerContext, mut shutdown: oneshot::Receiver<()>) -> Result<(), ServerError> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path).map_err(|source| ServerError::RemoveStale { path: socket_path.display().to_string(), source })?;
    }
    if let Some(parent) = socket_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let listener = UnixListener::bind(socket_path).map_err(|source| ServerError::Bind { path: socket_path.display().to_string(), source })?;
    info!(path = %socket_path.display(), "control socket listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &ctx).await {
                                debug!(error = %e, "control connection closed with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "control socket accept failed"),
                }
            }
            _ = &mut shutdown => {
                info!("control socket shutting down");
                break;
            }
        }
    }
    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

async fn handle_connection(mut stream: UnixStream, ctx: &ServerContext) -> Result<(), oj_wire::FramingError> {
    let request: ControlRequest = oj_wire::read_message(&mut stream).await?;
    if request.is_read_only() {
        debug!(?request, "control request");
    } else {
        info!(?request, "control request");
    }
    let response = handle_request(request, ctx).await;
    oj_wire::write_message(&mut stream, &response).await
}

async fn handle_request(request: ControlRequest, ctx: &ServerContext) -> ControlResponse {
    let store = ctx.supervisor.store.as_ref();
    match dispatch(request, ctx, store).await {
        Ok(response) => response,
        Err(e) => core_error_response(e),
    }
}

async fn dispatch(request: ControlRequest, ctx: &ServerContext, store: &dyn Store) -> Result<ControlResponse, CoreError> {
    match request {
        ControlRequest::ListTaskRuntimes => {
            let runtimes = store.list_task_runtimes().await?;
            Ok(ControlResponse::TaskRuntimes { runtimes })
        }
        ControlRequest::GetTaskRuntime { id } => match store.get_task_runtime(TaskRuntimeId::from_string(&id)).await? {
            Some(runtime) => Ok(ControlResponse::TaskRuntime { runtime }),
            None => Ok(ControlResponse::NotFound { id }),
        },
        ControlRequest::RestartTaskRuntime { id } => {
            let runtime = ctx.supervisor.lifecycle.restart_task_runtime(TaskRuntimeId::from_string(&id)).await?;
            Ok(ControlResponse::TaskRuntime { runtime })
        }
        ControlRequest::RecycleTaskRuntime { id } => {
            let runtime = ctx.supervisor.lifecycle.recycle_task_runtime(TaskRuntimeId::from_string(&id)).await?;
            Ok(ControlResponse::TaskRuntime { runtime })
        }
        ControlRequest::SetTaskRuntimeDraining { id, draining } => {
            let runtime = ctx.supervisor.lifecycle.set_task_runtime_draining(TaskRuntimeId::from_string(&id), draining).await?;
            Ok(ControlResponse::TaskRuntime { runtime })
        }
        ControlRequest::ListRuns { task_id, state } => {
            let filter = RunFilter { task_id: task_id.map(|id| TaskId::from_string(&id)), state };
            let runs = store.list_runs(filter).await?;
            Ok(ControlResponse::Runs { runs })
        }
        ControlRequest::GetRun { id } => match store.get_run(RunId::from_string(&id)).await? {
            Some(run) => Ok(ControlResponse::Run { run }),
            None => Ok(ControlResponse::NotFound { id }),
        },
        ControlRequest::ListIncidents { runtime_id } => {
            let incidents = ctx
                .supervisor
                .health
                .incidents(runtime_id.map(|id| TaskRuntimeId::from_string(&id)))
                .into_iter()
                .map(|incident| IncidentSummary { runtime_id: incident.runtime_id.to_string(), occurred_at_ms: incident.occurred_at_ms, detail: incident.detail })
                .collect();
            Ok(ControlResponse::Incidents { incidents })
        }
        ControlRequest::DaemonStatus => {
            let tasks_configured = store.list_tasks().await?.len() as u32;
            let runtimes = store.list_task_runtimes().await?;
            let runtimes_online = runtimes.iter().filter(|r| r.state != oj_core::TaskRuntimeState::Stopped).count() as u32;
            let runs_in_flight = store.list_runs(RunFilter { task_id: None, state: Some(oj_core::RunState::Running) }).await?.len() as u32;
            Ok(ControlResponse::Status {
                status: DaemonStatusReport {
                    version: ctx.version.to_string(),
                    uptime_secs: ctx.start_time.elapsed().as_secs(),
                    tasks_configured,
                    runtimes_online,
                    runs_in_flight,
                },
            })
        }
    }
}

fn core_error_response(e: CoreError) -> ControlResponse {
    warn!(error = %e, "control request failed");
    ControlResponse::Error { message: e.to_string() }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
