// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container lifecycle for task runtimes, shelling out to the `docker` CLI.
//!
//! Matches the source's container-adapter shape: lifecycle operations go
//! through a thin subprocess wrapper rather than a client library, and
//! every operation is idempotent by container id — a missing container on
//! `stop`/`remove` is success, not an error.

use async_trait::async_trait;

use crate::error::{AdapterError, AdapterResult};

/// Required labels on every runtime container, used by the orphan
/// reconciler to match containers back to known run ids.
#[derive(Debug, Clone)]
pub struct ContainerLabels {
    pub run_id: Option<String>,
    pub task_id: String,
    pub repo_id: String,
}

/// A freshly created container: its id and the host-reachable endpoint the
/// event listener and RPC client will dial.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub container_id: String,
    pub endpoint: String,
}

/// Container lifecycle operations the Runtime Lifecycle Manager drives.
/// Implementations must be idempotent by container id.
#[async_trait]
pub trait ContainerClient: Send + Sync + 'static {
    async fn create_and_start(
        &self,
        name: &str,
        image: &str,
        labels: &ContainerLabels,
        workspace_path: Option<&str>,
    ) -> AdapterResult<ContainerHandle>;

    /// Stop without removing. A missing container is success.
    async fn stop(&self, container_id: &str) -> AdapterResult<()>;

    /// Start a previously stopped container by id, re-resolving its
    /// endpoint (port mapping may differ after a host restart).
    async fn start(&self, container_id: &str) -> AdapterResult<ContainerHandle>;

    /// Remove (force). A missing container is success.
    async fn remove(&self, container_id: &str) -> AdapterResult<()>;

    /// Force-kill (`SIGKILL`) without graceful stop, used by the zombie/
    /// overdue reaper.
    async fn kill(&self, container_id: &str) -> AdapterResult<()>;

    /// Pull the image if not already present locally. Idempotent.
    async fn ensure_image(&self, image: &str) -> AdapterResult<()>;

    /// List ids of every container this adapter manages, with labels, used
    /// by `ReconcileOrphanedContainers`.
    async fn list_managed(&self) -> AdapterResult<Vec<(String, ContainerLabels)>>;
}

/// `docker` CLI-backed [`ContainerClient`].
#[derive(Debug, Clone, Default)]
pub struct DockerContainerClient {
    /// Label namespace prefix applied to every container this process
    /// manages, so `list_managed` can scope its `docker ps` query.
    managed_label: String,
}

impl DockerContainerClient {
    pub fn new() -> Self {
        Self { managed_label: "oj.managed=true".to_string() }
    }
}

async fn run_docker(args: &[&str]) -> AdapterResult<String> {
    let output = tokio::process::Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| AdapterError::Docker(format!("failed to exec docker: {e}")))?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(AdapterError::Docker(format!("docker {} failed: {}", args.first().unwrap_or(&""), stderr.trim())))
    }
}

/// `docker stop`/`rm`/`kill` on an id that no longer exists returns a
/// distinct "No such container" failure; treat that as success per the
/// idempotency contract rather than propagating it.
fn is_missing_container(message: &str) -> bool {
    message.contains("No such container")
}

#[async_trait]
impl ContainerClient for DockerContainerClient {
    async fn create_and_start(
        &self,
        name: &str,
        image: &str,
        labels: &ContainerLabels,
        workspace_path: Option<&str>,
    ) -> AdapterResult<ContainerHandle> {
        let task_label = format!("taskId={}", labels.task_id);
        let repo_label = format!("repoId={}", labels.repo_id);
        let run_label = labels.run_id.clone().unwrap_or_default();
        let mut args: Vec<&str> =
            vec!["run", "-d", "--name", name, "-P", "--label", &self.managed_label, "--label", &task_label, "--label", &repo_label];
        if labels.run_id.is_some() {
            args.extend_from_slice(&["--label", &run_label]);
        }
        if let Some(path) = workspace_path {
            args.extend_from_slice(&["-v", path]);
        }
        args.push(image);
        let container_id = run_docker(&args).await?;
        let endpoint = resolve_endpoint(&container_id).await?;
        Ok(ContainerHandle { container_id, endpoint })
    }

    async fn stop(&self, container_id: &str) -> AdapterResult<()> {
        match run_docker(&["stop", container_id]).await {
            Ok(_) => Ok(()),
            Err(AdapterError::Docker(msg)) if is_missing_container(&msg) => Ok(()),
            Err(other) => Err(other),
        }
    }

    async fn start(&self, container_id: &str) -> AdapterResult<ContainerHandle> {
        run_docker(&["start", container_id]).await?;
        let endpoint = resolve_endpoint(container_id).await?;
        Ok(ContainerHandle { container_id: container_id.to_string(), endpoint })
    }

    async fn remove(&self, container_id: &str) -> AdapterResult<()> {
        match run_docker(&["rm", "-f", container_id]).await {
            Ok(_) => Ok(()),
            Err(AdapterError::Docker(msg)) if is_missing_container(&msg) => Ok(()),
            Err(other) => Err(other),
        }
    }

    async fn kill(&self, container_id: &str) -> AdapterResult<()> {
        match run_docker(&["kill", container_id]).await {
            Ok(_) => Ok(()),
            Err(AdapterError::Docker(msg)) if is_missing_container(&msg) => Ok(()),
            Err(other) => Err(other),
        }
    }

    async fn ensure_image(&self, image: &str) -> AdapterResult<()> {
        let inspect = tokio::process::Command::new("docker").args(["image", "inspect", image]).output().await;
        if matches!(inspect, Ok(ref o) if o.status.success()) {
            return Ok(());
        }
        run_docker(&["pull", image]).await?;
        Ok(())
    }

    async fn list_managed(&self) -> AdapterResult<Vec<(String, ContainerLabels)>> {
        let ids = run_docker(&["ps", "-aq", "--filter", &format!("label={}", self.managed_label)]).await?;
        let mut out = Vec::new();
        for id in ids.lines().filter(|l| !l.is_empty()) {
            let task_id = inspect_label(id, "taskId").await.unwrap_or_default();
            let repo_id = inspect_label(id, "repoId").await.unwrap_or_default();
            let run_id = inspect_label(id, "runId").await;
            out.push((id.to_string(), ContainerLabels { run_id, task_id, repo_id }));
        }
        Ok(out)
    }
}

async fn inspect_label(container_id: &str, key: &str) -> Option<String> {
    let format = format!("{{{{ index .Config.Labels \"{key}\" }}}}");
    run_docker(&["inspect", "--format", &format, container_id]).await.ok().filter(|v| !v.is_empty())
}

/// Resolve the host-reachable endpoint for a container's published port,
/// via `docker port`. The first published mapping wins; task runtimes
/// expose exactly one RPC port.
async fn resolve_endpoint(container_id: &str) -> AdapterResult<String> {
    let output = run_docker(&["port", container_id]).await?;
    let first_line = output.lines().next().ok_or_else(|| AdapterError::Docker("container published no ports".into()))?;
    let host_part = first_line.split("->").nth(1).unwrap_or(first_line).trim();
    let normalized = if let Some(port) = host_part.strip_prefix("0.0.0.0:") {
        format!("127.0.0.1:{port}")
    } else if let Some(port) = host_part.strip_prefix(":::") {
        format!("127.0.0.1:{port}")
    } else {
        host_part.to_string()
    };
    Ok(format!("http://{normalized}"))
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
