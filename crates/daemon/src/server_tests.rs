use std::sync::Arc;
use std::time::Instant;

use oj_adapters::test_support::{FakeContainerClient, FakeRuntimeClient, FakeRuntimeClientFactory};
use oj_adapters::AdapterBundle;
use oj_core::{Repository, Run, RunState, Task, TaskId};
use oj_engine::config::DaemonConfig;
use oj_storage::{InMemoryStore, Store};
use tokio::net::UnixStream;
use tokio::sync::oneshot;

use super::*;

fn bundle() -> AdapterBundle {
    AdapterBundle { containers: Arc::new(FakeContainerClient::new()), runtime_clients: Arc::new(FakeRuntimeClientFactory::new(FakeRuntimeClient::new())) }
}

async fn test_context() -> (ServerContext, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let supervisor = Arc::new(Supervisor::new(store.clone(), bundle(), &DaemonConfig::default(), "test-daemon"));
    let ctx = ServerContext { supervisor, start_time: Instant::now(), version: "0.0.0-test" };
    (ctx, store)
}

fn task_and_repo() -> (Task, Repository) {
    (Task::new("demo", "claude-code", "ghcr.io/example/worker:latest"), Repository::new("https://example.com/org/repo.git", "main", "/cache/repo"))
}

#[tokio::test]
async fn daemon_status_reports_empty_fleet() {
    let (ctx, _store) = test_context().await;
    let response = handle_request(ControlRequest::DaemonStatus, &ctx).await;
    match response {
        ControlResponse::Status { status } => {
            assert_eq!(status.tasks_configured, 0);
            assert_eq!(status.runtimes_online, 0);
            assert_eq!(status.runs_in_flight, 0);
            assert_eq!(status.version, "0.0.0-test");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn get_run_returns_not_found_for_unknown_id() {
    let (ctx, _store) = test_context().await;
    let response = handle_request(ControlRequest::GetRun { id: "does-not-exist".to_string() }, &ctx).await;
    match response {
        ControlResponse::NotFound { id } => assert_eq!(id, "does-not-exist"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn get_run_returns_run_by_id() {
    let (ctx, store) = test_context().await;
    let (task, repository) = task_and_repo();
    let run = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    let run_id = run.id;
    store.insert_run(run).await.unwrap();

    let response = handle_request(ControlRequest::GetRun { id: run_id.to_string() }, &ctx).await;
    match response {
        ControlResponse::Run { run } => assert_eq!(run.id, run_id),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn list_runs_filters_by_state() {
    let (ctx, store) = test_context().await;
    let (task, repository) = task_and_repo();
    let queued = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    let mut running = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 1);
    running.state = RunState::Running;
    store.insert_run(queued).await.unwrap();
    store.insert_run(running.clone()).await.unwrap();

    let response = handle_request(ControlRequest::ListRuns { task_id: None, state: Some(RunState::Running) }, &ctx).await;
    match response {
        ControlResponse::Runs { runs } => {
            assert_eq!(runs.len(), 1);
            assert_eq!(runs[0].id, running.id);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn list_runs_filters_by_task_id_for_unknown_task() {
    let (ctx, _store) = test_context().await;
    let response = handle_request(ControlRequest::ListRuns { task_id: Some(TaskId::new().to_string()), state: None }, &ctx).await;
    match response {
        ControlResponse::Runs { runs } => assert!(runs.is_empty()),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn list_incidents_is_empty_for_a_quiet_fleet() {
    let (ctx, _store) = test_context().await;
    let response = handle_request(ControlRequest::ListIncidents { runtime_id: None }, &ctx).await;
    match response {
        ControlResponse::Incidents { incidents } => assert!(incidents.is_empty()),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn get_task_runtime_returns_not_found_for_unknown_id() {
    let (ctx, _store) = test_context().await;
    let id = oj_core::TaskRuntimeId::new().to_string();
    let response = handle_request(ControlRequest::GetTaskRuntime { id: id.clone() }, &ctx).await;
    match response {
        ControlResponse::NotFound { id: returned } => assert_eq!(returned, id),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn control_server_round_trips_a_request_over_the_socket() {
    let (ctx, _store) = test_context().await;
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("control.sock");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_ctx = ctx.clone();
    let path_for_server = socket_path.clone();
    let server = tokio::spawn(async move { run_control_server(&path_for_server, server_ctx, shutdown_rx).await });

    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    oj_wire::write_message(&mut stream, &ControlRequest::DaemonStatus).await.unwrap();
    let response: ControlResponse = oj_wire::read_message(&mut stream).await.unwrap();
    assert!(matches!(response, ControlResponse::Status { .. }));

    drop(stream);
    let _ = shutdown_tx.send(());
    server.await.unwrap().unwrap();
}
