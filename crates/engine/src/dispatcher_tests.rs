use std::sync::Arc;

use oj_adapters::test_support::{FakeContainerClient, FakeRuntimeClient, FakeRuntimeClientFactory};
use oj_adapters::AdapterBundle;
use oj_core::{FakeClock, Repository, Run, RunState, Task, TaskRuntime, TaskRuntimeState};
use oj_storage::InMemoryStore;

use super::{DispatchOutcome, Dispatcher};
use crate::config::DispatcherConfig;
use crate::lifecycle::LifecycleManager;

fn bundle() -> AdapterBundle {
    AdapterBundle {
        containers: Arc::new(FakeContainerClient::new()),
        runtime_clients: Arc::new(FakeRuntimeClientFactory::new(FakeRuntimeClient::new())),
    }
}

fn dispatcher(store: Arc<InMemoryStore>) -> Dispatcher<FakeClock> {
    let clock = FakeClock::new();
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), bundle(), clock.clone(), Default::default()));
    Dispatcher::new(store, bundle(), lifecycle, clock, DispatcherConfig::default())
}

#[tokio::test]
async fn dispatch_uses_existing_runtime_with_capacity() {
    let store = Arc::new(InMemoryStore::new());
    let task = Task::new("demo", "claude-code", "ghcr.io/example/worker:latest");
    let repository = Repository::new("https://example.com/org/repo.git", "main", "/cache/repo");
    store.seed_task(task.clone());
    store.seed_repository(repository.clone());

    let runtime = TaskRuntime {
        id: oj_core::TaskRuntimeId::new(),
        task_id: task.id,
        state: TaskRuntimeState::Ready,
        active_runs: 0,
        max_parallel_runs: 1,
        endpoint: "http://127.0.0.1:9000".into(),
        container_id: Some("c1".into()),
        workspace_path: None,
        runtime_home_path: None,
        last_activity_utc_ms: 0,
        inactive_after_utc_ms: None,
        last_error: None,
        cold_start_count: 1,
        failed_start_count: 0,
        created_at_ms: 0,
    };
    store.upsert_task_runtime(runtime.clone()).await.unwrap();

    let run = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    let run_id = run.id;
    store.insert_run(run.clone()).await.unwrap();

    let dispatcher = dispatcher(store.clone());
    let outcome = dispatcher.dispatch(&repository, &task, run).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Dispatched);
    let stored = store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Running);
    assert_eq!(stored.runtime_id, Some(runtime.id));
}

#[tokio::test]
async fn dispatch_scales_out_when_no_runtime_has_capacity() {
    let store = Arc::new(InMemoryStore::new());
    let task = Task::new("demo", "claude-code", "ghcr.io/example/worker:latest");
    let repository = Repository::new("https://example.com/org/repo.git", "main", "/cache/repo");
    store.seed_task(task.clone());
    store.seed_repository(repository.clone());
    let run = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);

    let dispatcher = dispatcher(store.clone());
    let outcome = dispatcher.dispatch(&repository, &task, run.clone()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Dispatched);
    let runtimes = store.list_task_runtimes().await.unwrap();
    assert_eq!(runtimes.len(), 1);
}

#[tokio::test]
async fn dispatch_next_queued_respects_concurrency_limit() {
    let store = Arc::new(InMemoryStore::new());
    let mut task = Task::new("demo", "claude-code", "ghcr.io/example/worker:latest");
    task.concurrency_limit = 1;
    let repository = Repository::new("https://example.com/org/repo.git", "main", "/cache/repo");
    store.seed_task(task.clone());
    store.seed_repository(repository.clone());

    let mut running = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    running.state = RunState::Running;
    store.insert_run(running).await.unwrap();

    let queued = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 1);
    store.insert_run(queued).await.unwrap();

    let dispatcher = dispatcher(store.clone());
    let dispatched = dispatcher.dispatch_next_queued_for_task(task.id).await.unwrap();

    assert!(!dispatched);
}
