use std::sync::Arc;

use oj_adapters::test_support::{FakeContainerClient, FakeRuntimeClient, FakeRuntimeClientFactory};
use oj_adapters::AdapterBundle;
use oj_core::{FakeClock, Repository, Run, RunState, Task};
use oj_storage::InMemoryStore;

use super::QueueDrainer;
use crate::config::{DispatcherConfig, QueueDrainerConfig};
use crate::dispatcher::Dispatcher;
use crate::lifecycle::LifecycleManager;

fn bundle() -> AdapterBundle {
    AdapterBundle {
        containers: Arc::new(FakeContainerClient::new()),
        runtime_clients: Arc::new(FakeRuntimeClientFactory::new(FakeRuntimeClient::new())),
    }
}

#[tokio::test]
async fn run_once_dispatches_each_task_with_a_queued_run() {
    let store = Arc::new(InMemoryStore::new());
    let clock = FakeClock::new();
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), bundle(), clock.clone(), Default::default()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), bundle(), lifecycle, clock, DispatcherConfig::default()));
    let drainer = QueueDrainer::new(store.clone(), dispatcher, QueueDrainerConfig::default());

    let task = Task::new("demo", "claude-code", "ghcr.io/example/worker:latest");
    let repository = Repository::new("https://example.com/org/repo.git", "main", "/cache/repo");
    store.seed_task(task.clone());
    store.seed_repository(repository.clone());
    let run = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    let run_id = run.id;
    store.insert_run(run).await.unwrap();

    let dispatched = drainer.run_once().await.unwrap();

    assert_eq!(dispatched, 1);
    let stored = store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Running);
}

#[tokio::test]
async fn run_once_is_a_noop_when_nothing_is_queued() {
    let store = Arc::new(InMemoryStore::new());
    let clock = FakeClock::new();
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), bundle(), clock.clone(), Default::default()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), bundle(), lifecycle, clock, DispatcherConfig::default()));
    let drainer = QueueDrainer::new(store, dispatcher, QueueDrainerConfig::default());

    assert_eq!(drainer.run_once().await.unwrap(), 0);
}
