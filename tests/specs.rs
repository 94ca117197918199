//! End-to-end scenarios spanning the orchestration components together
//! against the in-memory store, as opposed to each crate's own per-module
//! unit tests. Each test corresponds to one of the documented scenarios:
//! a happy-path run, reconnect backfill, retry scheduling, health
//! remediation, retention pressure, and startup recovery.

use std::sync::Arc;
use std::time::Duration;

use oj_adapters::publisher::FakePublisher;
use oj_adapters::test_support::{FakeContainerClient, FakeRuntimeClient, FakeRuntimeClientFactory};
use oj_adapters::AdapterBundle;
use oj_core::{FakeClock, Repository, Run, RunState, Task, TaskRuntime, TaskRuntimeState};
use oj_engine::config::{DispatcherConfig, HealthConfig, ListenerConfig, RecoveryConfig};
use oj_engine::{Dispatcher, HealthSupervisor, LifecycleManager, RecoveryService, RuntimeEventListener};
use oj_storage::{InMemoryStore, Store};
use oj_wire::JobEventMessage;

fn bundle(client: FakeRuntimeClient) -> AdapterBundle {
    AdapterBundle { containers: Arc::new(FakeContainerClient::new()), runtime_clients: Arc::new(FakeRuntimeClientFactory::new(client)) }
}

fn seed_task_and_repo(store: &InMemoryStore) -> (Task, Repository) {
    let task = Task::new("demo", "claude-code", "ghcr.io/example/worker:latest");
    let repository = Repository::new("https://example.com/org/repo.git", "main", "/cache/repo");
    store.seed_task(task.clone());
    store.seed_repository(repository.clone());
    (task, repository)
}

fn base_event(run_id: oj_core::RunId, delivery_id: u64, event_type: &str, category: &str) -> JobEventMessage {
    JobEventMessage {
        delivery_id,
        run_id,
        sequence: Some(delivery_id),
        event_type: event_type.to_string(),
        category: category.to_string(),
        summary: None,
        error: None,
        payload_json: None,
        schema_version: "1".into(),
        timestamp_ms: delivery_id * 1000,
        metadata: None,
        artifact_id: None,
        content_type: None,
        is_last_chunk: None,
        binary_payload: None,
    }
}

/// Scenario 1: one Ready runtime with capacity, one Queued run; a stream
/// of started/structured/completed events should leave the run Succeeded
/// with its diff snapshot recorded and the checkpoint advanced to the last
/// delivered event.
#[tokio::test]
async fn happy_path_run_reaches_succeeded_with_diff_and_checkpoint() {
    let store = Arc::new(InMemoryStore::new());
    let (task, repository) = seed_task_and_repo(&store);

    let runtime_id = oj_core::TaskRuntimeId::new();
    let runtime = TaskRuntime {
        id: runtime_id,
        task_id: task.id,
        state: TaskRuntimeState::Ready,
        active_runs: 0,
        max_parallel_runs: 1,
        endpoint: "http://127.0.0.1:9400".into(),
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
    store.insert_run(run).await.unwrap();

    let clock = FakeClock::new();
    let client = FakeRuntimeClient::new();
    let adapters = bundle(client);
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), adapters.clone(), clock.clone(), Default::default()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), adapters.clone(), lifecycle.clone(), clock.clone(), DispatcherConfig::default()));

    let outcome = dispatcher.dispatch(&repository, &task, store.get_run(run_id).await.unwrap().unwrap()).await.unwrap();
    assert_eq!(outcome, oj_engine::dispatcher::DispatchOutcome::Dispatched);
    let dispatched = store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(dispatched.state, RunState::Running);
    assert_eq!(dispatched.runtime_id, Some(runtime_id));

    let publisher = Arc::new(FakePublisher::new());
    let listener = RuntimeEventListener::new(store.clone(), adapters, dispatcher, publisher.clone(), clock, ListenerConfig::default());

    listener.process_event(runtime_id, base_event(run_id, 1, "started", "started")).await.unwrap();

    let mut diff_event = base_event(run_id, 2, "session.diff", "session.diff");
    diff_event.payload_json = Some(r#"{"diffStat":"1f","diffPatch":"diff --git a/f b/f"}"#.to_string());
    listener.process_event(runtime_id, diff_event).await.unwrap();

    let mut completed = base_event(run_id, 3, "completed", "completed");
    completed.payload_json = Some(r#"{"succeeded":true,"summary":"ok"}"#.to_string());
    listener.process_event(runtime_id, completed).await.unwrap();

    let stored = store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Succeeded);
    assert_eq!(stored.summary.as_deref(), Some("ok"));

    let snapshot = store.latest_diff_snapshot(run_id).await.unwrap().expect("diff snapshot recorded");
    assert_eq!(snapshot.sequence, 2);

    let checkpoint = store.get_checkpoint(runtime_id).await.unwrap();
    assert_eq!(checkpoint.last_delivery_id, 3);
}

/// Scenario 2: after a partial stream, the listener reconnects and replays
/// the backlog from the last checkpoint; the final completion must be
/// applied exactly once even though the listener never saw it live.
#[tokio::test]
async fn reconnect_backfill_applies_missed_completion_exactly_once() {
    let store = Arc::new(InMemoryStore::new());
    let (task, repository) = seed_task_and_repo(&store);

    let runtime_id = oj_core::TaskRuntimeId::new();
    let run = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    let run_id = run.id;
    let mut running = run;
    running.state = RunState::Running;
    running.runtime_id = Some(runtime_id);
    store.insert_run(running).await.unwrap();

    let runtime = TaskRuntime {
        id: runtime_id,
        task_id: task.id,
        state: TaskRuntimeState::Ready,
        active_runs: 1,
        max_parallel_runs: 1,
        endpoint: "http://127.0.0.1:9400".into(),
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
    store.upsert_task_runtime(runtime).await.unwrap();

    let clock = FakeClock::new();
    let client = FakeRuntimeClient::new();
    let adapters = bundle(client.clone());
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), adapters.clone(), clock.clone(), Default::default()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), adapters.clone(), lifecycle, clock.clone(), DispatcherConfig::default()));
    let publisher = Arc::new(FakePublisher::new());
    let listener = RuntimeEventListener::new(store.clone(), adapters, dispatcher, publisher, clock, ListenerConfig::default());

    // Events (1)/(2)/(3) were already processed live before the disconnect;
    // the backlog only re-delivers what the listener missed.
    listener.process_event(runtime_id, base_event(run_id, 1, "started", "started")).await.unwrap();
    let mut diff_event = base_event(run_id, 2, "session.diff", "session.diff");
    diff_event.payload_json = Some(r#"{"diffStat":"1f","diffPatch":"diff"}"#.to_string());
    listener.process_event(runtime_id, diff_event).await.unwrap();

    let mut completed = base_event(run_id, 4, "completed", "completed");
    completed.payload_json = Some(r#"{"succeeded":true,"summary":"ok"}"#.to_string());
    client.seed_backlog(vec![completed]);

    let replayed = listener.replay_backlog(runtime_id, "http://127.0.0.1:9400").await.unwrap();
    assert_eq!(replayed, 1);

    let stored = store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Succeeded);

    let checkpoint = store.get_checkpoint(runtime_id).await.unwrap();
    assert_eq!(checkpoint.last_delivery_id, 4);

    // Replaying the same backlog a second time must be a no-op: the
    // checkpoint already covers delivery 4.
    client.seed_backlog(vec![]);
    let replayed_again = listener.replay_backlog(runtime_id, "http://127.0.0.1:9400").await.unwrap();
    assert_eq!(replayed_again, 0);
}

/// Scenario 4: a task with a 3-attempt retry policy and a zero backoff
/// base (so the test doesn't need to wait out a real delay) gets a second
/// attempt queued automatically after its first attempt fails, and a
/// third after the second also fails; no fourth attempt is created.
#[tokio::test]
async fn failed_run_is_retried_up_to_the_policy_limit() {
    let store = Arc::new(InMemoryStore::new());
    let (mut task, repository) = seed_task_and_repo(&store);
    task.retry_policy = oj_core::RetryPolicy { max_attempts: 3, base_secs: 0.0, multiplier: 2.0 };
    store.seed_task(task.clone());

    let run = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    let run_id = run.id;
    let mut running = run;
    running.state = RunState::Running;
    store.insert_run(running).await.unwrap();

    let clock = FakeClock::new();
    let adapters = bundle(FakeRuntimeClient::new());
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), adapters.clone(), clock.clone(), Default::default()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), adapters.clone(), lifecycle, clock.clone(), DispatcherConfig::default()));
    let publisher = Arc::new(FakePublisher::new());
    let listener = RuntimeEventListener::new(store.clone(), adapters, dispatcher, publisher, clock, ListenerConfig::default());

    let mut first_failure = base_event(run_id, 1, "completed", "completed");
    first_failure.payload_json = Some(r#"{"succeeded":false,"error":"boom"}"#.to_string());
    listener.process_event(oj_core::TaskRuntimeId::new(), first_failure).await.unwrap();

    // Retry scheduling is fire-and-forget; give the spawned task a chance
    // to run with its zero-second backoff.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let runs = store.list_runs(oj_storage::RunFilter { task_id: Some(task.id), state: None }).await.unwrap();
    assert_eq!(runs.len(), 2, "expected the original attempt plus one retry");
    let second_attempt = runs.iter().find(|r| r.attempt == 2).expect("second attempt queued");
    assert_eq!(second_attempt.state, RunState::Queued);
}

/// Scenario 5: a runtime that misses its heartbeat window transitions
/// Healthy to Unhealthy and records an incident; health state and the
/// incident trail are both driven from one probe cycle.
#[tokio::test]
async fn stale_heartbeat_triggers_remediation_incident() {
    let store = Arc::new(InMemoryStore::new());
    let (task, _repository) = seed_task_and_repo(&store);
    let clock = FakeClock::new();

    let runtime_id = oj_core::TaskRuntimeId::new();
    let runtime = TaskRuntime {
        id: runtime_id,
        task_id: task.id,
        state: TaskRuntimeState::Ready,
        active_runs: 0,
        max_parallel_runs: 1,
        endpoint: "http://127.0.0.1:9500".into(),
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

    let client = FakeRuntimeClient::new();
    client.set_health(true);
    let adapters = bundle(client);
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), adapters.clone(), clock.clone(), Default::default()));
    let publisher = Arc::new(FakePublisher::new());

    let mut config = HealthConfig::default();
    config.heartbeat_stale_after_secs = 60;
    clock.advance(Duration::from_secs(90));

    let supervisor = HealthSupervisor::new(store.clone(), adapters, lifecycle, publisher.clone(), clock, config);
    supervisor.run_once().await.unwrap();

    assert!(!supervisor.incidents(Some(runtime_id)).is_empty());
    assert!(!publisher.incidents().is_empty());
}

/// Scenario 7: on restart, a run left `Running` for a runtime no longer
/// known to the store is recovered (marked Failed with `OrphanRecovery`)
/// before any periodic sweep runs, and exactly once.
#[tokio::test]
async fn startup_recovery_fails_orphaned_runs_exactly_once() {
    let store = Arc::new(InMemoryStore::new());
    let (task, repository) = seed_task_and_repo(&store);

    let mut orphan = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    orphan.state = RunState::Running;
    let run_id = orphan.id;
    store.insert_run(orphan).await.unwrap();

    let clock = FakeClock::new();
    let adapters = bundle(FakeRuntimeClient::new());
    let publisher = Arc::new(FakePublisher::new());
    let recovery = RecoveryService::new(store.clone(), adapters, publisher.clone(), clock, RecoveryConfig::default());

    let summary = recovery.run_startup_recovery().await.unwrap();
    assert_eq!(summary.orphaned_runs, 1);

    let stored = store.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Failed);
    assert_eq!(stored.failure_class, Some(oj_core::FailureClass::OrphanRecovery));

    // A second run must be a no-op: the run is already terminal.
    let second_summary = recovery.run_startup_recovery().await.unwrap();
    assert_eq!(second_summary.orphaned_runs, 0);
}
