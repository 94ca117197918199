use std::sync::Arc;

use oj_adapters::publisher::FakePublisher;
use oj_adapters::test_support::{FakeContainerClient, FakeRuntimeClient, FakeRuntimeClientFactory};
use oj_adapters::AdapterBundle;
use oj_core::{FakeClock, Repository, Run, RunState, Task, TaskRuntime, TaskRuntimeState};
use oj_storage::InMemoryStore;
use oj_wire::JobEventMessage;
use sha2::Digest;

use super::RuntimeEventListener;
use crate::config::ListenerConfig;
use crate::dispatcher::Dispatcher;
use crate::lifecycle::LifecycleManager;

fn bundle(client: FakeRuntimeClient) -> AdapterBundle {
    AdapterBundle { containers: Arc::new(FakeContainerClient::new()), runtime_clients: Arc::new(FakeRuntimeClientFactory::new(client)) }
}

fn listener(store: Arc<InMemoryStore>, client: FakeRuntimeClient, publisher: Arc<FakePublisher>) -> RuntimeEventListener<FakeClock> {
    let clock = FakeClock::new();
    let adapters = bundle(client);
    let lifecycle = Arc::new(LifecycleManager::new(store.clone(), adapters.clone(), clock.clone(), Default::default()));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), adapters.clone(), lifecycle, clock.clone(), Default::default()));
    RuntimeEventListener::new(store, adapters, dispatcher, publisher, clock, ListenerConfig::default())
}

fn base_event(run_id: oj_core::RunId, delivery_id: u64, event_type: &str, category: &str) -> JobEventMessage {
    JobEventMessage {
        delivery_id,
        run_id,
        sequence: Some(delivery_id),
        event_type: event_type.to_string(),
        category: category.to_string(),
        summary: Some("did a thing".into()),
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

async fn seed_run(store: &InMemoryStore) -> (oj_core::TaskRuntimeId, Run) {
    let task = Task::new("demo", "claude-code", "ghcr.io/example/worker:latest");
    let repository = Repository::new("https://example.com/org/repo.git", "main", "/cache/repo");
    store.seed_task(task.clone());
    store.seed_repository(repository.clone());

    let runtime_id = oj_core::TaskRuntimeId::new();
    let runtime = TaskRuntime {
        id: runtime_id,
        task_id: task.id,
        state: TaskRuntimeState::Ready,
        active_runs: 1,
        max_parallel_runs: 1,
        endpoint: "http://127.0.0.1:9200".into(),
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

    let mut run = Run::new_queued(repository.id, task.id, "autonomous", "jsonl", 0);
    run.runtime_id = Some(runtime_id);
    run.state = RunState::Running;
    store.insert_run(run.clone()).await.unwrap();
    (runtime_id, run)
}

#[tokio::test]
async fn duplicate_delivery_is_dropped_by_checkpoint() {
    let store = Arc::new(InMemoryStore::new());
    let (runtime_id, run) = seed_run(&store).await;
    let publisher = Arc::new(FakePublisher::new());
    let listener = listener(store.clone(), FakeRuntimeClient::new(), publisher);

    let event = base_event(run.id, 1, "log", "log");
    listener.process_event(runtime_id, event.clone()).await.unwrap();
    listener.process_event(runtime_id, event).await.unwrap();

    let logs = store.list_log_events(run.id).await.unwrap();
    assert_eq!(logs.len(), 1);

    let checkpoint = store.get_checkpoint(runtime_id).await.unwrap();
    assert_eq!(checkpoint.last_delivery_id, 1);
}

#[tokio::test]
async fn structured_event_is_appended_and_projected_into_diff_snapshot() {
    let store = Arc::new(InMemoryStore::new());
    let (runtime_id, run) = seed_run(&store).await;
    let publisher = Arc::new(FakePublisher::new());
    let listener = listener(store.clone(), FakeRuntimeClient::new(), publisher.clone());

    let mut event = base_event(run.id, 1, "session.diff", "session.diff");
    event.payload_json = Some(r#"{"diffStat":"+1 -0","diffPatch":"diff --git a/x b/x"}"#.to_string());
    listener.process_event(runtime_id, event).await.unwrap();

    let snapshot = store.latest_diff_snapshot(run.id).await.unwrap().expect("diff snapshot recorded");
    assert_eq!(snapshot.diff_stat, "+1 -0");
    assert_eq!(snapshot.sequence, 1);

    let deltas = publisher.run_deltas();
    assert!(deltas.iter().any(|d| d.kind == "diff"));
}

#[tokio::test]
async fn tool_events_are_projected_across_start_and_completion() {
    let store = Arc::new(InMemoryStore::new());
    let (runtime_id, run) = seed_run(&store).await;
    let publisher = Arc::new(FakePublisher::new());
    let listener = listener(store.clone(), FakeRuntimeClient::new(), publisher);

    let mut start = base_event(run.id, 1, "tool.started", "tool.started");
    start.payload_json = Some(r#"{"toolCallId":"call-1","toolName":"grep","inputJson":{"pattern":"x"}}"#.to_string());
    listener.process_event(runtime_id, start).await.unwrap();

    let mut end = base_event(run.id, 2, "tool.result", "tool.result");
    end.payload_json = Some(r#"{"toolCallId":"call-1","succeeded":true,"outputJson":{"matches":3}}"#.to_string());
    listener.process_event(runtime_id, end).await.unwrap();

    let projections = store.list_tool_projections(run.id).await.unwrap();
    assert_eq!(projections.len(), 1);
    let projection = &projections[0];
    assert_eq!(projection.sequence_start, 1);
    assert_eq!(projection.sequence_end, Some(2));
    assert_eq!(projection.status, oj_core::ToolCallStatus::Succeeded);
}

#[tokio::test]
async fn artifact_manifest_chunk_commit_assembles_and_verifies_hash() {
    let store = Arc::new(InMemoryStore::new());
    let (runtime_id, run) = seed_run(&store).await;
    let publisher = Arc::new(FakePublisher::new());
    let listener = listener(store.clone(), FakeRuntimeClient::new(), publisher);

    let data = b"hello artifact world".to_vec();
    let sha256 = format!("{:x}", sha2::Sha256::digest(&data));

    let mut manifest = base_event(run.id, 1, "artifact_manifest", "artifact");
    manifest.artifact_id = Some("out.txt".into());
    manifest.payload_json = Some(format!(r#"{{"sha256":"{sha256}","sizeBytes":{}}}"#, data.len()));
    listener.process_event(runtime_id, manifest).await.unwrap();

    let mut chunk = base_event(run.id, 2, "artifact_chunk", "artifact");
    chunk.artifact_id = Some("out.txt".into());
    chunk.binary_payload = Some(data.clone());
    listener.process_event(runtime_id, chunk).await.unwrap();

    let mut commit = base_event(run.id, 3, "artifact_commit", "artifact");
    commit.artifact_id = Some("out.txt".into());
    listener.process_event(runtime_id, commit).await.unwrap();

    let artifacts = store.list_artifacts(run.id).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].sha256, sha256);
    assert_eq!(artifacts[0].size_bytes, data.len() as u64);
}

#[tokio::test]
async fn completed_event_marks_run_terminal_and_dispatches_next_queued() {
    let store = Arc::new(InMemoryStore::new());
    let (runtime_id, run) = seed_run(&store).await;
    let publisher = Arc::new(FakePublisher::new());
    let listener = listener(store.clone(), FakeRuntimeClient::new(), publisher.clone());

    let mut event = base_event(run.id, 1, "completed", "completed");
    event.payload_json = Some(format!(r#"{{"run_id":"{}","succeeded":true,"summary":"done"}}"#, run.id));
    listener.process_event(runtime_id, event).await.unwrap();

    let stored = store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Succeeded);
    let deltas = publisher.run_deltas();
    assert!(deltas.iter().any(|d| d.kind == "status"));
}

#[tokio::test]
async fn replay_backlog_pages_until_exhausted_and_advances_checkpoint() {
    let store = Arc::new(InMemoryStore::new());
    let (runtime_id, run) = seed_run(&store).await;
    let client = FakeRuntimeClient::new();
    client.seed_backlog(vec![base_event(run.id, 1, "log", "log"), base_event(run.id, 2, "log", "log"), base_event(run.id, 3, "log", "log")]);
    let publisher = Arc::new(FakePublisher::new());
    let listener = listener(store.clone(), client, publisher);

    let replayed = listener.replay_backlog(runtime_id, "http://127.0.0.1:9200").await.unwrap();

    assert_eq!(replayed, 3);
    let checkpoint = store.get_checkpoint(runtime_id).await.unwrap();
    assert_eq!(checkpoint.last_delivery_id, 3);
    assert_eq!(store.list_log_events(run.id).await.unwrap().len(), 3);
}
