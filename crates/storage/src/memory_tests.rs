use super::*;
use oj_core::{RepositoryId, RunState};

fn sample_run(task_id: TaskId) -> Run {
    Run::new_queued(RepositoryId::new(), task_id, "agentic", "json-lines", 1_000)
}

#[tokio::test]
async fn mark_run_terminal_is_idempotent_across_calls() {
    let store = InMemoryStore::new();
    let run = sample_run(TaskId::new());
    let id = run.id;
    store.insert_run(run).await.unwrap();

    let first = store.mark_run_terminal(id, RunState::Succeeded, Some("ok".into()), None, None, None, 2_000).await.unwrap();
    let second = store.mark_run_terminal(id, RunState::Failed, Some("overwrite".into()), None, None, None, 3_000).await.unwrap();

    assert!(first);
    assert!(!second);
    let stored = store.get_run(id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Succeeded);
    assert_eq!(stored.summary.as_deref(), Some("ok"));
}

#[tokio::test]
async fn mark_run_terminal_on_unknown_run_is_false_not_error() {
    let store = InMemoryStore::new();
    let found = store.mark_run_terminal(RunId::new(), RunState::Succeeded, None, None, None, None, 1_000).await.unwrap();
    assert!(!found);
}

#[tokio::test]
async fn append_structured_event_dedupes_on_sequence() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();
    let event = RunStructuredEvent {
        run_id,
        sequence: 1,
        event_type: "structured".into(),
        category: "tool.begin".into(),
        summary: None,
        error: None,
        payload_json: "{}".into(),
        schema_version: 1,
        timestamp_ms: 1_000,
    };
    assert!(store.append_structured_event(event.clone()).await.unwrap());
    assert!(!store.append_structured_event(event).await.unwrap());
    assert_eq!(store.list_structured_events(run_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn upsert_diff_snapshot_never_lets_an_older_sequence_win() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();
    store
        .upsert_diff_snapshot(RunDiffSnapshot { run_id, sequence: 5, diff_stat: "5f".into(), diff_patch: "new".into(), schema_version: 1 })
        .await
        .unwrap();
    store
        .upsert_diff_snapshot(RunDiffSnapshot { run_id, sequence: 2, diff_stat: "2f".into(), diff_patch: "stale".into(), schema_version: 1 })
        .await
        .unwrap();

    let latest = store.latest_diff_snapshot(run_id).await.unwrap().unwrap();
    assert_eq!(latest.sequence, 5);
    assert_eq!(latest.diff_patch, "new");
}

#[tokio::test]
async fn save_artifact_dedupes_by_run_and_file_name() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();
    store.save_artifact(Artifact { run_id, file_name: "out.bin".into(), sha256: "a".into(), size_bytes: 10 }).await.unwrap();
    store.save_artifact(Artifact { run_id, file_name: "out.bin".into(), sha256: "b".into(), size_bytes: 20 }).await.unwrap();

    let artifacts = store.list_artifacts(run_id).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].sha256, "b");
}

#[tokio::test]
async fn acquire_lease_is_reclaimable_once_expired_or_by_the_same_owner() {
    let store = InMemoryStore::new();
    assert!(store.acquire_lease("maintenance-task-cleanup", "daemon-a", 2_000, 1_000).await.unwrap());
    assert!(!store.acquire_lease("maintenance-task-cleanup", "daemon-b", 4_000, 1_500).await.unwrap());
    assert!(store.acquire_lease("maintenance-task-cleanup", "daemon-a", 4_000, 1_500).await.unwrap());
    assert!(store.acquire_lease("maintenance-task-cleanup", "daemon-b", 9_000, 3_000).await.unwrap());
}

#[tokio::test]
async fn release_lease_only_succeeds_for_the_current_owner() {
    let store = InMemoryStore::new();
    store.acquire_lease("retention", "daemon-a", 5_000, 1_000).await.unwrap();
    store.release_lease("retention", "daemon-b").await.unwrap();
    assert!(store.get_lease("retention").await.unwrap().is_some());
    store.release_lease("retention", "daemon-a").await.unwrap();
    assert!(store.get_lease("retention").await.unwrap().is_none());
}

#[tokio::test]
async fn checkpoint_round_trips_and_defaults_to_fresh() {
    let store = InMemoryStore::new();
    let runtime_id = TaskRuntimeId::new();
    let fresh = store.get_checkpoint(runtime_id).await.unwrap();
    assert_eq!(fresh.last_delivery_id, 0);

    store.save_checkpoint(TaskRuntimeEventCheckpoint { runtime_id, last_delivery_id: 7 }).await.unwrap();
    assert_eq!(store.get_checkpoint(runtime_id).await.unwrap().last_delivery_id, 7);
}

#[tokio::test]
async fn oldest_queued_run_picks_the_earliest_created_at() {
    let store = InMemoryStore::new();
    let task_id = TaskId::new();
    let mut older = sample_run(task_id);
    older.created_at_ms = 500;
    let mut newer = sample_run(task_id);
    newer.created_at_ms = 1_500;
    store.insert_run(newer).await.unwrap();
    store.insert_run(older.clone()).await.unwrap();

    let picked = store.oldest_queued_run(task_id).await.unwrap().unwrap();
    assert_eq!(picked.id, older.id);
}
