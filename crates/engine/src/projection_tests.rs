use oj_core::{RunId, RunStructuredEvent, ToolCallStatus};
use oj_storage::{InMemoryStore, Store};

use super::{apply, canonicalize_category, CATEGORY_DIFF_UPDATED, CATEGORY_REASONING_DELTA};

fn event(run_id: RunId, sequence: u64, category: &str, payload_json: &str) -> RunStructuredEvent {
    RunStructuredEvent {
        run_id,
        sequence,
        event_type: category.to_string(),
        category: category.to_string(),
        summary: None,
        error: None,
        payload_json: payload_json.to_string(),
        schema_version: 1,
        timestamp_ms: sequence * 1000,
    }
}

#[test]
fn canonicalizes_legacy_category_spellings() {
    assert_eq!(canonicalize_category("session.diff"), CATEGORY_DIFF_UPDATED);
    assert_eq!(canonicalize_category("session.reasoning"), CATEGORY_REASONING_DELTA);
    assert_eq!(canonicalize_category("reasoning"), CATEGORY_REASONING_DELTA);
    assert_eq!(canonicalize_category("tool.started"), "tool.started");
}

#[tokio::test]
async fn diff_event_upserts_the_latest_snapshot() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();

    apply(&store, &event(run_id, 1, "diff.updated", r#"{"diffStat":"+1 -0","diffPatch":"a"}"#)).await.unwrap();
    apply(&store, &event(run_id, 2, "session.diff", r#"{"diffStat":"+2 -1","diffPatch":"b"}"#)).await.unwrap();

    let snapshot = store.latest_diff_snapshot(run_id).await.unwrap().expect("snapshot recorded");
    assert_eq!(snapshot.sequence, 2);
    assert_eq!(snapshot.diff_stat, "+2 -1");
}

#[tokio::test]
async fn diff_event_without_both_fields_is_a_noop() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();

    apply(&store, &event(run_id, 1, "diff.updated", r#"{"diffStat":"+1 -0"}"#)).await.unwrap();

    assert!(store.latest_diff_snapshot(run_id).await.unwrap().is_none());
}

#[tokio::test]
async fn embedded_envelope_is_unwrapped_before_projection() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();

    let payload = r#"{"type":"session.diff","schemaVersion":"2","properties":{"diffStat":"+3 -0","diffPatch":"c"}}"#;
    apply(&store, &event(run_id, 1, "log", payload)).await.unwrap();

    let snapshot = store.latest_diff_snapshot(run_id).await.unwrap().expect("snapshot recorded via unwrapped envelope");
    assert_eq!(snapshot.diff_stat, "+3 -0");
}

#[tokio::test]
async fn tool_call_starts_then_completes_widening_sequence_range() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();

    apply(&store, &event(run_id, 5, "tool.started", r#"{"toolCallId":"call-1","toolName":"grep","inputJson":{"q":"x"}}"#)).await.unwrap();
    apply(&store, &event(run_id, 9, "tool.error", r#"{"toolCallId":"call-1","succeeded":false}"#)).await.unwrap();

    let projections = store.list_tool_projections(run_id).await.unwrap();
    assert_eq!(projections.len(), 1);
    let projection = &projections[0];
    assert_eq!(projection.sequence_start, 5);
    assert_eq!(projection.sequence_end, Some(9));
    assert_eq!(projection.status, ToolCallStatus::Failed);
}

#[tokio::test]
async fn out_of_order_tool_delivery_still_widens_start_downward() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();

    apply(&store, &event(run_id, 10, "tool.output", r#"{"toolCallId":"call-1","succeeded":true}"#)).await.unwrap();
    apply(&store, &event(run_id, 4, "tool.progress", r#"{"toolCallId":"call-1"}"#)).await.unwrap();

    let projections = store.list_tool_projections(run_id).await.unwrap();
    let projection = &projections[0];
    assert_eq!(projection.sequence_start, 4);
    assert_eq!(projection.sequence_end, Some(10));
}

#[tokio::test]
async fn plain_log_and_reasoning_events_materialize_no_derived_row() {
    let store = InMemoryStore::new();
    let run_id = RunId::new();

    apply(&store, &event(run_id, 1, "reasoning", r#"{"thinking":"hmm"}"#)).await.unwrap();

    assert!(store.latest_diff_snapshot(run_id).await.unwrap().is_none());
    assert!(store.list_tool_projections(run_id).await.unwrap().is_empty());
}
