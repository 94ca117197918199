// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured View Projection: turns an appended [`RunStructuredEvent`] into
//! the derived diff-snapshot and tool-timeline rows a run's detail view
//! reads from.
//!
//! Two category spellings are canonicalised to the forms the projection
//! understands (`session.diff` -> `diff.updated`, bare `reasoning` ->
//! `reasoning.delta`), and a `log`-shaped event whose `payload_json` is
//! itself a `{type, schemaVersion, properties}` envelope has its inner
//! `type`/`properties` unwrapped before projection, matching runtimes that
//! emit session-log-shaped structured events rather than first-class ones.

use oj_core::{CoreResult, RunDiffSnapshot, RunId, RunStructuredEvent, RunToolProjection};
use oj_storage::Store;
use serde::Deserialize;
use serde_json::Value;

pub const CATEGORY_DIFF_UPDATED: &str = "diff.updated";
pub const CATEGORY_REASONING_DELTA: &str = "reasoning.delta";

/// Map legacy/alternate category spellings onto the canonical ones the
/// projection understands. Anything not listed here passes through
/// unchanged.
pub fn canonicalize_category(category: &str) -> String {
    match category {
        "session.diff" => CATEGORY_DIFF_UPDATED.to_string(),
        "session.reasoning" | "reasoning" => CATEGORY_REASONING_DELTA.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddedEnvelope {
    #[serde(rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    properties: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionFields {
    diff_stat: Option<String>,
    diff_patch: Option<String>,
    tool_call_id: Option<String>,
    tool_name: Option<String>,
    input_json: Option<Value>,
    output_json: Option<Value>,
    succeeded: Option<bool>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Resolve the effective category and the JSON object the projection reads
/// fields from: either the event's own `payload_json`, or — if that JSON is
/// a `{type, schemaVersion, properties}` embedded envelope — the
/// canonicalised inner `type` and its `properties`.
fn resolve_payload(category: &str, payload_json: &str) -> (String, Value) {
    let Ok(raw) = serde_json::from_str::<Value>(payload_json) else {
        return (canonicalize_category(category), Value::Null);
    };
    if let Ok(envelope) = serde_json::from_value::<EmbeddedEnvelope>(raw.clone()) {
        if let Some(inner_type) = envelope.event_type.filter(|_| envelope.properties.is_some() || envelope.schema_version.is_some()) {
            if let Some(properties) = envelope.properties {
                return (canonicalize_category(&inner_type), properties);
            }
        }
    }
    (canonicalize_category(category), raw)
}

/// Apply one already-appended structured event to the diff/tool derived
/// views. A no-op for categories the projection derives no state from
/// (plain log lines, lifecycle markers, reasoning deltas — those are
/// fanned out as-is and never materialise a separate row).
pub async fn apply(store: &dyn Store, event: &RunStructuredEvent) -> CoreResult<()> {
    let (category, fields_value) = resolve_payload(&event.category, &event.payload_json);
    let fields: ProjectionFields = serde_json::from_value(fields_value).unwrap_or_default();

    if category == CATEGORY_DIFF_UPDATED {
        if let (Some(diff_stat), Some(diff_patch)) = (fields.diff_stat, fields.diff_patch) {
            store
                .upsert_diff_snapshot(RunDiffSnapshot {
                    run_id: event.run_id,
                    sequence: event.sequence,
                    diff_stat,
                    diff_patch,
                    schema_version: event.schema_version,
                })
                .await?;
        }
        return Ok(());
    }

    if let Some(tool_call_id) = fields.tool_call_id {
        apply_tool_projection(store, event.run_id, tool_call_id, event.sequence, &category, &fields).await?;
    }

    Ok(())
}

/// Categories whose arrival closes out a tool call rather than merely
/// extending its observed sequence range.
fn is_terminal_tool_category(category: &str) -> bool {
    ["end", "complete", "completed", "output", "result", "finish", "finished", "error"]
        .iter()
        .any(|suffix| category.ends_with(suffix))
}

async fn apply_tool_projection(
    store: &dyn Store,
    run_id: RunId,
    tool_call_id: String,
    sequence: u64,
    category: &str,
    fields: &ProjectionFields,
) -> CoreResult<()> {
    let existing = store.list_tool_projections(run_id).await?.into_iter().find(|p| p.tool_call_id == tool_call_id);

    let projection = match existing {
        None => {
            let input_json = fields.input_json.as_ref().map(|v| v.to_string());
            let mut projection = RunToolProjection::started(run_id, tool_call_id, sequence, input_json);
            if is_terminal_tool_category(category) {
                let succeeded = fields.succeeded.unwrap_or(!category.ends_with("error"));
                let output_json = fields.output_json.as_ref().map(|v| v.to_string());
                projection.complete(sequence, succeeded, output_json);
            }
            projection
        }
        Some(mut projection) => {
            // sequenceStart = min(existing, seq); sequenceEnd = max(existing, seq),
            // per the projection's ordering contract — both hold regardless of
            // which direction this particular event moves the call along.
            projection.sequence_start = projection.sequence_start.min(sequence);
            let widened_end = projection.sequence_end.unwrap_or(sequence).max(sequence);
            if is_terminal_tool_category(category) {
                let succeeded = fields.succeeded.unwrap_or(!category.ends_with("error"));
                let output_json = fields.output_json.as_ref().map(|v| v.to_string());
                projection.complete(widened_end, succeeded, output_json);
            } else {
                projection.sequence_end = Some(widened_end);
            }
            projection
        }
    };

    store.upsert_tool_projection(projection).await
}

#[cfg(test)]
#[path = "projection_tests.rs"]
mod tests;
