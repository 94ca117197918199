// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable projections built from runtime events: the structured event log,
//! diff snapshots, and tool-call timelines that back a run's detail view.

use crate::ids::RunId;
use serde::{Deserialize, Serialize};

/// One structured event appended to a run's timeline.
///
/// Unique on `(run_id, sequence)`; a duplicate append (replayed backlog,
/// retried delivery) is a no-op, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStructuredEvent {
    pub run_id: RunId,
    pub sequence: u64,
    pub event_type: String,
    pub category: String,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub payload_json: String,
    pub schema_version: u32,
    pub timestamp_ms: u64,
}

/// A diff snapshot at a point in the run's timeline.
///
/// Unique on `(run_id, sequence)`; unlike structured events, a later write
/// at the same sequence wins (the runtime may re-emit a refined diff for
/// the same logical step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiffSnapshot {
    pub run_id: RunId,
    pub sequence: u64,
    pub diff_stat: String,
    pub diff_patch: String,
    pub schema_version: u32,
}

/// Status of a single tool invocation, derived from a run's start/output
/// event pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Started,
    Succeeded,
    Failed,
}

crate::simple_display! {
    ToolCallStatus {
        Started => "started",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

/// A projected tool-call timeline entry, spanning the sequence range from
/// the tool's start event to its output event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunToolProjection {
    pub run_id: RunId,
    pub tool_call_id: String,
    pub sequence_start: u64,
    pub sequence_end: Option<u64>,
    pub status: ToolCallStatus,
    pub input_json: Option<String>,
    pub output_json: Option<String>,
}

impl RunToolProjection {
    pub fn started(run_id: RunId, tool_call_id: impl Into<String>, sequence: u64, input_json: Option<String>) -> Self {
        Self {
            run_id,
            tool_call_id: tool_call_id.into(),
            sequence_start: sequence,
            sequence_end: None,
            status: ToolCallStatus::Started,
            input_json,
            output_json: None,
        }
    }

    pub fn complete(&mut self, sequence: u64, succeeded: bool, output_json: Option<String>) {
        self.sequence_end = Some(sequence);
        self.status = if succeeded { ToolCallStatus::Succeeded } else { ToolCallStatus::Failed };
        self.output_json = output_json;
    }
}

/// A log-shaped event (plain info/warn/error lines) that does not qualify
/// as a structured event: fanned out to subscribers and appended for the
/// run's raw log view, but not projected into diff/tool-timeline state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEvent {
    pub run_id: RunId,
    pub delivery_id: u64,
    pub level: String,
    pub message: String,
    pub timestamp_ms: u64,
}

/// Synthesizes a non-regressing per-run sequence watermark from a
/// timestamp tick when the runtime omits an explicit `sequence` on an
/// event. Each call with a timestamp less than or equal to the current
/// watermark still advances by exactly one, so collisions between two
/// events carrying the same timestamp never produce a duplicate sequence.
#[derive(Debug, Default)]
pub struct SyntheticSequence {
    last: u64,
}

impl SyntheticSequence {
    pub fn new() -> Self {
        Self { last: 0 }
    }

    pub fn seed_from(last_known: u64) -> Self {
        Self { last: last_known }
    }

    /// Advance the watermark using `timestamp_ms` as a seed, guaranteeing
    /// the result is strictly greater than the previous value.
    pub fn next(&mut self, timestamp_ms: u64) -> u64 {
        let candidate = timestamp_ms.max(self.last + 1);
        self.last = candidate;
        candidate
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
