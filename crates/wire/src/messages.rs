// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages pushed by a task runtime's event hub.

use oj_core::RunId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One event pushed over a runtime's `Subscribe`/`OnJobEvent` stream.
///
/// `delivery_id` is monotonic per runtime and is the basis of the
/// checkpoint gate; `sequence` is monotonic per run and may be absent on
/// older runtimes, in which case the listener synthesizes one from
/// `timestamp_ms` via [`oj_core::SyntheticSequence`]. The `artifact_id`/
/// `content_type`/`is_last_chunk`/`binary_payload` fields are only
/// populated on `artifact_manifest`/`artifact_chunk` events; every other
/// event type leaves them `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEventMessage {
    pub delivery_id: u64,
    pub run_id: RunId,
    pub sequence: Option<u64>,
    pub event_type: String,
    pub category: String,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub payload_json: Option<String>,
    pub schema_version: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub is_last_chunk: Option<bool>,
    #[serde(default)]
    pub binary_payload: Option<Vec<u8>>,
}

/// Out-of-band status push for the runtime hosting the connection, used by
/// the health supervisor independently of per-run job events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRuntimeStatusMessage {
    pub task_runtime_id: String,
    pub status: String,
    pub active_slots: u32,
    pub max_slots: u32,
}
