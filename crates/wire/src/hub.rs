// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire shapes for the runtime's event hub: a bidirectional stream carrying
//! `Subscribe` requests from the listener and `OnJobEvent`/
//! `OnTaskRuntimeStatusChanged` callbacks from the runtime.
//!
//! Framed as JSON text over a WebSocket connection, tagged so a single
//! receive loop can distinguish the two callback shapes without a second
//! channel.

use serde::{Deserialize, Serialize};

use crate::messages::{JobEventMessage, TaskRuntimeStatusMessage};

/// Sent once after the connection opens, before any frames are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// `None` subscribes to every run hosted by the runtime, matching the
    /// design's "subscribe to all runs" behaviour; present only so a future
    /// caller could narrow the subscription without a wire change.
    #[serde(default)]
    pub run_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum HubFrame {
    JobEvent(JobEventMessage),
    StatusChanged(TaskRuntimeStatusMessage),
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
