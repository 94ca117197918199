// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `TaskRuntime` entity: a containerised worker that hosts a task's
//! runs, plus its registration record.

use crate::ids::{TaskId, TaskRuntimeId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task runtime, as tracked by the health supervisor
/// and the dispatcher's candidate ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRuntimeState {
    Provisioning,
    Ready,
    Busy,
    Draining,
    Stopped,
    Quarantined,
}

crate::simple_display! {
    TaskRuntimeState {
        Provisioning => "provisioning",
        Ready => "ready",
        Busy => "busy",
        Draining => "draining",
        Stopped => "stopped",
        Quarantined => "quarantined",
    }
}

impl TaskRuntimeState {
    /// Runtimes the dispatcher may consider as candidates for a new run.
    pub fn is_dispatch_eligible(self) -> bool {
        matches!(self, TaskRuntimeState::Ready | TaskRuntimeState::Busy)
    }
}

/// A containerised worker process hosting runs for one task.
///
/// `runtime_id` is the wire-facing identifier carried on every RPC and event
/// hub message (`TaskRuntimeStatusMessage.taskRuntimeId`); in this
/// implementation it is always equal to `id` rendered as a string, kept as a
/// distinct field only to match the wire shape byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRuntime {
    pub id: TaskRuntimeId,
    pub task_id: TaskId,
    pub state: TaskRuntimeState,
    pub active_runs: u32,
    pub max_parallel_runs: u32,
    pub endpoint: String,
    pub container_id: Option<String>,
    pub workspace_path: Option<String>,
    pub runtime_home_path: Option<String>,
    pub last_activity_utc_ms: u64,
    pub inactive_after_utc_ms: Option<u64>,
    pub last_error: Option<String>,
    pub cold_start_count: u32,
    pub failed_start_count: u32,
    pub created_at_ms: u64,
}

impl TaskRuntime {
    pub fn runtime_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn has_capacity(&self) -> bool {
        self.state.is_dispatch_eligible() && self.active_runs < self.max_parallel_runs
    }

    pub fn record_activity(&mut self, now_ms: u64) {
        self.last_activity_utc_ms = now_ms;
        self.inactive_after_utc_ms = None;
    }
}

/// Registration record submitted by a task runtime when it comes online,
/// ahead of its first `CheckHealth` probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRuntimeRegistration {
    pub task_id: TaskId,
    pub runtime_id: String,
    pub endpoint: String,
    pub container_id: Option<String>,
    pub max_parallel_runs: u32,
}

#[cfg(test)]
#[path = "task_runtime_tests.rs"]
mod tests;
