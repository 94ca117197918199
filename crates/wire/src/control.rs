// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-socket protocol: every operator-facing request maps 1:1 to a
//! core orchestration operation. The daemon is the only process that ever
//! mutates state; the CLI only ever sends one of these requests and prints
//! the response.

use oj_core::{Run, RunState, TaskRuntime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    ListTaskRuntimes,
    GetTaskRuntime { id: String },
    RestartTaskRuntime { id: String },
    RecycleTaskRuntime { id: String },
    SetTaskRuntimeDraining { id: String, draining: bool },
    ListRuns { task_id: Option<String>, state: Option<RunState> },
    GetRun { id: String },
    ListIncidents { runtime_id: Option<String> },
    DaemonStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub runtime_id: String,
    pub occurred_at_ms: u64,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatusReport {
    pub version: String,
    pub uptime_secs: u64,
    pub tasks_configured: u32,
    pub runtimes_online: u32,
    pub runs_in_flight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    TaskRuntimes { runtimes: Vec<TaskRuntime> },
    TaskRuntime { runtime: TaskRuntime },
    Runs { runs: Vec<Run> },
    Run { run: Run },
    Incidents { incidents: Vec<IncidentSummary> },
    Status { status: DaemonStatusReport },
    Ack,
    NotFound { id: String },
    Error { message: String },
}

impl ControlRequest {
    /// `true` for requests whose core operation is known to be a pure read
    /// (no dispatcher, supervisor, or lease side effects), used by the
    /// listener to decide whether to log at `debug` or `info`.
    pub fn is_read_only(&self) -> bool {
        !matches!(
            self,
            ControlRequest::RestartTaskRuntime { .. }
                | ControlRequest::RecycleTaskRuntime { .. }
                | ControlRequest::SetTaskRuntimeDraining { .. }
        )
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
