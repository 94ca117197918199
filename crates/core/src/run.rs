// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Run` entity: a single execution attempt of a [`crate::task::Task`]
//! against a [`crate::repository::Repository`].

use crate::ids::{RepositoryId, RunId, TaskId, TaskRuntimeId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a run.
///
/// Exactly one transition moves a run into a terminal state
/// (`Succeeded`/`Failed`/`Obsolete` is an overlay, not a fourth terminal
/// state reached directly — see [`Run::mark_obsolete`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    PendingApproval,
    Running,
    Succeeded,
    Failed,
    /// Overlay disposition applied post-terminal when the runtime signals
    /// the result was superseded. Not reachable directly from `Queued`.
    Obsolete,
}

crate::simple_display! {
    RunState {
        Queued => "queued",
        PendingApproval => "pending_approval",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Obsolete => "obsolete",
    }
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Obsolete)
    }
}

/// Where the container image for this run's worker came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerImageSource {
    /// Resolved from the task's configured image reference at dispatch time.
    TaskConfig,
    /// Pinned by a prior attempt being retried (keeps `workerImage*` stable
    /// across an automatic retry chain).
    RetryInherited,
    /// Operator override via the control surface.
    Manual,
}

crate::simple_display! {
    WorkerImageSource {
        TaskConfig => "task_config",
        RetryInherited => "retry_inherited",
        Manual => "manual",
    }
}

/// Classification of why a run failed, assigned on the completion path.
///
/// Order of precedence is defined in [`crate::envelope::classify_failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    EnvelopeValidation,
    WorkspacePreparation,
    Timeout,
    OrphanRecovery,
    StaleRun,
    ZombieRun,
    OverdueRun,
}

crate::simple_display! {
    FailureClass {
        EnvelopeValidation => "envelope_validation",
        WorkspacePreparation => "workspace_preparation",
        Timeout => "timeout",
        OrphanRecovery => "orphan_recovery",
        StaleRun => "stale_run",
        ZombieRun => "zombie_run",
        OverdueRun => "overdue_run",
    }
}

/// A single execution attempt of a task against a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub repository_id: RepositoryId,
    pub task_id: TaskId,
    pub runtime_id: Option<TaskRuntimeId>,
    pub state: RunState,
    /// Monotonically increasing within a task's retry chain; starts at 1.
    pub attempt: u32,
    pub summary: Option<String>,
    pub output_json: Option<String>,
    pub result_envelope_ref: Option<String>,
    pub failure_class: Option<FailureClass>,
    pub pr_url: Option<String>,
    pub worker_image_ref: Option<String>,
    pub worker_image_digest: Option<String>,
    pub worker_image_source: Option<WorkerImageSource>,
    pub execution_mode: String,
    pub structured_protocol: String,
    pub session_profile_id: Option<String>,
    pub instruction_stack_hash: Option<String>,
    pub mcp_config_snapshot_json: Option<String>,
    pub automation_run_id: Option<String>,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub ended_at_ms: Option<u64>,
    /// True once an `obsolete` disposition has been overlaid on a terminal
    /// run. Terminal facts (summary/failure_class/pr_url) are left as-is.
    #[serde(default)]
    pub obsolete: bool,
}

impl Run {
    /// Create a freshly queued run for `attempt` 1.
    pub fn new_queued(
        repository_id: RepositoryId,
        task_id: TaskId,
        execution_mode: impl Into<String>,
        structured_protocol: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: RunId::new(),
            repository_id,
            task_id,
            runtime_id: None,
            state: RunState::Queued,
            attempt: 1,
            summary: None,
            output_json: None,
            result_envelope_ref: None,
            failure_class: None,
            pr_url: None,
            worker_image_ref: None,
            worker_image_digest: None,
            worker_image_source: None,
            execution_mode: execution_mode.into(),
            structured_protocol: structured_protocol.into(),
            session_profile_id: None,
            instruction_stack_hash: None,
            mcp_config_snapshot_json: None,
            automation_run_id: None,
            created_at_ms: now_ms,
            started_at_ms: None,
            ended_at_ms: None,
            obsolete: false,
        }
    }

    /// Build the next retry attempt, inheriting the fields the design
    /// requires to stay stable across a retry chain: `execution_mode`,
    /// `session_profile_id`, `mcp_config_snapshot_json`.
    pub fn next_attempt(&self, now_ms: u64) -> Self {
        Self {
            id: RunId::new(),
            repository_id: self.repository_id,
            task_id: self.task_id,
            runtime_id: None,
            state: RunState::Queued,
            attempt: self.attempt + 1,
            summary: None,
            output_json: None,
            result_envelope_ref: None,
            failure_class: None,
            pr_url: None,
            worker_image_ref: self.worker_image_ref.clone(),
            worker_image_digest: self.worker_image_digest.clone(),
            worker_image_source: Some(WorkerImageSource::RetryInherited),
            execution_mode: self.execution_mode.clone(),
            structured_protocol: self.structured_protocol.clone(),
            session_profile_id: self.session_profile_id.clone(),
            instruction_stack_hash: self.instruction_stack_hash.clone(),
            mcp_config_snapshot_json: self.mcp_config_snapshot_json.clone(),
            automation_run_id: self.automation_run_id.clone(),
            created_at_ms: now_ms,
            started_at_ms: None,
            ended_at_ms: None,
            obsolete: false,
        }
    }

    pub fn mark_running(&mut self, runtime_id: TaskRuntimeId, worker_image_ref: String, worker_image_digest: Option<String>, now_ms: u64) {
        self.runtime_id = Some(runtime_id);
        self.state = RunState::Running;
        self.worker_image_ref = Some(worker_image_ref);
        self.worker_image_digest = worker_image_digest;
        if self.worker_image_source.is_none() {
            self.worker_image_source = Some(WorkerImageSource::TaskConfig);
        }
        self.started_at_ms = Some(now_ms);
    }

    /// Idempotent terminal transition. Returns `false` if the run was
    /// already terminal (the caller should treat this as a no-op success,
    /// per the store's idempotency contract).
    pub fn mark_terminal(
        &mut self,
        state: RunState,
        summary: Option<String>,
        output_json: Option<String>,
        failure_class: Option<FailureClass>,
        pr_url: Option<String>,
        now_ms: u64,
    ) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        debug_assert!(matches!(state, RunState::Succeeded | RunState::Failed));
        self.state = state;
        self.summary = summary;
        self.output_json = output_json;
        self.failure_class = failure_class;
        self.pr_url = pr_url;
        self.ended_at_ms = Some(now_ms);
        true
    }

    /// Overlay the `Obsolete` disposition. A pure flag: terminal facts
    /// (summary, failure_class, pr_url, ended_at) are left untouched, and
    /// retention age calculations keep using the original `ended_at_ms`.
    pub fn mark_obsolete(&mut self) -> bool {
        if !self.state.is_terminal() || self.obsolete {
            return false;
        }
        self.obsolete = true;
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
