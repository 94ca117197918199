// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unary RPC request/response shapes for the task runtime's control
//! service, and the result envelope it returns on completion.

use oj_core::{FailureClass, RunId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCommand {
    pub run_id: RunId,
    pub repository_clone_url: String,
    pub branch_name: String,
    pub harness: String,
    pub prompt: Option<String>,
    pub command: Option<String>,
    pub execution_mode: String,
    pub structured_protocol: String,
    pub session_profile_id: Option<String>,
    pub mcp_config_snapshot_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelCommand {
    pub run_id: RunId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCommandStatus {
    pub run_id: RunId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckHealthResult {
    pub success: bool,
    pub error_message: Option<String>,
}

/// Backlog replay is scoped to the whole runtime, not a single run: one
/// hub connection subscribes to every run hosted by a runtime, so recovery
/// after a reconnect replays everything after the runtime's checkpoint
/// regardless of which run each event belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadEventBacklog {
    /// Resume strictly after this delivery id; `0` reads from the start of
    /// whatever backlog the runtime retains.
    pub after_delivery_id: u64,
    /// Page size; the listener keeps calling while `has_more` is set.
    pub max_events: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadEventBacklogResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub has_more: bool,
    pub events: Vec<crate::messages::JobEventMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureRepositoryWorkspace {
    pub repository_clone_url: String,
    pub branch_name: String,
    /// Set on a fallback retry after `RefreshRepositoryWorkspace` returned
    /// `Unimplemented`: the prior call's `local_path`, passed back as a
    /// hint so the runtime can reuse the existing checkout by key instead
    /// of re-cloning.
    pub repository_key_hint: Option<String>,
}

/// Newer runtimes expose `RefreshRepositoryWorkspace`; callers try it first
/// and fall back to [`EnsureRepositoryWorkspace`] with `repository_key_hint`
/// set to the prior `local_path` if this returns `Unimplemented`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRepositoryWorkspace {
    pub repository_clone_url: String,
    pub branch_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryWorkspaceResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub local_path: Option<String>,
    /// `true` when the runtime does not implement this verb at all; the
    /// caller falls back to the other workspace verb rather than treating
    /// this as a hard failure.
    pub unimplemented: bool,
}

/// The JSON body returned when a run completes, carried inline in a
/// `completed` job event's `metadata["payload"]` string (and, on older
/// runtimes, fetchable directly via `GetCommandStatus`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub run_id: RunId,
    pub succeeded: bool,
    pub summary: Option<String>,
    pub output_json: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: ResultEnvelopeMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultEnvelopeMetadata {
    pub pr_url: Option<String>,
    pub git_failure: Option<String>,
    pub git_workflow: Option<String>,
    /// `"obsolete"` overlays the `Obsolete` disposition on top of whatever
    /// terminal state this envelope otherwise produces; any other value
    /// (or absence) leaves the run's terminal facts as computed.
    pub run_disposition: Option<String>,
    pub failure_class: Option<FailureClass>,
}

impl ResultEnvelopeMetadata {
    pub fn is_obsolete(&self) -> bool {
        self.run_disposition.as_deref() == Some("obsolete")
    }
}

impl ResultEnvelope {
    pub fn classify_failure(&self) -> Option<FailureClass> {
        oj_core::classify_failure(&oj_core::EnvelopeFailureInput {
            metadata_failure_class: self.metadata.failure_class,
            summary: self.summary.as_deref(),
            error: self.error.as_deref(),
        })
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
