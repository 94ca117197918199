// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Repository` entity: git coordinates and local cache metadata for a
//! task's source checkout.

use crate::ids::RepositoryId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub clone_url: String,
    pub default_branch: String,
    /// Path to the shared local clone cache used for `EnsureRepositoryWorkspace`.
    pub cache_path: String,
    pub last_synced_at_ms: Option<u64>,
}

impl Repository {
    pub fn new(clone_url: impl Into<String>, default_branch: impl Into<String>, cache_path: impl Into<String>) -> Self {
        Self {
            id: RepositoryId::new(),
            clone_url: clone_url.into(),
            default_branch: default_branch.into(),
            cache_path: cache_path.into(),
            last_synced_at_ms: None,
        }
    }

    /// The branch name a run against this repository publishes its work to,
    /// per the wire contract: `agent/<repoShortName>/<taskId-prefix>/<runId>`.
    pub fn run_branch_name(&self, task_id: &crate::ids::TaskId, run_id: &crate::ids::RunId) -> String {
        format!("agent/{}/{}/{}", self.short_name(), task_id.suffix(), run_id)
    }

    /// Derive a short, branch-safe name from `clone_url`: the last path
    /// segment with a trailing `.git` stripped.
    fn short_name(&self) -> &str {
        let trimmed = self.clone_url.trim_end_matches('/');
        let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
        last.strip_suffix(".git").unwrap_or(last)
    }
}

/// Validate a branch name against the contract enforced by the runtime
/// harness: the first `/`-segment is `agent` (case-insensitively), there
/// are at least four `/`-segments, and the last segment is `run_id`
/// (case-insensitively).
pub fn validate_branch_name(branch: &str, run_id: &crate::ids::RunId) -> bool {
    let segments: Vec<&str> = branch.split('/').collect();
    if segments.len() < 4 {
        return false;
    }
    let Some(first) = segments.first() else { return false };
    let Some(last) = segments.last() else { return false };
    first.eq_ignore_ascii_case("agent") && last.eq_ignore_ascii_case(run_id.as_str())
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
