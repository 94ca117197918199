// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Task` entity: a repeatable recipe that produces [`crate::run::Run`]s.

use crate::ids::TaskId;
use serde::{Deserialize, Serialize};

/// Exponential back-off schedule for automatic retries.
///
/// Delay for attempt `n` (n >= 2) is `base * multiplier^(n - 2)`, capped at
/// 300 seconds. Attempt 1 never waits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_secs: f64,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub const MAX_BACKOFF_SECS: f64 = 300.0;

    pub fn none() -> Self {
        Self { max_attempts: 1, base_secs: 0.0, multiplier: 1.0 }
    }

    /// Delay to wait before dispatching `attempt` (the attempt number of the
    /// run about to start, 1-indexed). Returns `0` for the first attempt.
    pub fn delay_secs(&self, attempt: u32) -> f64 {
        if attempt <= 1 {
            return 0.0;
        }
        let exponent = (attempt - 2) as i32;
        let delay = self.base_secs * self.multiplier.powi(exponent);
        delay.min(Self::MAX_BACKOFF_SECS)
    }

    pub fn allows_attempt(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

/// Caps on artifact storage for runs of a task, enforced by the event
/// listener at append time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPolicy {
    pub max_artifact_bytes: u64,
    pub max_total_bytes_per_run: u64,
}

impl Default for ArtifactPolicy {
    fn default() -> Self {
        Self {
            max_artifact_bytes: 100 * 1024 * 1024,
            max_total_bytes_per_run: 250 * 1024 * 1024,
        }
    }
}

/// Timeouts that bound a single run's lifetime, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunTimeouts {
    /// Longest a run may sit `Queued` before it is considered overdue.
    pub queue_timeout_secs: u64,
    /// Longest a run may sit `Running` without a fresh event before it is
    /// considered stale.
    pub stale_timeout_secs: u64,
}

impl Default for RunTimeouts {
    fn default() -> Self {
        Self { queue_timeout_secs: 600, stale_timeout_secs: 900 }
    }
}

/// A repeatable recipe: harness/prompt/command configuration plus the
/// policies that govern runs produced from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub harness: String,
    pub prompt_template: Option<String>,
    pub command: Option<String>,
    pub worker_image_ref: String,
    pub retry_policy: RetryPolicy,
    pub artifact_policy: ArtifactPolicy,
    pub timeouts: RunTimeouts,
    pub concurrency_limit: u32,
    pub cron_schedule: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    /// Creation timestamp, used by retention cleanup's age-based and
    /// `cleanupProtectedDays` eligibility checks. Defaults to `0` (meaning
    /// "unknown, treat as old") for tasks built without [`Task::with_created_at_ms`].
    #[serde(default)]
    pub created_at_ms: u64,
}

impl Task {
    pub fn new(name: impl Into<String>, harness: impl Into<String>, worker_image_ref: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            harness: harness.into(),
            prompt_template: None,
            command: None,
            worker_image_ref: worker_image_ref.into(),
            retry_policy: RetryPolicy::none(),
            artifact_policy: ArtifactPolicy::default(),
            timeouts: RunTimeouts::default(),
            concurrency_limit: 1,
            cron_schedule: None,
            enabled: true,
            created_at_ms: 0,
        }
    }

    pub fn with_created_at_ms(mut self, created_at_ms: u64) -> Self {
        self.created_at_ms = created_at_ms;
        self
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
