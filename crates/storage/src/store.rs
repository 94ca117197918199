// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Store` trait: every persistence operation the orchestration core
//! calls, described only by its idempotency contract, never by a schema.

use async_trait::async_trait;
use oj_core::{
    Artifact, CoreResult, Lease, Repository, Run, RunDiffSnapshot, RunId, RunLogEvent, RunState,
    RunStructuredEvent, RunToolProjection, Task, TaskId, TaskRuntime, TaskRuntimeEventCheckpoint,
    TaskRuntimeId, TaskRuntimeRegistration,
};

/// Outcome of one retention-cleanup cycle, returned by
/// [`Store::delete_eligible_tasks`] and surfaced verbatim in the daemon's
/// cleanup summary log line.
#[derive(Debug, Clone, Default)]
pub struct CleanupBatchResult {
    pub tasks_deleted: u32,
    pub failed_tasks: u32,
}

/// Eligibility constraints for one retention-cleanup deletion batch. A task
/// is deleted only if it is at least `min_age_ms` old, has no runs still
/// `Running`, and (when `exclude_open_findings` is set) has no structured
/// events categorised as an open finding.
#[derive(Debug, Clone)]
pub struct TaskCleanupCriteria {
    pub min_age_ms: u64,
    pub protected_days_ms: u64,
    pub exclude_open_findings: bool,
    pub batch_size: u32,
}

/// Optional filter applied by `ListRuns`. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub task_id: Option<TaskId>,
    pub state: Option<RunState>,
}

/// The persistence contract for the orchestration core.
///
/// Implementations are not in scope for correctness review beyond this
/// contract: every write described here as
/// idempotent must actually be idempotent under concurrent and replayed
/// calls, since the event listener relies on exactly that to turn
/// at-least-once delivery into effectively-once processing.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // -- Repositories -----------------------------------------------------

    async fn get_repository(&self, id: oj_core::RepositoryId) -> CoreResult<Option<Repository>>;

    /// Update the repository's cache-sync metadata. No-op if the repository
    /// is unknown.
    async fn mark_repository_synced(&self, id: oj_core::RepositoryId, now_ms: u64) -> CoreResult<()>;

    // -- Tasks --------------------------------------------------------------

    async fn get_task(&self, id: TaskId) -> CoreResult<Option<Task>>;

    async fn list_tasks(&self) -> CoreResult<Vec<Task>>;

    /// Mark a task's last-git-sync metadata fresh; fire-and-forget from the
    /// listener's completion path and deliberately not part of `Task`'s
    /// surface used elsewhere.
    async fn touch_task_git_sync(&self, id: TaskId, now_ms: u64) -> CoreResult<()>;

    // -- Runs -----------------------------------------------------------

    async fn insert_run(&self, run: Run) -> CoreResult<()>;

    async fn get_run(&self, id: RunId) -> CoreResult<Option<Run>>;

    async fn list_runs(&self, filter: RunFilter) -> CoreResult<Vec<Run>>;

    /// Oldest `Queued` run for `task_id`, if any, ordered by `created_at_ms`.
    async fn oldest_queued_run(&self, task_id: TaskId) -> CoreResult<Option<Run>>;

    /// Count of runs for `task_id` currently `Running`.
    async fn count_running(&self, task_id: TaskId) -> CoreResult<u32>;

    async fn mark_run_running(
        &self,
        id: RunId,
        runtime_id: TaskRuntimeId,
        worker_image_ref: String,
        worker_image_digest: Option<String>,
        now_ms: u64,
    ) -> CoreResult<()>;

    /// Idempotent: a retried or backfilled `completed` event for an
    /// already-terminal run returns `Ok(false)` with no state change and no
    /// publish, per the store's idempotency contract.
    async fn mark_run_terminal(
        &self,
        id: RunId,
        state: RunState,
        summary: Option<String>,
        output_json: Option<String>,
        failure_class: Option<oj_core::FailureClass>,
        pr_url: Option<String>,
        now_ms: u64,
    ) -> CoreResult<bool>;

    async fn mark_run_obsolete(&self, id: RunId) -> CoreResult<bool>;

    // -- TaskRuntimes --------------------------------------------------------

    async fn list_task_runtimes(&self) -> CoreResult<Vec<TaskRuntime>>;

    async fn get_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<Option<TaskRuntime>>;

    async fn get_task_runtime_for_task(&self, task_id: TaskId) -> CoreResult<Option<TaskRuntime>>;

    async fn upsert_task_runtime(&self, runtime: TaskRuntime) -> CoreResult<()>;

    async fn delete_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<()>;

    /// Persist a heartbeat registration and refresh the matching runtime's
    /// `active_runs`/`last_activity_utc_ms`. No-op if the runtime is
    /// unknown (the registration still round-trips via
    /// `get_registration`).
    async fn save_registration(&self, registration: TaskRuntimeRegistration, now_ms: u64) -> CoreResult<()>;

    async fn get_registration(&self, runtime_id: &str) -> CoreResult<Option<TaskRuntimeRegistration>>;

    // -- Structured views -----------------------------------------------

    /// Unique on `(run_id, sequence)`. A duplicate append (replayed
    /// backlog) is a no-op and returns `Ok(false)`.
    async fn append_structured_event(&self, event: RunStructuredEvent) -> CoreResult<bool>;

    async fn list_structured_events(&self, run_id: RunId) -> CoreResult<Vec<RunStructuredEvent>>;

    /// Unique on `(run_id, sequence)`; unlike structured events, a write at
    /// a sequence newer than the current latest replaces it, never an
    /// older one.
    async fn upsert_diff_snapshot(&self, snapshot: RunDiffSnapshot) -> CoreResult<()>;

    async fn latest_diff_snapshot(&self, run_id: RunId) -> CoreResult<Option<RunDiffSnapshot>>;

    /// Unique on `(run_id, tool_call_id)`.
    async fn upsert_tool_projection(&self, projection: RunToolProjection) -> CoreResult<()>;

    async fn list_tool_projections(&self, run_id: RunId) -> CoreResult<Vec<RunToolProjection>>;

    /// Any other log-shaped event: fanned out live, appended here
    /// for the run's raw log view. No uniqueness contract beyond natural
    /// insertion order — duplicates from a replayed backlog are harmless
    /// extra log lines, not a correctness issue.
    async fn append_log_event(&self, event: RunLogEvent) -> CoreResult<()>;

    async fn list_log_events(&self, run_id: RunId) -> CoreResult<Vec<RunLogEvent>>;

    // -- Artifacts ------------------------------------------------------

    /// Deduplicated by `(run_id, file_name)`: a resend of an
    /// already-committed artifact overwrites in place.
    async fn save_artifact(&self, artifact: Artifact) -> CoreResult<()>;

    async fn list_artifacts(&self, run_id: RunId) -> CoreResult<Vec<Artifact>>;

    // -- Checkpoints ------------------------------------------------------

    async fn get_checkpoint(&self, runtime_id: TaskRuntimeId) -> CoreResult<TaskRuntimeEventCheckpoint>;

    async fn save_checkpoint(&self, checkpoint: TaskRuntimeEventCheckpoint) -> CoreResult<()>;

    // -- Leases -----------------------------------------------------------

    /// Conditional upsert: succeeds (returns `true`) only if the named
    /// lease is expired or already owned by `owner_id`. Implemented as a
    /// single statement, not read-then-write, so it is race-free across
    /// processes.
    async fn acquire_lease(&self, name: &str, owner_id: &str, expires_at_utc_ms: u64, now_ms: u64) -> CoreResult<bool>;

    /// Releases the lease only if still held by `owner_id`; a no-op
    /// otherwise (best-effort on shutdown).
    async fn release_lease(&self, name: &str, owner_id: &str) -> CoreResult<()>;

    async fn get_lease(&self, name: &str) -> CoreResult<Option<Lease>>;

    // -- Retention cleanup --------------------------------------------------

    /// Delete structured sub-rows (structured events, diff snapshots, tool
    /// projections, log events) older than `older_than_ms` in a bounded
    /// batch of at most `batch_size` rows per call; the retention loop
    /// calls this repeatedly until it returns `0`.
    async fn prune_structured_rows_older_than(&self, older_than_ms: u64, batch_size: u32) -> CoreResult<u64>;

    /// Ids of tasks eligible for deletion under `criteria`, ordered oldest
    /// `created_at_ms` first, capped at `criteria.batch_size`.
    async fn list_cleanup_eligible_tasks(&self, now_ms: u64, criteria: &TaskCleanupCriteria) -> CoreResult<Vec<TaskId>>;

    /// Delete a task and everything that cascades from it (runs, runtimes,
    /// structured views, artifacts). Returns `Ok(false)` if the task no
    /// longer exists (treated as already-deleted, not a failure).
    async fn delete_task_cascade(&self, id: TaskId) -> CoreResult<bool>;

    /// Approximate on-disk size of the store, in bytes. `InMemoryStore`
    /// reports a rough in-process estimate; `PostgresStore` reports the
    /// database's actual size.
    async fn approximate_size_bytes(&self) -> CoreResult<u64>;

    /// Reclaim space after a size-pressure deletion pass. A no-op for
    /// `InMemoryStore`; `PostgresStore` runs `VACUUM`.
    async fn vacuum(&self) -> CoreResult<()>;
}
