// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A dependency-free, process-local [`Store`] implementation backed by
//! locked `HashMap`s. Used by every test in this workspace and as the
//! default store for a single-process deployment.

use std::collections::HashMap;

use async_trait::async_trait;
use oj_core::{
    Artifact, CoreResult, FailureClass, Lease, Repository, Run, RunDiffSnapshot, RunId, RunLogEvent,
    RunState, RunStructuredEvent, RunToolProjection, Task, TaskId, TaskRuntime,
    TaskRuntimeEventCheckpoint, TaskRuntimeId, TaskRuntimeRegistration,
};
use parking_lot::Mutex;

use crate::store::{RunFilter, Store, TaskCleanupCriteria};

#[derive(Default)]
struct Inner {
    repositories: HashMap<oj_core::RepositoryId, Repository>,
    tasks: HashMap<TaskId, Task>,
    runs: HashMap<RunId, Run>,
    runtimes: HashMap<TaskRuntimeId, TaskRuntime>,
    registrations: HashMap<String, TaskRuntimeRegistration>,
    structured_events: HashMap<RunId, Vec<RunStructuredEvent>>,
    diff_snapshots: HashMap<RunId, RunDiffSnapshot>,
    tool_projections: HashMap<(RunId, String), RunToolProjection>,
    artifacts: HashMap<(RunId, String), Artifact>,
    checkpoints: HashMap<TaskRuntimeId, TaskRuntimeEventCheckpoint>,
    leases: HashMap<String, Lease>,
    log_events: HashMap<RunId, Vec<RunLogEvent>>,
}

/// In-memory [`Store`]. Seeded directly via [`InMemoryStore::seed_task`] /
/// [`InMemoryStore::seed_repository`] in tests; production callers go
/// through the regular `insert_run`/`upsert_task_runtime` paths.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_task(&self, task: Task) {
        self.inner.lock().tasks.insert(task.id, task);
    }

    pub fn seed_repository(&self, repository: Repository) {
        self.inner.lock().repositories.insert(repository.id, repository);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_repository(&self, id: oj_core::RepositoryId) -> CoreResult<Option<Repository>> {
        Ok(self.inner.lock().repositories.get(&id).cloned())
    }

    async fn mark_repository_synced(&self, id: oj_core::RepositoryId, now_ms: u64) -> CoreResult<()> {
        if let Some(repo) = self.inner.lock().repositories.get_mut(&id) {
            repo.last_synced_at_ms = Some(now_ms);
        }
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> CoreResult<Option<Task>> {
        Ok(self.inner.lock().tasks.get(&id).cloned())
    }

    async fn list_tasks(&self) -> CoreResult<Vec<Task>> {
        Ok(self.inner.lock().tasks.values().cloned().collect())
    }

    async fn touch_task_git_sync(&self, _id: TaskId, _now_ms: u64) -> CoreResult<()> {
        // Last-git-sync metadata lives on the task row in a real store; the
        // in-memory implementation has nowhere to put it and the core never
        // reads it back, so this is intentionally a no-op.
        Ok(())
    }

    async fn insert_run(&self, run: Run) -> CoreResult<()> {
        self.inner.lock().runs.insert(run.id, run);
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> CoreResult<Option<Run>> {
        Ok(self.inner.lock().runs.get(&id).cloned())
    }

    async fn list_runs(&self, filter: RunFilter) -> CoreResult<Vec<Run>> {
        Ok(self
            .inner
            .lock()
            .runs
            .values()
            .filter(|r| filter.task_id.map(|t| t == r.task_id).unwrap_or(true))
            .filter(|r| filter.state.map(|s| s == r.state).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn oldest_queued_run(&self, task_id: TaskId) -> CoreResult<Option<Run>> {
        Ok(self
            .inner
            .lock()
            .runs
            .values()
            .filter(|r| r.task_id == task_id && r.state == RunState::Queued)
            .min_by_key(|r| r.created_at_ms)
            .cloned())
    }

    async fn count_running(&self, task_id: TaskId) -> CoreResult<u32> {
        Ok(self
            .inner
            .lock()
            .runs
            .values()
            .filter(|r| r.task_id == task_id && r.state == RunState::Running)
            .count() as u32)
    }

    async fn mark_run_running(
        &self,
        id: RunId,
        runtime_id: TaskRuntimeId,
        worker_image_ref: String,
        worker_image_digest: Option<String>,
        now_ms: u64,
    ) -> CoreResult<()> {
        if let Some(run) = self.inner.lock().runs.get_mut(&id) {
            run.mark_running(runtime_id, worker_image_ref, worker_image_digest, now_ms);
        }
        Ok(())
    }

    async fn mark_run_terminal(
        &self,
        id: RunId,
        state: RunState,
        summary: Option<String>,
        output_json: Option<String>,
        failure_class: Option<FailureClass>,
        pr_url: Option<String>,
        now_ms: u64,
    ) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        let Some(run) = inner.runs.get_mut(&id) else {
            return Ok(false);
        };
        Ok(run.mark_terminal(state, summary, output_json, failure_class, pr_url, now_ms))
    }

    async fn mark_run_obsolete(&self, id: RunId) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        let Some(run) = inner.runs.get_mut(&id) else {
            return Ok(false);
        };
        Ok(run.mark_obsolete())
    }

    async fn list_task_runtimes(&self) -> CoreResult<Vec<TaskRuntime>> {
        Ok(self.inner.lock().runtimes.values().cloned().collect())
    }

    async fn get_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<Option<TaskRuntime>> {
        Ok(self.inner.lock().runtimes.get(&id).cloned())
    }

    async fn get_task_runtime_for_task(&self, task_id: TaskId) -> CoreResult<Option<TaskRuntime>> {
        Ok(self.inner.lock().runtimes.values().find(|r| r.task_id == task_id).cloned())
    }

    async fn upsert_task_runtime(&self, runtime: TaskRuntime) -> CoreResult<()> {
        self.inner.lock().runtimes.insert(runtime.id, runtime);
        Ok(())
    }

    async fn delete_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<()> {
        self.inner.lock().runtimes.remove(&id);
        Ok(())
    }

    async fn save_registration(&self, registration: TaskRuntimeRegistration, now_ms: u64) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(runtime) = inner.runtimes.values_mut().find(|r| r.task_id == registration.task_id) {
            runtime.active_runs = registration.max_parallel_runs.min(runtime.active_runs);
            runtime.record_activity(now_ms);
        }
        inner.registrations.insert(registration.runtime_id.clone(), registration);
        Ok(())
    }

    async fn get_registration(&self, runtime_id: &str) -> CoreResult<Option<TaskRuntimeRegistration>> {
        Ok(self.inner.lock().registrations.get(runtime_id).cloned())
    }

    async fn append_structured_event(&self, event: RunStructuredEvent) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        let events = inner.structured_events.entry(event.run_id).or_default();
        if events.iter().any(|e| e.sequence == event.sequence) {
            return Ok(false);
        }
        events.push(event);
        Ok(true)
    }

    async fn list_structured_events(&self, run_id: RunId) -> CoreResult<Vec<RunStructuredEvent>> {
        let mut events = self.inner.lock().structured_events.get(&run_id).cloned().unwrap_or_default();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn upsert_diff_snapshot(&self, snapshot: RunDiffSnapshot) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner.diff_snapshots.entry(snapshot.run_id);
        match entry {
            std::collections::hash_map::Entry::Occupied(mut o) => {
                if snapshot.sequence > o.get().sequence {
                    o.insert(snapshot);
                }
            }
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(snapshot);
            }
        }
        Ok(())
    }

    async fn latest_diff_snapshot(&self, run_id: RunId) -> CoreResult<Option<RunDiffSnapshot>> {
        Ok(self.inner.lock().diff_snapshots.get(&run_id).cloned())
    }

    async fn upsert_tool_projection(&self, projection: RunToolProjection) -> CoreResult<()> {
        self.inner.lock().tool_projections.insert((projection.run_id, projection.tool_call_id.clone()), projection);
        Ok(())
    }

    async fn list_tool_projections(&self, run_id: RunId) -> CoreResult<Vec<RunToolProjection>> {
        Ok(self
            .inner
            .lock()
            .tool_projections
            .values()
            .filter(|p| p.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn save_artifact(&self, artifact: Artifact) -> CoreResult<()> {
        self.inner.lock().artifacts.insert((artifact.run_id, artifact.file_name.clone()), artifact);
        Ok(())
    }

    async fn list_artifacts(&self, run_id: RunId) -> CoreResult<Vec<Artifact>> {
        Ok(self.inner.lock().artifacts.values().filter(|a| a.run_id == run_id).cloned().collect())
    }

    async fn get_checkpoint(&self, runtime_id: TaskRuntimeId) -> CoreResult<TaskRuntimeEventCheckpoint> {
        Ok(self
            .inner
            .lock()
            .checkpoints
            .get(&runtime_id)
            .cloned()
            .unwrap_or_else(|| TaskRuntimeEventCheckpoint::fresh(runtime_id)))
    }

    async fn save_checkpoint(&self, checkpoint: TaskRuntimeEventCheckpoint) -> CoreResult<()> {
        self.inner.lock().checkpoints.insert(checkpoint.runtime_id, checkpoint);
        Ok(())
    }

    async fn acquire_lease(&self, name: &str, owner_id: &str, expires_at_utc_ms: u64, now_ms: u64) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        let acquirable = match inner.leases.get(name) {
            Some(existing) => existing.is_expired(now_ms) || existing.is_held_by(owner_id),
            None => true,
        };
        if !acquirable {
            return Ok(false);
        }
        inner
            .leases
            .insert(name.to_string(), Lease { name: name.to_string(), owner_id: owner_id.to_string(), expires_at_utc_ms });
        Ok(true)
    }

    async fn release_lease(&self, name: &str, owner_id: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.leases.get(name).map(|l| l.is_held_by(owner_id)).unwrap_or(false) {
            inner.leases.remove(name);
        }
        Ok(())
    }

    async fn get_lease(&self, name: &str) -> CoreResult<Option<Lease>> {
        Ok(self.inner.lock().leases.get(name).cloned())
    }

    async fn append_log_event(&self, event: RunLogEvent) -> CoreResult<()> {
        self.inner.lock().log_events.entry(event.run_id).or_default().push(event);
        Ok(())
    }

    async fn list_log_events(&self, run_id: RunId) -> CoreResult<Vec<RunLogEvent>> {
        Ok(self.inner.lock().log_events.get(&run_id).cloned().unwrap_or_default())
    }

    async fn prune_structured_rows_older_than(&self, older_than_ms: u64, batch_size: u32) -> CoreResult<u64> {
        let mut inner = self.inner.lock();
        let mut pruned = 0u64;
        for events in inner.structured_events.values_mut() {
            let before = events.len();
            events.retain(|e| e.timestamp_ms >= older_than_ms || pruned >= batch_size as u64);
            pruned += (before - events.len()) as u64;
        }
        for logs in inner.log_events.values_mut() {
            let before = logs.len();
            logs.retain(|e| e.timestamp_ms >= older_than_ms || pruned >= batch_size as u64);
            pruned += (before - logs.len()) as u64;
        }
        Ok(pruned)
    }

    async fn list_cleanup_eligible_tasks(&self, now_ms: u64, criteria: &TaskCleanupCriteria) -> CoreResult<Vec<TaskId>> {
        let inner = self.inner.lock();
        let protected_cutoff = now_ms.saturating_sub(criteria.protected_days_ms);
        let age_cutoff = now_ms.saturating_sub(criteria.min_age_ms);
        let mut candidates: Vec<&Task> = inner
            .tasks
            .values()
            .filter(|t| t.created_at_ms <= age_cutoff)
            .filter(|t| t.created_at_ms <= protected_cutoff)
            .filter(|t| !inner.runs.values().any(|r| r.task_id == t.id && r.state == RunState::Running))
            .collect();
        candidates.sort_by_key(|t| t.created_at_ms);
        Ok(candidates.into_iter().take(criteria.batch_size as usize).map(|t| t.id).collect())
    }

    async fn delete_task_cascade(&self, id: TaskId) -> CoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.tasks.remove(&id).is_none() {
            return Ok(false);
        }
        let run_ids: Vec<RunId> = inner.runs.values().filter(|r| r.task_id == id).map(|r| r.id).collect();
        for run_id in run_ids {
            inner.runs.remove(&run_id);
            inner.structured_events.remove(&run_id);
            inner.diff_snapshots.remove(&run_id);
            inner.log_events.remove(&run_id);
            inner.tool_projections.retain(|(r, _), _| *r != run_id);
            inner.artifacts.retain(|(r, _), _| *r != run_id);
        }
        let runtime_ids: Vec<TaskRuntimeId> = inner.runtimes.values().filter(|r| r.task_id == id).map(|r| r.id).collect();
        for runtime_id in runtime_ids {
            inner.runtimes.remove(&runtime_id);
        }
        Ok(true)
    }

    async fn approximate_size_bytes(&self) -> CoreResult<u64> {
        let inner = self.inner.lock();
        let rows = inner.tasks.len()
            + inner.runs.len()
            + inner.structured_events.values().map(|v| v.len()).sum::<usize>()
            + inner.log_events.values().map(|v| v.len()).sum::<usize>()
            + inner.artifacts.len();
        Ok(rows as u64 * 512)
    }

    async fn vacuum(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
