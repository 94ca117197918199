// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run Dispatcher: picks (or provisions) a task runtime for a queued run,
//! submits the start command, and records the resulting `Running`
//! transition. Scale-out beyond the task's existing runtimes is gated by a
//! rolling window of failed start attempts so a broken image doesn't spin
//! up runtime after runtime.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use oj_adapters::AdapterBundle;
use oj_core::{Clock, CoreError, CoreResult, Repository, Run, Task, TaskId, TaskRuntime};
use oj_storage::Store;
use parking_lot::Mutex;
use oj_wire::StartCommand;

use crate::config::DispatcherConfig;
use crate::lifecycle::LifecycleManager;

#[derive(Default)]
struct ScaleOutState {
    /// Timestamps (ms) of failed start attempts within the rolling window.
    failures: VecDeque<u64>,
    cooldown_until_ms: Option<u64>,
}

/// Whether a dispatch attempt actually moved a run to `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    /// No runtime had capacity and scale-out is currently gated or capped;
    /// the run stays `Queued` for a future drainer tick.
    NoCapacity,
}

pub struct Dispatcher<C: Clock> {
    store: Arc<dyn Store>,
    adapters: AdapterBundle,
    lifecycle: Arc<LifecycleManager<C>>,
    clock: C,
    config: DispatcherConfig,
    scale_out: Mutex<HashMap<TaskId, ScaleOutState>>,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(store: Arc<dyn Store>, adapters: AdapterBundle, lifecycle: Arc<LifecycleManager<C>>, clock: C, config: DispatcherConfig) -> Self {
        Self { store, adapters, lifecycle, clock, config, scale_out: Mutex::new(HashMap::new()) }
    }

    /// Atomically claim the oldest queued run for `task_id`, if the task's
    /// concurrency limit has headroom, and dispatch it. Returns `false`
    /// with no state change if there is nothing to claim or no headroom.
    pub async fn dispatch_next_queued_for_task(&self, task_id: TaskId) -> CoreResult<bool> {
        let task = self.store.get_task(task_id).await?.ok_or_else(|| CoreError::NotFound(task_id.to_string()))?;
        let running = self.store.count_running(task_id).await?;
        if running >= task.concurrency_limit {
            return Ok(false);
        }
        let Some(run) = self.store.oldest_queued_run(task_id).await? else {
            return Ok(false);
        };
        let repository = self.store.get_repository(run.repository_id).await?.ok_or_else(|| CoreError::NotFound(run.repository_id.to_string()))?;
        let outcome = self.dispatch(&repository, &task, run).await?;
        Ok(outcome == DispatchOutcome::Dispatched)
    }

    /// Select (or provision) a runtime with capacity for `task`, submit
    /// `run` to it, and mark the run `Running` on success.
    pub async fn dispatch(&self, repository: &Repository, task: &Task, run: Run) -> CoreResult<DispatchOutcome> {
        let candidate = self.select_candidate(task.id).await?;
        let runtime = match candidate {
            Some(runtime) => runtime,
            None => match self.try_scale_out(task, repository).await? {
                Some(runtime) => runtime,
                None => return Ok(DispatchOutcome::NoCapacity),
            },
        };

        let branch_name = repository.run_branch_name(&task.id, &run.id);
        let client = self.adapters.runtime_clients.client_for(&runtime.id, &runtime.endpoint);
        let ack = client
            .start_command(StartCommand {
                run_id: run.id,
                repository_clone_url: repository.clone_url.clone(),
                branch_name,
                harness: task.harness.clone(),
                prompt: task.prompt_template.clone(),
                command: task.command.clone(),
                execution_mode: run.execution_mode.clone(),
                structured_protocol: run.structured_protocol.clone(),
                session_profile_id: run.session_profile_id.clone(),
                mcp_config_snapshot_json: run.mcp_config_snapshot_json.clone(),
            })
            .await;

        match ack {
            Ok(ack) if ack.success => {
                self.store
                    .mark_run_running(run.id, runtime.id, task.worker_image_ref.clone(), None, self.clock.epoch_ms())
                    .await?;
                Ok(DispatchOutcome::Dispatched)
            }
            // Dispatch RPC failures leave the run `Queued` for re-pickup
            // rather than failing it outright.
            Ok(_) | Err(_) => Ok(DispatchOutcome::NoCapacity),
        }
    }

    /// Ready/busy, non-draining runtime for `task_id` with a free slot,
    /// ranked by fewest active runs then oldest activity.
    async fn select_candidate(&self, task_id: TaskId) -> CoreResult<Option<TaskRuntime>> {
        let mut candidates: Vec<TaskRuntime> =
            self.store.list_task_runtimes().await?.into_iter().filter(|r| r.task_id == task_id && r.has_capacity()).collect();
        candidates.sort_by_key(|r| (r.active_runs, r.last_activity_utc_ms));
        Ok(candidates.into_iter().next())
    }

    async fn try_scale_out(&self, task: &Task, repository: &Repository) -> CoreResult<Option<TaskRuntime>> {
        let now = self.clock.epoch_ms();
        let existing = self.store.list_task_runtimes().await?.into_iter().filter(|r| r.task_id == task.id).count() as u32;
        if existing >= self.config.max_runtimes_per_task {
            return Ok(None);
        }
        if self.in_cooldown(task.id, now) {
            return Ok(None);
        }

        match self.lifecycle.provision_task_runtime(task, repository).await {
            Ok(runtime) => {
                self.record_scale_out_attempt(task.id, now, true);
                Ok(Some(runtime))
            }
            Err(e) => {
                self.record_scale_out_attempt(task.id, now, false);
                Err(e)
            }
        }
    }

    fn in_cooldown(&self, task_id: TaskId, now_ms: u64) -> bool {
        let guard = self.scale_out.lock();
        match guard.get(&task_id).and_then(|s| s.cooldown_until_ms) {
            Some(until) => now_ms < until,
            None => false,
        }
    }

    fn record_scale_out_attempt(&self, task_id: TaskId, now_ms: u64, success: bool) {
        let window_ms = self.config.scale_out_window_secs * 1000;
        let mut guard = self.scale_out.lock();
        let state = guard.entry(task_id).or_default();
        if success {
            state.failures.clear();
            state.cooldown_until_ms = None;
            return;
        }
        state.failures.push_back(now_ms);
        while let Some(oldest) = state.failures.front() {
            if now_ms.saturating_sub(*oldest) > window_ms {
                state.failures.pop_front();
            } else {
                break;
            }
        }
        if state.failures.len() as u32 >= self.config.scale_out_failure_threshold {
            state.cooldown_until_ms = Some(now_ms + self.config.scale_out_cooldown_secs * 1000);
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
