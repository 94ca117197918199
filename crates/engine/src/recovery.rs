// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery Service: reconciles state a crashed or restarted daemon can no
//! longer trust — runs left `Running` with nobody listening for their
//! completion, containers docker still knows about that no run references
//! any more, and runs that are technically still `Running` but have
//! stopped making progress.
//!
//! [`RecoveryService::run_startup_recovery`] (`recover_orphaned_runs` +
//! `reconcile_orphaned_containers`) runs exactly once, before the event
//! listener opens a single connection — these assume every `Running` run
//! is orphaned, which is only true immediately after a restart.
//! [`RecoveryService::run_once`] (the stale/zombie/overdue sweeps) runs
//! additionally on [`crate::config::RecoveryConfig::interval_secs`] for the
//! lifetime of the process, since a runtime can stop making progress long
//! after startup.

use std::sync::Arc;
use std::time::Duration;

use oj_adapters::{AdapterBundle, Publisher, Severity};
use oj_core::{Clock, CoreResult, FailureClass, Run, RunState};
use oj_storage::{RunFilter, Store};
use tokio::sync::oneshot;

use crate::config::RecoveryConfig;

/// Counts from one recovery pass, useful for tests and the startup log
/// line; not surfaced over the control socket (the incidents list already
/// carries the operator-visible trail via [`Publisher::notify_incident`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub orphaned_runs: u32,
    pub orphaned_containers: u32,
    pub stale_runs: u32,
    pub zombie_runs: u32,
    pub overdue_runs: u32,
}

pub struct RecoveryService<C: Clock> {
    store: Arc<dyn Store>,
    adapters: AdapterBundle,
    publisher: Arc<dyn Publisher>,
    clock: C,
    config: RecoveryConfig,
}

impl<C: Clock> RecoveryService<C> {
    pub fn new(store: Arc<dyn Store>, adapters: AdapterBundle, publisher: Arc<dyn Publisher>, clock: C, config: RecoveryConfig) -> Self {
        Self { store, adapters, publisher, clock, config }
    }

    /// Runs exactly once, right after the daemon signals started and
    /// before the event listener opens a single connection: every run left
    /// `Running` by the previous process has no listener surviving the
    /// restart and can never complete on its own, so it is failed
    /// unconditionally; orphaned containers are swept in the same pass so
    /// they read as idle before anything else touches them.
    pub async fn run_startup_recovery(&self) -> CoreResult<RecoverySummary> {
        let orphaned_runs = self.recover_orphaned_runs().await?;
        let orphaned_containers = self.reconcile_orphaned_containers().await?;
        Ok(RecoverySummary { orphaned_runs, orphaned_containers, stale_runs: 0, zombie_runs: 0, overdue_runs: 0 })
    }

    /// The periodic progress-based sweeps: unlike [`Self::run_startup_recovery`],
    /// these never assume a run is orphaned just because it is `Running` —
    /// only stalled, impossible, or overdue runs are touched — so this is
    /// safe to call on every tick for the lifetime of the process.
    pub async fn run_once(&self) -> CoreResult<RecoverySummary> {
        let stale_runs = self.detect_stale().await?;
        let zombie_runs = self.detect_zombie().await?;
        let overdue_runs = self.detect_overdue().await?;
        Ok(RecoverySummary { orphaned_runs: 0, orphaned_containers: 0, stale_runs, zombie_runs, overdue_runs })
    }

    /// Every run still `Running` at process start has no listener
    /// connection backing it any more (connections are per-process
    /// in-memory state) and can never complete on its own; fail it rather
    /// than leave it stuck forever.
    async fn recover_orphaned_runs(&self) -> CoreResult<u32> {
        let running = self.store.list_runs(RunFilter { task_id: None, state: Some(RunState::Running) }).await?;
        let now = self.clock.epoch_ms();
        let mut count = 0u32;
        for run in running {
            self.terminate(&run, FailureClass::OrphanRecovery, "recovered at startup: no listener connection survives a restart", now, false)
                .await?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove every managed container docker still knows about whose
    /// `runId` label doesn't match a run this store still has on file.
    async fn reconcile_orphaned_containers(&self) -> CoreResult<u32> {
        let managed = self.adapters.containers.list_managed().await.map_err(oj_core::CoreError::from)?;
        let mut count = 0u32;
        for (container_id, labels) in managed {
            let known = match &labels.run_id {
                Some(run_id) => self.store.get_run(oj_core::RunId::from_string(run_id)).await?.is_some(),
                None => true,
            };
            if !known {
                self.adapters.containers.remove(&container_id).await.map_err(oj_core::CoreError::from)?;
                self.notify(Severity::Warning, "orphaned container removed", &format!("{container_id} (task {})", labels.task_id)).await;
                count += 1;
            }
        }
        Ok(count)
    }

    /// `Running` runs whose hosting runtime has gone quiet for longer than
    /// `stale_run_threshold_minutes`: soft-terminated, the container is
    /// left alone (it may still be doing useful work the runtime just
    /// hasn't reported back yet).
    async fn detect_stale(&self) -> CoreResult<u32> {
        let threshold_ms = self.config.stale_run_threshold_minutes * 60_000;
        let now = self.clock.epoch_ms();
        let mut count = 0u32;
        for run in self.store.list_runs(RunFilter { task_id: None, state: Some(RunState::Running) }).await? {
            let Some(runtime_id) = run.runtime_id else { continue };
            let Some(runtime) = self.store.get_task_runtime(runtime_id).await? else { continue };
            if now.saturating_sub(runtime.last_activity_utc_ms) >= threshold_ms {
                self.terminate(&run, FailureClass::StaleRun, "no activity from the hosting runtime within the stale threshold", now, false).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// `Running` runs whose hosting container no longer exists at all:
    /// force-terminated since there is nothing left to gracefully drain.
    async fn detect_zombie(&self) -> CoreResult<u32> {
        let now = self.clock.epoch_ms();
        let managed = self.adapters.containers.list_managed().await.map_err(oj_core::CoreError::from)?;
        let live_container_ids: std::collections::HashSet<_> = managed.into_iter().map(|(id, _)| id).collect();
        let mut count = 0u32;
        for run in self.store.list_runs(RunFilter { task_id: None, state: Some(RunState::Running) }).await? {
            let Some(runtime_id) = run.runtime_id else { continue };
            let Some(runtime) = self.store.get_task_runtime(runtime_id).await? else { continue };
            let Some(container_id) = &runtime.container_id else { continue };
            if !live_container_ids.contains(container_id) {
                self.terminate(&run, FailureClass::ZombieRun, "hosting container no longer exists", now, true).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// `Running` runs that have exceeded `max_run_age_hours` regardless of
    /// activity: force-terminated as a hard backstop against a runaway
    /// harness that keeps reporting activity but never finishes.
    async fn detect_overdue(&self) -> CoreResult<u32> {
        let max_age_ms = self.config.max_run_age_hours * 60 * 60_000;
        let now = self.clock.epoch_ms();
        let mut count = 0u32;
        for run in self.store.list_runs(RunFilter { task_id: None, state: Some(RunState::Running) }).await? {
            let Some(started_at) = run.started_at_ms else { continue };
            if now.saturating_sub(started_at) >= max_age_ms {
                self.terminate(&run, FailureClass::OverdueRun, "exceeded the maximum run age", now, true).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn terminate(&self, run: &Run, failure_class: FailureClass, detail: &str, now: u64, force_kill: bool) -> CoreResult<()> {
        let changed = self
            .store
            .mark_run_terminal(run.id, RunState::Failed, Some(detail.to_string()), None, Some(failure_class), None, now)
            .await?;
        if !changed {
            return Ok(());
        }
        if force_kill {
            if let Some(runtime_id) = run.runtime_id {
                if let Some(runtime) = self.store.get_task_runtime(runtime_id).await? {
                    if let Some(container_id) = runtime.container_id {
                        let _ = self.adapters.containers.kill(&container_id).await;
                    }
                }
            }
        }
        self.notify(Severity::Warning, "run terminated by recovery", &format!("{}: {failure_class} ({detail})", run.id)).await;
        Ok(())
    }

    async fn notify(&self, severity: Severity, title: &str, message: &str) {
        if let Err(e) = self.publisher.notify_incident(severity, title, message).await {
            tracing::warn!(error = %e, "failed to publish recovery notification");
        }
    }

    /// Periodic stale/zombie/overdue sweep on `interval_secs` until
    /// `shutdown` fires. Callers run [`Self::run_startup_recovery`] once,
    /// separately, before spawning this loop.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        if !self.config.run_periodically {
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "recovery sweep failed");
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
