// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention Cleanup: a lease-guarded singleton loop that prunes structured
//! sub-rows past their retention window, deletes tasks that have aged out,
//! and — only under size pressure — deletes further tasks and runs a
//! `VACUUM` to actually reclaim the space.
//!
//! Guarded by a named lease so a fleet of daemons runs exactly one cleanup
//! cycle at a time; the TTL is `2x` the cleanup interval so a daemon that
//! dies mid-cycle doesn't wedge the lease for the next one
//! ([`crate::config::RetentionConfig::lease_ttl`]).

use std::sync::Arc;
use std::time::Duration;

use oj_core::{Clock, CoreResult};
use oj_storage::{Store, TaskCleanupCriteria};
use tokio::sync::oneshot;

use crate::config::RetentionConfig;
use crate::lease::LeaseCoordinator;

const LEASE_NAME: &str = "maintenance-task-cleanup";

/// Why a cleanup cycle ran (or didn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// A full scheduled cycle: structured-row pruning plus age-based task
    /// deletion.
    Scheduled,
    /// Triggered in addition to (or instead of) `Scheduled` because the
    /// store was over `db_soft_limit_bytes`.
    SizePressure,
}

/// Outcome of one cleanup cycle, logged by the daemon at `info` level.
#[derive(Debug, Clone)]
pub struct CleanupSummary {
    pub executed: bool,
    pub reason: Option<CleanupReason>,
    pub structured_rows_pruned: u64,
    pub tasks_deleted: u32,
    pub failed_tasks: u32,
    pub initial_bytes: u64,
    pub final_bytes: u64,
    pub vacuum_executed: bool,
}

impl CleanupSummary {
    fn skipped() -> Self {
        Self {
            executed: false,
            reason: None,
            structured_rows_pruned: 0,
            tasks_deleted: 0,
            failed_tasks: 0,
            initial_bytes: 0,
            final_bytes: 0,
            vacuum_executed: false,
        }
    }
}

pub struct RetentionCleanup<C: Clock> {
    store: Arc<dyn Store>,
    clock: C,
    config: RetentionConfig,
    lease: LeaseCoordinator<C>,
}

impl<C: Clock> RetentionCleanup<C> {
    pub fn new(store: Arc<dyn Store>, clock: C, config: RetentionConfig, owner_id: impl Into<String>) -> Self {
        let lease = LeaseCoordinator::new(store.clone(), clock.clone(), LEASE_NAME, owner_id);
        Self { store, clock, config, lease }
    }

    /// Run one cleanup cycle if this process currently holds (or can
    /// acquire) the singleton lease; otherwise a no-op, since another
    /// daemon in the fleet is already doing it.
    pub async fn run_once(&self) -> CoreResult<CleanupSummary> {
        if !self.lease.try_acquire(self.config.lease_ttl()).await? {
            return Ok(CleanupSummary::skipped());
        }

        let now = self.clock.epoch_ms();
        let structured_rows_pruned = self.prune_structured_rows(now).await?;
        let (age_deleted, age_failed) = self.delete_aged_tasks(now).await?;

        let initial_bytes = self.store.approximate_size_bytes().await?;
        let (pressure_deleted, pressure_failed, final_bytes) = self.relieve_size_pressure(now, initial_bytes).await?;

        let tasks_deleted = age_deleted + pressure_deleted;
        let vacuum_executed = pressure_deleted >= self.config.vacuum_min_deleted_rows;
        if vacuum_executed {
            self.store.vacuum().await?;
        }

        let reason = if pressure_deleted > 0 { Some(CleanupReason::SizePressure) } else { Some(CleanupReason::Scheduled) };

        Ok(CleanupSummary {
            executed: true,
            reason,
            structured_rows_pruned,
            tasks_deleted,
            failed_tasks: age_failed + pressure_failed,
            initial_bytes,
            final_bytes,
            vacuum_executed,
        })
    }

    /// Delete structured sub-rows older than `structured_retention_secs` in
    /// bounded batches until a batch comes back empty, so one cycle never
    /// blocks on an unbounded table scan.
    async fn prune_structured_rows(&self, now_ms: u64) -> CoreResult<u64> {
        let older_than_ms = now_ms.saturating_sub(self.config.structured_retention_secs * 1000);
        let mut total = 0u64;
        loop {
            let pruned = self.store.prune_structured_rows_older_than(older_than_ms, self.config.structured_prune_batch_size).await?;
            if pruned == 0 {
                break;
            }
            total += pruned;
            if pruned < self.config.structured_prune_batch_size as u64 {
                break;
            }
        }
        Ok(total)
    }

    /// Delete tasks that are old enough, outside their protected window,
    /// and have no runs still in flight, up to `max_tasks_deleted_per_tick`.
    async fn delete_aged_tasks(&self, now_ms: u64) -> CoreResult<(u32, u32)> {
        let criteria = TaskCleanupCriteria {
            min_age_ms: self.config.task_min_age_secs * 1000,
            protected_days_ms: self.config.cleanup_protected_days * 24 * 60 * 60 * 1000,
            exclude_open_findings: self.config.exclude_open_findings,
            batch_size: self.config.max_tasks_deleted_per_tick,
        };
        self.delete_eligible(now_ms, &criteria).await
    }

    /// If the store is over its soft size limit, delete further
    /// age-eligible tasks in small batches until it's back under
    /// `db_target_bytes` or there's nothing left to delete.
    async fn relieve_size_pressure(&self, now_ms: u64, initial_bytes: u64) -> CoreResult<(u32, u32, u64)> {
        if initial_bytes < self.config.db_soft_limit_bytes {
            return Ok((0, 0, initial_bytes));
        }
        let criteria = TaskCleanupCriteria {
            min_age_ms: self.config.task_min_age_secs * 1000,
            protected_days_ms: self.config.cleanup_protected_days * 24 * 60 * 60 * 1000,
            exclude_open_findings: self.config.exclude_open_findings,
            batch_size: self.config.deletion_batch_size,
        };

        let mut deleted = 0u32;
        let mut failed = 0u32;
        let mut size = initial_bytes;
        loop {
            if size < self.config.db_target_bytes {
                break;
            }
            let (batch_deleted, batch_failed) = self.delete_eligible(now_ms, &criteria).await?;
            deleted += batch_deleted;
            failed += batch_failed;
            if batch_deleted == 0 {
                break;
            }
            size = self.store.approximate_size_bytes().await?;
        }
        Ok((deleted, failed, size))
    }

    async fn delete_eligible(&self, now_ms: u64, criteria: &TaskCleanupCriteria) -> CoreResult<(u32, u32)> {
        let ids = self.store.list_cleanup_eligible_tasks(now_ms, criteria).await?;
        let mut deleted = 0u32;
        let mut failed = 0u32;
        for id in ids {
            match self.store.delete_task_cascade(id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(task_id = %id, error = %e, "retention: task delete failed");
                    failed += 1;
                }
            }
        }
        Ok((deleted, failed))
    }

    /// Run the cleanup cycle on `cleanup_interval_secs` until `shutdown`
    /// fires, releasing the lease on the way out so a peer can pick it up
    /// without waiting for the TTL to expire.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(summary) if summary.executed => {
                            tracing::info!(
                                tasks_deleted = summary.tasks_deleted,
                                structured_rows_pruned = summary.structured_rows_pruned,
                                vacuum_executed = summary.vacuum_executed,
                                "retention cleanup cycle completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "retention cleanup cycle failed"),
                    }
                }
                _ = &mut shutdown => {
                    let _ = self.lease.release().await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
