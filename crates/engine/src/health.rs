// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health Supervisor: classifies each task runtime's reachability,
//! remediates unhealthy ones (restart, recycle, quarantine) under a
//! cooldown, and tracks the bounded incident history the control socket
//! surfaces via `ListIncidents`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use oj_adapters::{AdapterBundle, Publisher, Severity};
use oj_core::{Clock, CoreResult, HealthState, Incident, RuntimeHealth, TaskRuntimeId, TaskRuntimeState};
use oj_storage::Store;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::{ContainerUnhealthyAction, HealthConfig};
use crate::lifecycle::LifecycleManager;

struct Tracked {
    health: RuntimeHealth,
    restart_attempts: u32,
    last_seen_ms: u64,
}

impl Tracked {
    fn new(runtime_id: TaskRuntimeId, now_ms: u64) -> Self {
        Self { health: RuntimeHealth::new(runtime_id), restart_attempts: 0, last_seen_ms: now_ms }
    }
}

/// Probes every task runtime on a cycle, remediates unhealthy ones, and
/// gates overall readiness when too large a fraction is unreachable.
pub struct HealthSupervisor<C: Clock> {
    store: Arc<dyn Store>,
    adapters: AdapterBundle,
    lifecycle: Arc<LifecycleManager<C>>,
    publisher: Arc<dyn Publisher>,
    clock: C,
    config: HealthConfig,
    tracked: Mutex<HashMap<TaskRuntimeId, Tracked>>,
    readiness_bad_since_ms: Mutex<Option<u64>>,
    readiness_blocked: Mutex<bool>,
}

impl<C: Clock> HealthSupervisor<C> {
    pub fn new(
        store: Arc<dyn Store>,
        adapters: AdapterBundle,
        lifecycle: Arc<LifecycleManager<C>>,
        publisher: Arc<dyn Publisher>,
        clock: C,
        config: HealthConfig,
    ) -> Self {
        Self {
            store,
            adapters,
            lifecycle,
            publisher,
            clock,
            config,
            tracked: Mutex::new(HashMap::new()),
            readiness_bad_since_ms: Mutex::new(None),
            readiness_blocked: Mutex::new(false),
        }
    }

    pub fn incidents(&self, runtime_id: Option<TaskRuntimeId>) -> Vec<Incident> {
        let guard = self.tracked.lock();
        guard
            .values()
            .filter(|t| runtime_id.is_none_or(|id| t.health.runtime_id == id))
            .flat_map(|t| t.health.incidents().cloned())
            .collect()
    }

    pub fn is_readiness_blocked(&self) -> bool {
        *self.readiness_blocked.lock()
    }

    /// One full probe cycle over every known task runtime.
    pub async fn run_once(&self) -> CoreResult<()> {
        let now = self.clock.epoch_ms();
        let runtimes = self.store.list_task_runtimes().await?;

        for runtime in &runtimes {
            if runtime.state == TaskRuntimeState::Stopped {
                continue;
            }
            self.probe_one(runtime.id, runtime.last_activity_utc_ms, &runtime.endpoint, now).await;
        }

        self.prune_stale(&runtimes, now);
        self.update_readiness(&runtimes, now).await;
        Ok(())
    }

    async fn probe_one(&self, runtime_id: TaskRuntimeId, last_activity_ms: u64, endpoint: &str, now: u64) {
        let heartbeat_ok = now.saturating_sub(last_activity_ms) <= self.config.heartbeat_stale_after_secs * 1000;
        let probe_ok = self.adapters.runtime_clients.client_for(&runtime_id, endpoint).check_health().await.map(|r| r.success).unwrap_or(false);

        let mut guard = self.tracked.lock();
        let tracked = guard.entry(runtime_id).or_insert_with(|| Tracked::new(runtime_id, now));
        tracked.last_seen_ms = now;

        if heartbeat_ok && probe_ok {
            tracked.health.record_probe_success(now);
            return;
        }

        tracked.health.record_probe_failure(now, format!("heartbeat_ok={heartbeat_ok} probe_ok={probe_ok}"));
        if !heartbeat_ok {
            tracked.health.state = HealthState::Unhealthy;
        }

        if tracked.health.state == HealthState::Unhealthy && tracked.health.remediation_allowed(now, self.config.remediation_cooldown_secs * 1000) {
            drop(guard);
            self.remediate(runtime_id, now).await;
        }
    }

    async fn remediate(&self, runtime_id: TaskRuntimeId, now: u64) {
        let attempts = {
            let guard = self.tracked.lock();
            guard.get(&runtime_id).map(|t| t.restart_attempts).unwrap_or(0)
        };

        if attempts < self.config.restart_limit {
            match self.lifecycle.restart_task_runtime(runtime_id).await {
                Ok(_) => self.on_remediation(runtime_id, now, true, "restart requested", Severity::Warning).await,
                Err(e) => self.on_remediation(runtime_id, now, false, &format!("restart failed: {e}"), Severity::Error).await,
            }
            return;
        }

        match self.config.unhealthy_action {
            ContainerUnhealthyAction::Restart => match self.lifecycle.restart_task_runtime(runtime_id).await {
                Ok(_) => self.on_remediation(runtime_id, now, true, "restart requested (limit exhausted)", Severity::Warning).await,
                Err(e) => self.on_remediation(runtime_id, now, false, &format!("restart failed: {e}"), Severity::Error).await,
            },
            ContainerUnhealthyAction::Recreate => match self.lifecycle.recycle_task_runtime(runtime_id).await {
                Ok(_) => {
                    if let Some(t) = self.tracked.lock().get_mut(&runtime_id) {
                        t.restart_attempts = 0;
                    }
                    self.on_remediation(runtime_id, now, true, "recycled after exhausting restart limit", Severity::Warning).await;
                }
                Err(e) => self.on_remediation(runtime_id, now, false, &format!("recycle failed: {e}"), Severity::Error).await,
            },
            ContainerUnhealthyAction::Quarantine => {
                let _ = self.lifecycle.set_task_runtime_draining(runtime_id, true).await;
                if let Some(t) = self.tracked.lock().get_mut(&runtime_id) {
                    t.health.quarantine(now, "restart limit exhausted, quarantined");
                }
                self.notify(Severity::Error, "runtime quarantined", &runtime_id.to_string()).await;
            }
        }
    }

    async fn on_remediation(&self, runtime_id: TaskRuntimeId, now: u64, success: bool, detail: &str, severity: Severity) {
        {
            let mut guard = self.tracked.lock();
            if let Some(t) = guard.get_mut(&runtime_id) {
                if success {
                    t.restart_attempts += 1;
                    t.health.state = HealthState::Recovering;
                }
                t.health.record_remediation(now, detail);
            }
        }
        self.notify(severity, "task runtime remediation", &format!("{runtime_id}: {detail}")).await;
    }

    async fn notify(&self, severity: Severity, title: &str, message: &str) {
        if let Err(e) = self.publisher.notify_incident(severity, title, message).await {
            tracing::warn!(error = %e, "failed to publish incident notification");
        }
    }

    fn prune_stale(&self, runtimes: &[oj_core::TaskRuntime], now: u64) {
        let known: std::collections::HashSet<_> = runtimes.iter().map(|r| r.id).collect();
        let retention_ms = self.config.state_retention_secs * 1000;
        self.tracked.lock().retain(|id, t| known.contains(id) || now.saturating_sub(t.last_seen_ms) < retention_ms);
    }

    async fn update_readiness(&self, runtimes: &[oj_core::TaskRuntime], now: u64) {
        if runtimes.is_empty() {
            return;
        }
        let bad = {
            let guard = self.tracked.lock();
            runtimes
                .iter()
                .filter(|r| {
                    guard.get(&r.id).map(|t| matches!(t.health.state, HealthState::Unhealthy | HealthState::Offline | HealthState::Quarantined)).unwrap_or(false)
                })
                .count()
        };
        let ratio = bad as f64 / runtimes.len() as f64;

        if ratio >= self.config.readiness_degrade_ratio {
            let mut since = self.readiness_bad_since_ms.lock();
            let started_at = *since.get_or_insert(now);
            if now.saturating_sub(started_at) >= self.config.readiness_degrade_seconds * 1000 {
                let mut blocked = self.readiness_blocked.lock();
                if !*blocked {
                    *blocked = true;
                    drop(blocked);
                    drop(since);
                    self.notify(Severity::Error, "readiness blocked", "too many task runtimes are unhealthy").await;
                }
            }
        } else {
            *self.readiness_bad_since_ms.lock() = None;
            *self.readiness_blocked.lock() = false;
        }
    }

    /// Run the probe cycle on `probe_interval_secs` until `shutdown` fires.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.probe_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "health probe cycle failed");
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
