// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health supervisor state machine: per-runtime health classification,
//! remediation cooldown, and a bounded incident history.

use crate::ids::TaskRuntimeId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Health classification of a task runtime, as tracked by the supervisor
/// independently of the runtime's own dispatch-facing `TaskRuntimeState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    Recovering,
    Offline,
    Quarantined,
}

crate::simple_display! {
    HealthState {
        Healthy => "healthy",
        Degraded => "degraded",
        Unhealthy => "unhealthy",
        Recovering => "recovering",
        Offline => "offline",
        Quarantined => "quarantined",
    }
}

/// A single remediation-relevant observation: a missed probe, a crash
/// notification, a remediation attempt and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub runtime_id: TaskRuntimeId,
    pub occurred_at_ms: u64,
    pub detail: String,
}

/// Maximum incidents retained per runtime; older entries are evicted as new
/// ones arrive so a flapping runtime cannot grow this without bound.
pub const MAX_INCIDENTS: usize = 200;

/// Per-runtime health tracking: current state, consecutive probe failures,
/// last remediation attempt, and a capped incident ring buffer.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    pub runtime_id: TaskRuntimeId,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_remediation_at_ms: Option<u64>,
    incidents: VecDeque<Incident>,
}

impl RuntimeHealth {
    pub fn new(runtime_id: TaskRuntimeId) -> Self {
        Self {
            runtime_id,
            state: HealthState::Healthy,
            consecutive_failures: 0,
            last_remediation_at_ms: None,
            incidents: VecDeque::new(),
        }
    }

    pub fn incidents(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.iter()
    }

    fn record_incident(&mut self, occurred_at_ms: u64, detail: impl Into<String>) {
        if self.incidents.len() == MAX_INCIDENTS {
            self.incidents.pop_front();
        }
        self.incidents.push_back(Incident { runtime_id: self.runtime_id, occurred_at_ms, detail: detail.into() });
    }

    /// Record a failed health probe. Transitions `Healthy` -> `Degraded` on
    /// the first failure, `Degraded` -> `Unhealthy` on the third.
    pub fn record_probe_failure(&mut self, now_ms: u64, detail: impl Into<String>) {
        self.consecutive_failures += 1;
        self.record_incident(now_ms, detail);
        self.state = match self.state {
            HealthState::Healthy if self.consecutive_failures >= 1 => HealthState::Degraded,
            HealthState::Degraded if self.consecutive_failures >= 3 => HealthState::Unhealthy,
            other => other,
        };
    }

    pub fn record_probe_success(&mut self, now_ms: u64) {
        self.consecutive_failures = 0;
        match self.state {
            HealthState::Degraded | HealthState::Unhealthy | HealthState::Recovering => {
                self.state = HealthState::Healthy;
            }
            HealthState::Offline => {
                self.state = HealthState::Recovering;
                self.record_incident(now_ms, "runtime reachable again after being offline");
            }
            HealthState::Healthy | HealthState::Quarantined => {}
        }
    }

    /// True if a remediation action (restart, recycle) is allowed now,
    /// given `cooldown_ms` since the last attempt.
    pub fn remediation_allowed(&self, now_ms: u64, cooldown_ms: u64) -> bool {
        match self.last_remediation_at_ms {
            Some(last) => now_ms.saturating_sub(last) >= cooldown_ms,
            None => true,
        }
    }

    pub fn record_remediation(&mut self, now_ms: u64, detail: impl Into<String>) {
        self.last_remediation_at_ms = Some(now_ms);
        self.record_incident(now_ms, detail);
    }

    pub fn quarantine(&mut self, now_ms: u64, detail: impl Into<String>) {
        self.state = HealthState::Quarantined;
        self.record_incident(now_ms, detail);
    }

    pub fn mark_offline(&mut self, now_ms: u64, detail: impl Into<String>) {
        self.state = HealthState::Offline;
        self.record_incident(now_ms, detail);
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
