use super::*;
use crate::ids::TaskRuntimeId;

#[test]
fn starts_healthy_with_no_incidents() {
    let health = RuntimeHealth::new(TaskRuntimeId::new());
    assert_eq!(health.state, HealthState::Healthy);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.incidents().count(), 0);
}

#[test]
fn first_failure_degrades_then_third_marks_unhealthy() {
    let mut health = RuntimeHealth::new(TaskRuntimeId::new());
    health.record_probe_failure(1_000, "probe timed out");
    assert_eq!(health.state, HealthState::Degraded);
    health.record_probe_failure(2_000, "probe timed out");
    assert_eq!(health.state, HealthState::Degraded);
    health.record_probe_failure(3_000, "probe timed out");
    assert_eq!(health.state, HealthState::Unhealthy);
    assert_eq!(health.incidents().count(), 3);
}

#[test]
fn success_resets_failures_and_recovers_from_degraded() {
    let mut health = RuntimeHealth::new(TaskRuntimeId::new());
    health.record_probe_failure(1_000, "x");
    health.record_probe_failure(2_000, "x");
    health.record_probe_success(3_000);
    assert_eq!(health.state, HealthState::Healthy);
    assert_eq!(health.consecutive_failures, 0);
}

#[test]
fn offline_recovery_passes_through_recovering() {
    let mut health = RuntimeHealth::new(TaskRuntimeId::new());
    health.mark_offline(1_000, "heartbeat missed");
    assert_eq!(health.state, HealthState::Offline);
    health.record_probe_success(2_000);
    assert_eq!(health.state, HealthState::Recovering);
}

#[test]
fn quarantine_is_sticky_against_probe_success() {
    let mut health = RuntimeHealth::new(TaskRuntimeId::new());
    health.quarantine(1_000, "remediation exhausted");
    assert_eq!(health.state, HealthState::Quarantined);
    health.record_probe_success(2_000);
    assert_eq!(health.state, HealthState::Quarantined);
}

#[test]
fn incident_buffer_is_fifo_and_capped() {
    let mut health = RuntimeHealth::new(TaskRuntimeId::new());
    for i in 0..(MAX_INCIDENTS + 10) {
        health.record_probe_failure(i as u64, format!("failure {i}"));
        health.record_probe_success(i as u64);
    }
    assert!(health.incidents().count() <= MAX_INCIDENTS);
    let first = health.incidents().next().unwrap();
    assert!(!first.detail.contains("failure 0"));
}

#[test]
fn remediation_respects_cooldown() {
    let mut health = RuntimeHealth::new(TaskRuntimeId::new());
    assert!(health.remediation_allowed(0, 60_000));
    health.record_remediation(1_000, "restart requested");
    assert!(!health.remediation_allowed(30_000, 60_000));
    assert!(health.remediation_allowed(61_001, 60_000));
}
