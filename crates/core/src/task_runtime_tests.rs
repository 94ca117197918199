use super::*;

fn sample(state: TaskRuntimeState, active: u32, max: u32) -> TaskRuntime {
    TaskRuntime {
        id: TaskRuntimeId::new(),
        task_id: TaskId::new(),
        state,
        active_runs: active,
        max_parallel_runs: max,
        endpoint: "10.0.0.1:7000".into(),
        container_id: None,
        workspace_path: None,
        runtime_home_path: None,
        last_activity_utc_ms: 1_000,
        inactive_after_utc_ms: None,
        last_error: None,
        cold_start_count: 0,
        failed_start_count: 0,
        created_at_ms: 1_000,
    }
}

#[test]
fn has_capacity_requires_dispatch_eligible_state_and_headroom() {
    assert!(sample(TaskRuntimeState::Ready, 0, 2).has_capacity());
    assert!(!sample(TaskRuntimeState::Ready, 2, 2).has_capacity());
    assert!(!sample(TaskRuntimeState::Draining, 0, 2).has_capacity());
    assert!(!sample(TaskRuntimeState::Quarantined, 0, 2).has_capacity());
}

#[test]
fn record_activity_clears_inactive_marker() {
    let mut runtime = sample(TaskRuntimeState::Ready, 0, 1);
    runtime.inactive_after_utc_ms = Some(5_000);
    runtime.record_activity(9_000);
    assert_eq!(runtime.last_activity_utc_ms, 9_000);
    assert!(runtime.inactive_after_utc_ms.is_none());
}

#[test]
fn runtime_id_matches_id_as_str() {
    let runtime = sample(TaskRuntimeState::Busy, 1, 1);
    assert_eq!(runtime.runtime_id(), runtime.id.as_str());
}
