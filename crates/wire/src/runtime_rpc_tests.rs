use super::*;
use oj_core::RunId;

#[test]
fn check_health_request_round_trips_without_a_body() {
    let req = RuntimeRpcRequest::CheckHealth;
    let json = serde_json::to_string(&req).unwrap();
    let back: RuntimeRpcRequest = serde_json::from_str(&json).unwrap();
    assert!(matches!(back, RuntimeRpcRequest::CheckHealth));
}

#[test]
fn start_command_request_tags_its_op_name() {
    let req = RuntimeRpcRequest::GetCommandStatus(GetCommandStatus { run_id: RunId::new() });
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json.get("op").and_then(|v| v.as_str()), Some("get_command_status"));
}
