use super::*;
use oj_core::TaskRuntimeId;

#[test]
fn tcp_factory_builds_a_client_per_endpoint() {
    let factory = TcpRuntimeClientFactory;
    let runtime_id = TaskRuntimeId::new();
    let client = factory.client_for(&runtime_id, "http://127.0.0.1:9000");
    // construction alone should not dial out
    drop(client);
}
