use super::*;

#[test]
fn defaults_match_spec_values() {
    let config = DaemonConfig::default();
    assert_eq!(config.health.heartbeat_stale_after_secs, 60);
    assert_eq!(config.health.probe_interval_secs, 10);
    assert_eq!(config.listener.backlog_page_size, 500);
    assert_eq!(config.listener.diff_throttle_ms, 250);
    assert_eq!(config.listener.tool_throttle_ms, 125);
    assert_eq!(config.retention.cleanup_interval_secs, 600);
    assert_eq!(config.retention.lease_ttl(), Duration::from_secs(1200));
}

#[test]
fn load_without_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist.toml");
    let config = DaemonConfig::load(Some(&missing)).unwrap();
    assert_eq!(config.health.restart_limit, DaemonConfig::default().health.restart_limit);
}

#[test]
fn load_merges_partial_toml_onto_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "log_level = \"debug\"\n\n[health]\nrestart_limit = 7\n").unwrap();
    let config = DaemonConfig::load(Some(&path)).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.health.restart_limit, 7);
    // untouched sections keep their defaults
    assert_eq!(config.health.probe_interval_secs, 10);
    assert_eq!(config.retention.cleanup_interval_secs, 600);
}

#[test]
fn env_override_wins_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "log_level = \"debug\"\n").unwrap();
    std::env::set_var("OJ_LOG_LEVEL", "trace");
    let config = DaemonConfig::load(Some(&path)).unwrap();
    std::env::remove_var("OJ_LOG_LEVEL");
    assert_eq!(config.log_level, "trace");
}
