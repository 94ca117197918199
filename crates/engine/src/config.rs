// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: every tunable threshold the components below read,
//! loaded from an optional TOML file and overridden by a handful of
//! environment variables, the same way this codebase resolves its state
//! directory elsewhere.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve a state directory: set OJ_STATE_DIR or HOME")]
    NoStateDir,
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// Resolve the daemon's state directory: `OJ_STATE_DIR` > `XDG_STATE_HOME/oj`
/// > `~/.local/state/oj`.
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("OJ_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("oj"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/oj"))
}

/// Tunables for the Runtime Directory & Lifecycle Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// A runtime with `activeRuns==0` idle longer than this is stopped by
    /// `ScaleDownIdleTaskRuntimes`.
    pub idle_timeout_secs: u64,
    /// `ScaleDownIdleTaskRuntimes` ticks on this fixed cadence regardless of
    /// any other interval, re-reading current thresholds each tick.
    pub idle_scan_interval_secs: u64,
    /// Floor on how many ready/warm runtimes are kept even when idle.
    pub min_warm_runtimes: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { idle_timeout_secs: 30 * 60, idle_scan_interval_secs: 60, min_warm_runtimes: 0 }
    }
}

/// Tunables for the Run Dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of task runtimes the dispatcher will create for a
    /// single task before refusing further scale-out.
    pub max_runtimes_per_task: u32,
    /// Rolling window, in seconds, over which start attempts and failed
    /// starts are counted for the scale-out gate.
    pub scale_out_window_secs: u64,
    /// Failed starts within the window before the gate saturates and the
    /// dispatcher pauses scale-out for `scale_out_cooldown_secs`.
    pub scale_out_failure_threshold: u32,
    pub scale_out_cooldown_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_runtimes_per_task: 1, scale_out_window_secs: 60, scale_out_failure_threshold: 3, scale_out_cooldown_secs: 30 }
    }
}

/// Tunables for the Run Queue Drainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDrainerConfig {
    pub poll_interval_secs: u64,
}

impl Default for QueueDrainerConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 3 }
    }
}

/// Tunables for the Runtime Event Listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// How often the connection supervisor re-polls the runtime directory
    /// for connections to open/tear down.
    pub directory_poll_interval_secs: u64,
    /// Budget for one reachability probe before falling back to the proxy
    /// endpoint (or giving up this attempt).
    pub probe_budget_secs: u64,
    /// Page size used for `ReadEventBacklog` replay.
    pub backlog_page_size: u32,
    pub diff_throttle_ms: u64,
    pub tool_throttle_ms: u64,
    /// Watermark table entries beyond which stale (15 min+) entries are
    /// pruned.
    pub watermark_prune_threshold: usize,
    pub watermark_max_age_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            directory_poll_interval_secs: 5,
            probe_budget_secs: 2,
            backlog_page_size: 500,
            diff_throttle_ms: 250,
            tool_throttle_ms: 125,
            watermark_prune_threshold: 2000,
            watermark_max_age_secs: 15 * 60,
        }
    }
}

/// Action the Health Supervisor takes once the restart limit is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerUnhealthyAction {
    Restart,
    Recreate,
    Quarantine,
}

oj_core::simple_display! {
    ContainerUnhealthyAction {
        Restart => "restart",
        Recreate => "recreate",
        Quarantine => "quarantine",
    }
}

/// Tunables for the Health Supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_interval_secs: u64,
    pub heartbeat_stale_after_secs: u64,
    /// Consecutive probe failures before a `Degraded` runtime becomes
    /// `Unhealthy`.
    pub unhealthy_probe_failure_threshold: u32,
    pub remediation_cooldown_secs: u64,
    pub restart_limit: u32,
    pub unhealthy_action: ContainerUnhealthyAction,
    /// Fraction of (unhealthy + offline + quarantined) / total that trips
    /// `ReadinessBlocked`.
    pub readiness_degrade_ratio: f64,
    pub readiness_degrade_seconds: u64,
    pub state_retention_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 10,
            heartbeat_stale_after_secs: 60,
            unhealthy_probe_failure_threshold: 3,
            remediation_cooldown_secs: 5 * 60,
            restart_limit: 3,
            unhealthy_action: ContainerUnhealthyAction::Recreate,
            readiness_degrade_ratio: 0.5,
            readiness_degrade_seconds: 60,
            state_retention_secs: 30 * 60,
        }
    }
}

/// Tunables for the Recovery Service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub run_periodically: bool,
    pub interval_secs: u64,
    pub stale_run_threshold_minutes: u64,
    pub zombie_run_threshold_minutes: u64,
    pub max_run_age_hours: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            run_periodically: true,
            interval_secs: 10 * 60,
            stale_run_threshold_minutes: 15,
            zombie_run_threshold_minutes: 120,
            max_run_age_hours: 24,
        }
    }
}

/// Tunables for Retention Cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub cleanup_interval_secs: u64,
    /// Structured sub-rows older than this are pruned each cycle.
    pub structured_retention_secs: u64,
    pub structured_prune_batch_size: u32,
    /// Minimum task age before it becomes cleanup-eligible.
    pub task_min_age_secs: u64,
    /// Tasks younger than this many days are never deleted, regardless of
    /// other eligibility.
    pub cleanup_protected_days: u64,
    pub exclude_open_findings: bool,
    pub max_tasks_deleted_per_tick: u32,
    pub deletion_batch_size: u32,
    pub db_soft_limit_bytes: u64,
    pub db_target_bytes: u64,
    pub vacuum_min_deleted_rows: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 10 * 60,
            structured_retention_secs: 30 * 24 * 60 * 60,
            structured_prune_batch_size: 500,
            task_min_age_secs: 90 * 24 * 60 * 60,
            cleanup_protected_days: 7,
            exclude_open_findings: false,
            max_tasks_deleted_per_tick: 100,
            deletion_batch_size: 25,
            db_soft_limit_bytes: 10 * 1024 * 1024 * 1024,
            db_target_bytes: 8 * 1024 * 1024 * 1024,
            vacuum_min_deleted_rows: 50,
        }
    }
}

impl RetentionConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs * 2)
    }
}

/// Root daemon configuration: every component's tunable thresholds, plus the
/// handful of operator-facing settings (state directory, socket path, log
/// level) that environment variables may override without editing the TOML
/// file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub log_level: String,
    pub lifecycle: LifecycleConfig,
    pub dispatcher: DispatcherConfig,
    pub queue_drainer: QueueDrainerConfig,
    pub listener: ListenerConfig,
    pub health: HealthConfig,
    pub recovery: RecoveryConfig,
    pub retention: RetentionConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let state_dir = state_dir().unwrap_or_else(|_| PathBuf::from("/tmp/oj"));
        let socket_path = state_dir.join("ojd.sock");
        Self {
            state_dir,
            socket_path,
            log_level: "info".to_string(),
            lifecycle: LifecycleConfig::default(),
            dispatcher: DispatcherConfig::default(),
            queue_drainer: QueueDrainerConfig::default(),
            listener: ListenerConfig::default(),
            health: HealthConfig::default(),
            recovery: RecoveryConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `path` if it exists (merged onto defaults), then apply the
    /// environment-variable overrides operators need without editing a
    /// file: `OJ_STATE_DIR`, `OJ_SOCKET_PATH`, `OJ_LOG_LEVEL`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?
            }
            _ => DaemonConfig::default(),
        };
        if let Ok(dir) = std::env::var("OJ_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(sock) = std::env::var("OJ_SOCKET_PATH") {
            config.socket_path = PathBuf::from(sock);
        } else if config.socket_path.as_os_str().is_empty() {
            config.socket_path = config.state_dir.join("ojd.sock");
        }
        if let Ok(level) = std::env::var("OJ_LOG_LEVEL") {
            config.log_level = level;
        }
        Ok(config)
    }

    /// Default config file path: `<state_dir>/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(state_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
