// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification fan-out for the health supervisor and structured view
//! projection. The actual UI these reach is explicitly out of scope;
//! `Publisher` is the contract, and [`DesktopPublisher`] exists only so the
//! daemon binary is runnable without a UI attached.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("publish failed: {0}")]
    SendFailed(String),
}

/// Severity carried on an incident notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

/// Fan-out sink for incident notifications and throttled structured-view
/// deltas. One implementation per process; `oj-engine` holds it behind an
/// `Arc` shared by the health supervisor and the runtime event listener.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn notify_incident(&self, severity: Severity, title: &str, message: &str) -> Result<(), PublisherError>;

    /// A throttled diff or tool-timeline delta for a run, already gated by
    /// the caller's per-type watermark. Best-effort: publishing a
    /// view delta never fails a run.
    async fn publish_run_delta(&self, run_id: &str, kind: &str, summary: &str) -> Result<(), PublisherError>;
}

/// Desktop notification [`Publisher`] using `notify-rust`.
///
/// On macOS, `notify-rust` uses `mac-notification-sys` (Cocoa bindings) to
/// send notifications via the Notification Center. The first notification
/// triggers `ensure_application_set()` which runs an AppleScript to look up
/// a bundle identifier; in a daemon without Automation permissions that
/// blocks forever, so the bundle identifier is pre-set at construction time
/// to bypass the lookup entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopPublisher;

impl DesktopPublisher {
    pub fn new() -> Self {
        #[cfg(target_os = "macos")]
        {
            let _ = mac_notification_sys::set_application("com.apple.Terminal");
        }
        Self
    }
}

#[async_trait]
impl Publisher for DesktopPublisher {
    async fn notify_incident(&self, severity: Severity, title: &str, message: &str) -> Result<(), PublisherError> {
        let title = format!("[{}] {title}", severity_label(severity));
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            tracing::info!(%title, %message, "sending incident notification");
            match notify_rust::Notification::new().summary(&title).body(&message).show() {
                Ok(_) => tracing::info!(%title, "incident notification sent"),
                Err(e) => tracing::warn!(%title, error = %e, "incident notification failed"),
            }
        });
        Ok(())
    }

    async fn publish_run_delta(&self, run_id: &str, kind: &str, summary: &str) -> Result<(), PublisherError> {
        tracing::debug!(%run_id, %kind, %summary, "run delta published");
        Ok(())
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "success",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{Publisher, PublisherError, Severity};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct IncidentCall {
        pub severity: Severity,
        pub title: String,
        pub message: String,
    }

    #[derive(Debug, Clone)]
    pub struct RunDeltaCall {
        pub run_id: String,
        pub kind: String,
        pub summary: String,
    }

    #[derive(Default)]
    struct FakeState {
        incidents: Vec<IncidentCall>,
        run_deltas: Vec<RunDeltaCall>,
    }

    /// In-memory [`Publisher`] for engine tests: records every call instead
    /// of reaching the desktop notification surface.
    #[derive(Clone, Default)]
    pub struct FakePublisher {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakePublisher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn incidents(&self) -> Vec<IncidentCall> {
            self.inner.lock().incidents.clone()
        }

        pub fn run_deltas(&self) -> Vec<RunDeltaCall> {
            self.inner.lock().run_deltas.clone()
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn notify_incident(&self, severity: Severity, title: &str, message: &str) -> Result<(), PublisherError> {
            self.inner.lock().incidents.push(IncidentCall { severity, title: title.to_string(), message: message.to_string() });
            Ok(())
        }

        async fn publish_run_delta(&self, run_id: &str, kind: &str, summary: &str) -> Result<(), PublisherError> {
            self.inner
                .lock()
                .run_deltas
                .push(RunDeltaCall { run_id: run_id.to_string(), kind: kind.to_string(), summary: summary.to_string() });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePublisher, IncidentCall, RunDeltaCall};

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;
