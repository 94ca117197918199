// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured logging bootstrap: a human-readable console layer plus a
//! rolling daily file under the daemon's state directory, mirroring the
//! logging setup this codebase's other daemons use.

use std::path::Path;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global subscriber. The returned guard must be held for
/// the lifetime of the process — dropping it early stops the non-blocking
/// file writer from flushing.
pub fn init(state_dir: &Path, log_level: &str) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = state_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "ojd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
