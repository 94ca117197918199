// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ojd: the orchestration daemon. Loads configuration, builds the store and
//! adapter bundle, runs startup recovery exactly once, then spawns the
//! control socket alongside every background component until a signal asks
//! it to stop.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use oj_adapters::AdapterBundle;
use oj_daemon::server::ServerContext;
use oj_daemon::{build_store, env, logging, run_control_server, DaemonLock, Supervisor};
use oj_engine::config::DaemonConfig;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ojd", version = env::PROTOCOL_VERSION, about = "Odd Jobs orchestration daemon")]
struct Args {
    /// Path to the daemon's TOML config file. Defaults to the platform config dir.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = DaemonConfig::load(args.config.as_deref())?;

    let _lock = match DaemonLock::acquire(&config.state_dir) {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = logging::init(&config.state_dir, &config.log_level)?;
    info!(state_dir = %config.state_dir.display(), socket_path = %config.socket_path.display(), "starting ojd");

    let daemon_id = format!("ojd-{}", std::process::id());
    let store = build_store().await;
    let adapters = AdapterBundle::docker();
    let mut supervisor = Supervisor::new(store, adapters, &config, &daemon_id);

    match supervisor.run_startup_recovery().await {
        Ok(summary) => info!(?summary, "startup recovery complete"),
        Err(e) => warn!(error = %e, "startup recovery encountered an error; continuing"),
    }

    supervisor.spawn_all(config.lifecycle.idle_scan_interval_secs);
    let supervisor = Arc::new(supervisor);

    let (server_shutdown_tx, server_shutdown_rx) = oneshot::channel();
    let server_ctx = ServerContext { supervisor: supervisor.clone(), start_time: Instant::now(), version: env::PROTOCOL_VERSION };
    let socket_path = config.socket_path.clone();
    let server_handle = tokio::spawn(async move { run_control_server(&socket_path, server_ctx, server_shutdown_rx).await });

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("ojd ready");
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    let _ = server_shutdown_tx.send(());
    if let Err(e) = server_handle.await {
        error!(error = %e, "control server task panicked during shutdown");
    }

    match Arc::try_unwrap(supervisor) {
        Ok(supervisor) => supervisor.shutdown().await,
        Err(_) => warn!("supervisor still has outstanding references at shutdown; skipping graceful drain"),
    }

    info!("ojd stopped");
    Ok(())
}
