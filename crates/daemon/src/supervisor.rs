// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the background components in `oj-engine` to a concrete [`Store`]
//! and [`AdapterBundle`], then supervises them as a set of tasks that all
//! stop together on shutdown.

use std::sync::Arc;

use oj_adapters::{AdapterBundle, DesktopPublisher, Publisher};
use oj_core::SystemClock;
use oj_engine::config::DaemonConfig;
use oj_engine::{Dispatcher, HealthSupervisor, LifecycleManager, QueueDrainer, RecoveryService, RetentionCleanup, RuntimeEventListener};
use oj_storage::{InMemoryStore, Store};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Picks the store implementation: `DATABASE_URL` selects
/// [`oj_storage::PostgresStore`] when the crate is built with the
/// `postgres` feature; otherwise (and always without that feature) falls
/// back to the in-memory store, which is also what every test in this
/// workspace runs against.
pub async fn build_store() -> Arc<dyn Store> {
    #[cfg(feature = "postgres")]
    if let Ok(url) = std::env::var("DATABASE_URL") {
        match oj_storage::PostgresStore::connect(&url).await {
            Ok(store) => return Arc::new(store),
            Err(e) => {
                tracing::error!(error = %e, "failed to connect to postgres, falling back to in-memory store");
            }
        }
    }
    Arc::new(InMemoryStore::new())
}

/// Every background component the daemon runs, plus the join handles and
/// shutdown senders needed to stop them together.
pub struct Supervisor {
    pub store: Arc<dyn Store>,
    pub adapters: AdapterBundle,
    pub lifecycle: Arc<LifecycleManager<SystemClock>>,
    pub dispatcher: Arc<Dispatcher<SystemClock>>,
    pub drainer: Arc<QueueDrainer<SystemClock>>,
    pub health: Arc<HealthSupervisor<SystemClock>>,
    pub listener: Arc<RuntimeEventListener<SystemClock>>,
    pub recovery: Arc<RecoveryService<SystemClock>>,
    pub retention: Arc<RetentionCleanup<SystemClock>>,
    shutdown_txs: Vec<oneshot::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
    idle_scan_handle: Option<JoinHandle<()>>,
    idle_scan_stop: Option<oneshot::Sender<()>>,
}

impl Supervisor {
    pub fn new(store: Arc<dyn Store>, adapters: AdapterBundle, config: &DaemonConfig, daemon_id: &str) -> Self {
        let clock = SystemClock;
        let publisher: Arc<dyn Publisher> = Arc::new(DesktopPublisher::new());

        let lifecycle = Arc::new(LifecycleManager::new(store.clone(), adapters.clone(), clock, config.lifecycle.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), adapters.clone(), lifecycle.clone(), clock, config.dispatcher.clone()));
        let drainer = Arc::new(QueueDrainer::new(store.clone(), dispatcher.clone(), config.queue_drainer.clone()));
        let health = Arc::new(HealthSupervisor::new(store.clone(), adapters.clone(), lifecycle.clone(), publisher.clone(), clock, config.health.clone()));
        let listener = Arc::new(RuntimeEventListener::new(store.clone(), adapters.clone(), dispatcher.clone(), publisher.clone(), clock, config.listener.clone()));
        let recovery = Arc::new(RecoveryService::new(store.clone(), adapters.clone(), publisher.clone(), clock, config.recovery.clone()));
        let retention = Arc::new(RetentionCleanup::new(store.clone(), clock, config.retention.clone(), daemon_id.to_string()));

        Self {
            store,
            adapters,
            lifecycle,
            dispatcher,
            drainer,
            health,
            listener,
            recovery,
            retention,
            shutdown_txs: Vec::new(),
            handles: Vec::new(),
            idle_scan_handle: None,
            idle_scan_stop: None,
        }
    }

    /// Runs [`RecoveryService::run_startup_recovery`] exactly once, before
    /// any of the periodic loops or the event listener's connections are
    /// spawned: every `Running` run on disk at this point is orphaned by
    /// definition, and that assumption would be wrong once the listener
    /// starts reconnecting runtimes.
    pub async fn run_startup_recovery(&self) -> oj_core::CoreResult<oj_engine::recovery::RecoverySummary> {
        self.recovery.run_startup_recovery().await
    }

    /// Spawns every periodic/long-running component as its own supervised
    /// task. Call [`Self::shutdown`] to stop them all.
    pub fn spawn_all(&mut self, idle_scan_interval_secs: u64) {
        macro_rules! spawn_with_shutdown {
            ($component:expr) => {{
                let (tx, rx) = oneshot::channel();
                let component = $component;
                let handle = tokio::spawn(async move { component.run(rx).await });
                self.shutdown_txs.push(tx);
                self.handles.push(handle);
            }};
        }

        spawn_with_shutdown!(self.drainer.clone());
        spawn_with_shutdown!(self.health.clone());
        spawn_with_shutdown!(self.listener.clone());
        spawn_with_shutdown!(self.recovery.clone());
        spawn_with_shutdown!(self.retention.clone());

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let lifecycle = self.lifecycle.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(idle_scan_interval_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = lifecycle.scale_down_idle_task_runtimes().await {
                            tracing::warn!(error = %e, "idle task runtime scan failed");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });
        self.idle_scan_stop = Some(stop_tx);
        self.idle_scan_handle = Some(handle);
    }

    /// Signals every component to stop and waits for them to drain.
    pub async fn shutdown(mut self) {
        for tx in self.shutdown_txs.drain(..) {
            let _ = tx.send(());
        }
        if let Some(tx) = self.idle_scan_stop.take() {
            let _ = tx.send(());
        }
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        if let Some(handle) = self.idle_scan_handle.take() {
            let _ = handle.await;
        }
    }
}
