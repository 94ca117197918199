// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime Event Listener: the single point where everything a task
//! runtime reports — structured progress, raw logs, artifacts, and the
//! final result — turns into durable state.
//!
//! One hub connection is held per task runtime, not per run (a runtime's
//! event hub multiplexes every run it hosts), gated by the per-runtime
//! delivery checkpoint so a reconnect's backlog replay and the live stream
//! can never double-apply the same delivery. [`RuntimeEventListener::process_event`]
//! and [`RuntimeEventListener::replay_backlog`] are the tested surface; the
//! connection supervisor in [`RuntimeEventListener::run`] is a thin loop
//! over them, in the same spirit as [`crate::health::HealthSupervisor::run`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use oj_adapters::{AdapterBundle, HubConnectionState, HubEvent, Publisher, ReconnectBackoff, Severity};
use oj_core::{
    Artifact, ArtifactAssembly, Clock, CoreError, CoreResult, FailureClass, Run, RunArtifactTotals, RunId, RunLogEvent, RunState,
    RunStructuredEvent, SyntheticSequence, TaskRuntimeEventCheckpoint, TaskRuntimeId, TaskRuntimeState,
};
use oj_storage::Store;
use oj_wire::{JobEventMessage, ReadEventBacklog, ResultEnvelope};
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};

use crate::config::ListenerConfig;
use crate::dispatcher::Dispatcher;
use crate::projection;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactManifestFields {
    sha256: Option<String>,
    size_bytes: Option<u64>,
}

struct Watermark {
    last_published_ms: u64,
}

struct ConnectionHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    endpoint: String,
}

pub struct RuntimeEventListener<C: Clock> {
    store: Arc<dyn Store>,
    adapters: AdapterBundle,
    dispatcher: Arc<Dispatcher<C>>,
    publisher: Arc<dyn Publisher>,
    clock: C,
    config: ListenerConfig,
    assemblies: Mutex<HashMap<(RunId, String), ArtifactAssembly>>,
    chunk_counters: Mutex<HashMap<(RunId, String), u64>>,
    run_totals: Mutex<RunArtifactTotals>,
    sequences: Mutex<HashMap<RunId, SyntheticSequence>>,
    watermarks: Mutex<HashMap<(RunId, &'static str), Watermark>>,
    connections: Mutex<HashMap<TaskRuntimeId, ConnectionHandle>>,
}

impl<C: Clock> RuntimeEventListener<C> {
    pub fn new(
        store: Arc<dyn Store>,
        adapters: AdapterBundle,
        dispatcher: Arc<Dispatcher<C>>,
        publisher: Arc<dyn Publisher>,
        clock: C,
        config: ListenerConfig,
    ) -> Self {
        Self {
            store,
            adapters,
            dispatcher,
            publisher,
            clock,
            config,
            assemblies: Mutex::new(HashMap::new()),
            chunk_counters: Mutex::new(HashMap::new()),
            run_totals: Mutex::new(RunArtifactTotals::new()),
            sequences: Mutex::new(HashMap::new()),
            watermarks: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Process one delivered event from `runtime_id`'s stream, gated by
    /// its durable checkpoint. A delivery at or below the current
    /// watermark (replayed backlog, at-least-once redelivery) is dropped
    /// with no side effects.
    pub async fn process_event(&self, runtime_id: TaskRuntimeId, event: JobEventMessage) -> CoreResult<()> {
        let checkpoint = self.store.get_checkpoint(runtime_id).await?;
        if checkpoint.already_seen(event.delivery_id) {
            return Ok(());
        }

        match event.event_type.as_str() {
            "artifact_manifest" => self.handle_artifact_manifest(&event).await?,
            "artifact_chunk" => self.handle_artifact_chunk(&event).await?,
            "artifact_commit" => self.handle_artifact_commit(&event).await?,
            "completed" => self.handle_completed(&event).await?,
            "log" => self.handle_log(&event).await?,
            _ => self.handle_structured(&event).await?,
        }

        self.advance_checkpoint(runtime_id, checkpoint, event.delivery_id).await
    }

    async fn advance_checkpoint(&self, runtime_id: TaskRuntimeId, mut checkpoint: TaskRuntimeEventCheckpoint, delivery_id: u64) -> CoreResult<()> {
        if checkpoint.advance(delivery_id) {
            self.store.save_checkpoint(checkpoint).await?;
        }
        Ok(())
    }

    /// Replay every backlogged event after `runtime_id`'s current
    /// checkpoint, paging at [`ListenerConfig::backlog_page_size`] until
    /// the runtime reports no more. Called once per connection, before
    /// the live subscription takes over.
    pub async fn replay_backlog(&self, runtime_id: TaskRuntimeId, endpoint: &str) -> CoreResult<u64> {
        let client = self.adapters.runtime_clients.client_for(&runtime_id, endpoint);
        let mut after = self.store.get_checkpoint(runtime_id).await?.last_delivery_id;
        let mut replayed = 0u64;
        loop {
            let page = client
                .read_event_backlog(ReadEventBacklog { after_delivery_id: after, max_events: self.config.backlog_page_size })
                .await
                .map_err(CoreError::from)?;
            if !page.success {
                return Err(CoreError::TransientNetwork(page.error_message.unwrap_or_else(|| "backlog replay failed".into())));
            }
            let count = page.events.len() as u64;
            for event in page.events {
                after = after.max(event.delivery_id);
                self.process_event(runtime_id, event).await?;
            }
            replayed += count;
            if !page.has_more {
                break;
            }
        }
        Ok(replayed)
    }

    fn resolve_sequence(&self, run_id: RunId, event: &JobEventMessage) -> u64 {
        if let Some(sequence) = event.sequence {
            return sequence;
        }
        let mut guard = self.sequences.lock();
        guard.entry(run_id).or_insert_with(SyntheticSequence::new).next(event.timestamp_ms)
    }

    async fn handle_structured(&self, event: &JobEventMessage) -> CoreResult<()> {
        let sequence = self.resolve_sequence(event.run_id, event);
        let schema_version: u32 = event.schema_version.parse().unwrap_or(1);
        let structured = RunStructuredEvent {
            run_id: event.run_id,
            sequence,
            event_type: event.event_type.clone(),
            category: event.category.clone(),
            summary: event.summary.clone(),
            error: event.error.clone(),
            payload_json: event.payload_json.clone().unwrap_or_default(),
            schema_version,
            timestamp_ms: event.timestamp_ms,
        };

        let appended = self.store.append_structured_event(structured.clone()).await?;
        if !appended {
            return Ok(());
        }
        projection::apply(self.store.as_ref(), &structured).await?;

        let category = projection::canonicalize_category(&event.category);
        let (kind, throttle_ms) = if category == projection::CATEGORY_DIFF_UPDATED {
            ("diff", self.config.diff_throttle_ms)
        } else if category.starts_with("tool") {
            ("tool", self.config.tool_throttle_ms)
        } else {
            return Ok(());
        };

        if self.should_publish(event.run_id, kind, throttle_ms) {
            let summary = event.summary.clone().unwrap_or_else(|| category.clone());
            if let Err(e) = self.publisher.publish_run_delta(&event.run_id.to_string(), kind, &summary).await {
                tracing::debug!(error = %e, "failed to publish throttled run delta");
            }
        }
        Ok(())
    }

    fn should_publish(&self, run_id: RunId, kind: &'static str, throttle_ms: u64) -> bool {
        let now = self.clock.epoch_ms();
        let mut guard = self.watermarks.lock();
        let publish = match guard.get(&(run_id, kind)) {
            Some(w) => now.saturating_sub(w.last_published_ms) >= throttle_ms,
            None => true,
        };
        if publish {
            guard.insert((run_id, kind), Watermark { last_published_ms: now });
        }
        if guard.len() > self.config.watermark_prune_threshold {
            let max_age_ms = self.config.watermark_max_age_secs * 1000;
            guard.retain(|_, w| now.saturating_sub(w.last_published_ms) < max_age_ms);
        }
        publish
    }

    async fn handle_log(&self, event: &JobEventMessage) -> CoreResult<()> {
        let level = event.metadata.as_ref().and_then(|m| m.get("level")).cloned().unwrap_or_else(|| "info".to_string());
        self.store
            .append_log_event(RunLogEvent {
                run_id: event.run_id,
                delivery_id: event.delivery_id,
                level,
                message: event.summary.clone().unwrap_or_default(),
                timestamp_ms: event.timestamp_ms,
            })
            .await
    }

    fn artifact_policy_caps(&self, task: &oj_core::Task) -> (u64, u64) {
        (task.artifact_policy.max_artifact_bytes, task.artifact_policy.max_total_bytes_per_run)
    }

    async fn handle_artifact_manifest(&self, event: &JobEventMessage) -> CoreResult<()> {
        let artifact_id = event.artifact_id.clone().ok_or_else(|| CoreError::ValidationFailure("artifact_manifest missing artifact_id".into()))?;
        let fields: ArtifactManifestFields =
            event.payload_json.as_deref().and_then(|j| serde_json::from_str(j).ok()).unwrap_or_default();

        let mut assembly = ArtifactAssembly::new();
        assembly.expected_sha256 = fields.sha256;
        assembly.expected_size_bytes = fields.size_bytes;
        self.assemblies.lock().insert((event.run_id, artifact_id.clone()), assembly);
        self.chunk_counters.lock().insert((event.run_id, artifact_id), 0);
        Ok(())
    }

    async fn handle_artifact_chunk(&self, event: &JobEventMessage) -> CoreResult<()> {
        let artifact_id = event.artifact_id.clone().ok_or_else(|| CoreError::ValidationFailure("artifact_chunk missing artifact_id".into()))?;
        let run = self.get_run(event.run_id).await?;
        let task = self.get_task_for_run(&run).await?;
        let (max_artifact_bytes, max_total_bytes_per_run) = self.artifact_policy_caps(&task);

        let data = event.binary_payload.clone().unwrap_or_default();
        let key = (event.run_id, artifact_id);

        let index = {
            let mut counters = self.chunk_counters.lock();
            let counter = counters.entry(key.clone()).or_insert(0);
            let index = *counter;
            *counter += 1;
            index
        };

        {
            let mut guard = self.assemblies.lock();
            let assembly = guard.entry(key).or_default();
            assembly.push_chunk(index, data.clone(), max_artifact_bytes)?;
        }
        self.run_totals.lock().try_add(event.run_id, data.len() as u64, max_total_bytes_per_run)?;
        Ok(())
    }

    async fn handle_artifact_commit(&self, event: &JobEventMessage) -> CoreResult<()> {
        let artifact_id = event.artifact_id.clone().ok_or_else(|| CoreError::ValidationFailure("artifact_commit missing artifact_id".into()))?;
        let key = (event.run_id, artifact_id.clone());

        let chunk_count = *self.chunk_counters.lock().get(&key).unwrap_or(&0);
        let assembly = self.assemblies.lock().remove(&key);
        self.chunk_counters.lock().remove(&key);

        let Some(assembly) = assembly else {
            return Err(CoreError::ValidationFailure(format!("artifact_commit for {artifact_id} with no prior manifest")));
        };
        let bytes = assembly
            .assemble(chunk_count)
            .ok_or_else(|| CoreError::ValidationFailure(format!("artifact {artifact_id} missing chunks at commit")))?;

        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        if let Some(expected) = &assembly.expected_sha256 {
            if expected != &sha256 {
                return Err(CoreError::ValidationFailure(format!("artifact {artifact_id} hash mismatch")));
            }
        }

        self.store.save_artifact(Artifact { run_id: event.run_id, file_name: artifact_id, sha256, size_bytes: bytes.len() as u64 }).await
    }

    async fn get_run(&self, run_id: RunId) -> CoreResult<Run> {
        self.store.get_run(run_id).await?.ok_or_else(|| CoreError::NotFound(run_id.to_string()))
    }

    async fn get_task_for_run(&self, run: &Run) -> CoreResult<oj_core::Task> {
        self.store.get_task(run.task_id).await?.ok_or_else(|| CoreError::NotFound(run.task_id.to_string()))
    }

    /// A run's terminal event: parse its result envelope, classify any
    /// failure, transition the run, clear its in-flight artifact state,
    /// fan out a status delta, give the dispatcher a chance to pick up the
    /// task's next queued run, and schedule an automatic retry if the
    /// task's policy allows one.
    async fn handle_completed(&self, event: &JobEventMessage) -> CoreResult<()> {
        let now = self.clock.epoch_ms();
        let run = self.get_run(event.run_id).await?;

        let payload = event.metadata.as_ref().and_then(|m| m.get("payload")).cloned().or_else(|| event.payload_json.clone());
        let envelope: ResultEnvelope = match payload.as_deref().map(serde_json::from_str::<ResultEnvelope>) {
            Some(Ok(envelope)) => envelope,
            _ => ResultEnvelope {
                run_id: event.run_id,
                succeeded: false,
                summary: event.summary.clone(),
                output_json: None,
                error: event.error.clone().or_else(|| Some("missing or unparseable result envelope".to_string())),
                metadata: Default::default(),
            },
        };

        let failure_class = if envelope.succeeded { None } else { Some(envelope.classify_failure().unwrap_or(FailureClass::EnvelopeValidation)) };
        let state = if envelope.succeeded { RunState::Succeeded } else { RunState::Failed };

        let changed = self
            .store
            .mark_run_terminal(event.run_id, state, envelope.summary.clone(), envelope.output_json.clone(), failure_class, envelope.metadata.pr_url.clone(), now)
            .await?;
        if !changed {
            return Ok(());
        }

        if envelope.metadata.is_obsolete() {
            self.store.mark_run_obsolete(event.run_id).await?;
        }

        self.assemblies.lock().retain(|(run_id, _), _| *run_id != event.run_id);
        self.chunk_counters.lock().retain(|(run_id, _), _| *run_id != event.run_id);
        self.run_totals.lock().clear(event.run_id);

        self.store.touch_task_git_sync(run.task_id, now).await?;

        if let Err(e) = self.publisher.publish_run_delta(&event.run_id.to_string(), "status", &state.to_string()).await {
            tracing::debug!(error = %e, "failed to publish run completion delta");
        }

        self.dispatcher.dispatch_next_queued_for_task(run.task_id).await?;

        if !envelope.succeeded && !envelope.metadata.is_obsolete() {
            self.schedule_retry(&run).await?;
        }

        Ok(())
    }

    /// Fire-and-forget automatic retry: if the task's retry policy still
    /// allows another attempt, queue it after the policy's backoff delay
    /// and give the dispatcher a chance to pick it up. Never blocks the
    /// caller on the backoff sleep.
    async fn schedule_retry(&self, run: &Run) -> CoreResult<()> {
        let task = self.store.get_task(run.task_id).await?.ok_or_else(|| CoreError::NotFound(run.task_id.to_string()))?;
        let next_attempt = run.attempt + 1;
        if !task.retry_policy.allows_attempt(next_attempt) {
            return Ok(());
        }

        let delay = Duration::from_secs_f64(task.retry_policy.delay_secs(next_attempt));
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let clock = self.clock.clone();
        let next_run = run.next_attempt(clock.epoch_ms());

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = store.insert_run(next_run.clone()).await {
                tracing::warn!(error = %e, "retry scheduling: failed to insert next attempt");
                return;
            }
            if let Err(e) = dispatcher.dispatch_next_queued_for_task(next_run.task_id).await {
                tracing::warn!(error = %e, "retry scheduling: dispatch of next attempt failed");
            }
        });
        Ok(())
    }

    /// Open (or refresh) one hub connection per non-`Stopped` task
    /// runtime, tearing down and reopening a connection whose endpoint has
    /// changed underneath it (a restart remaps the published port).
    async fn reconcile_connections(self: &Arc<Self>) -> CoreResult<()> {
        let runtimes = self.store.list_task_runtimes().await?;
        let mut live = std::collections::HashSet::new();

        for runtime in runtimes.iter().filter(|r| r.state != TaskRuntimeState::Stopped) {
            live.insert(runtime.id);
            let needs_restart = {
                let guard = self.connections.lock();
                match guard.get(&runtime.id) {
                    Some(existing) => existing.endpoint != runtime.endpoint,
                    None => true,
                }
            };
            if needs_restart {
                self.open_connection(runtime.id, runtime.endpoint.clone());
            }
        }

        let mut guard = self.connections.lock();
        guard.retain(|id, handle| {
            let keep = live.contains(id);
            if !keep {
                if let Some(tx) = handle.shutdown_tx.take() {
                    let _ = tx.send(());
                }
            }
            keep
        });
        Ok(())
    }

    fn open_connection(self: &Arc<Self>, runtime_id: TaskRuntimeId, endpoint: String) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        if let Some(mut old) = self.connections.lock().insert(runtime_id, ConnectionHandle { shutdown_tx: Some(shutdown_tx), endpoint: endpoint.clone() }) {
            if let Some(tx) = old.shutdown_tx.take() {
                let _ = tx.send(());
            }
        }
        let this = self.clone();
        tokio::spawn(async move { this.run_connection(runtime_id, endpoint, shutdown_rx).await });
    }

    /// Probe, replay the backlog, then subscribe and process frames until
    /// the connection drops or `shutdown` fires, reconnecting with
    /// [`ReconnectBackoff`] in between.
    async fn run_connection(self: Arc<Self>, runtime_id: TaskRuntimeId, endpoint: String, mut shutdown: oneshot::Receiver<()>) {
        let mut backoff = ReconnectBackoff::default();
        let mut state = HubConnectionState::Disconnected;

        loop {
            if shutdown.try_recv().is_ok() {
                return;
            }

            state = HubConnectionState::Probing;
            if let Err(e) = self.replay_backlog(runtime_id, &endpoint).await {
                tracing::debug!(%runtime_id, error = %e, "backlog replay failed before subscribing");
                let (delay, should_log) = backoff.next_delay();
                if should_log {
                    tracing::warn!(%runtime_id, "repeated failure to connect to task runtime");
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => continue,
                    _ = &mut shutdown => return,
                }
            }
            state = HubConnectionState::BackfillReplay;

            let (event_tx, mut event_rx) = mpsc::channel(256);
            let (bridge_shutdown_tx, bridge_shutdown_rx) = oneshot::channel();
            let ws_endpoint = to_ws_endpoint(&endpoint);
            let bridge = tokio::spawn(oj_adapters::run_bridge(ws_endpoint, None, event_tx, bridge_shutdown_rx));
            state = HubConnectionState::Subscribed;
            backoff.reset();

            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        match event {
                            Some(HubEvent::Frame(oj_wire::HubFrame::JobEvent(job_event))) => {
                                if let Err(e) = self.process_event(runtime_id, job_event).await {
                                    tracing::warn!(%runtime_id, error = %e, "failed to process runtime event");
                                }
                            }
                            Some(HubEvent::Frame(oj_wire::HubFrame::StatusChanged(_))) => {}
                            Some(HubEvent::Disconnected) | None => break,
                        }
                    }
                    _ = &mut shutdown => {
                        let _ = bridge_shutdown_tx.send(());
                        let _ = bridge.await;
                        return;
                    }
                }
            }
            let _ = bridge.await;

            state = HubConnectionState::Disconnected;
            let (delay, should_log) = backoff.next_delay();
            if should_log {
                tracing::warn!(%runtime_id, "task runtime connection dropped repeatedly");
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => return,
            }
            let _ = state;
        }
    }

    /// Poll the runtime directory on [`ListenerConfig::directory_poll_interval_secs`]
    /// until `shutdown` fires, opening/tearing down connections as
    /// runtimes come and go.
    pub async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.directory_poll_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_connections().await {
                        tracing::warn!(error = %e, "listener directory poll failed");
                    }
                }
                _ = &mut shutdown => {
                    let mut guard = self.connections.lock();
                    for (_, mut handle) in guard.drain() {
                        if let Some(tx) = handle.shutdown_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                    break;
                }
            }
        }
    }
}

fn to_ws_endpoint(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint.to_string()
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
