// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket bridge to a task runtime's event hub — subscribes to the
//! runtime's job-event/status stream and forwards parsed frames to the
//! listener's channel.
//!
//! Shaped after the source's coop event bridge: a background task owns the
//! socket, a `tokio::select!` loop races incoming frames against a shutdown
//! signal, and any disconnect is reported through the channel rather than
//! panicking the task. The connection-lifecycle state machine and
//! reconnect backoff live here rather than in `oj-engine` because they are
//! properties of the transport, not the domain.

use futures_util::StreamExt;
use oj_wire::HubFrame;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// Connection lifecycle for one runtime's hub subscription. The
/// health supervisor reads this to decide whether a runtime counts as
/// reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubConnectionState {
    Disconnected,
    Probing,
    BackfillReplay,
    Subscribed,
}

/// A frame delivered off the hub, or a signal that the connection dropped
/// and the caller should decide whether to reconnect.
#[derive(Debug)]
pub enum HubEvent {
    Frame(HubFrame),
    Disconnected,
}

/// Dial `endpoint`, falling back to `proxy_endpoint` if the primary refuses
/// the connection, and stream frames to `event_tx` until `shutdown_rx`
/// fires or the socket closes. Does not itself retry after a disconnect —
/// the caller (the per-runtime connection supervisor in `oj-engine`) owns
/// the reconnect loop and its backoff, since only it knows the runtime's
/// checkpoint to resume from on the next attempt.
pub async fn run_bridge(
    endpoint: String,
    proxy_endpoint: Option<String>,
    event_tx: mpsc::Sender<HubEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let probe_budget = Duration::from_secs(2);
    let stream = match tokio::time::timeout(probe_budget, connect(&endpoint)).await {
        Ok(Some(s)) => Some(s),
        _ => match proxy_endpoint {
            Some(proxy) => tokio::time::timeout(probe_budget, connect(&proxy)).await.ok().flatten(),
            None => None,
        },
    };

    let Some(stream) = stream else {
        let _ = event_tx.send(HubEvent::Disconnected).await;
        return;
    };

    let (_, mut read) = stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<HubFrame>(&text) {
                            Ok(frame) => {
                                if event_tx.send(HubEvent::Frame(frame)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(%e, "hub bridge: unparseable frame, dropping");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        let _ = event_tx.send(HubEvent::Disconnected).await;
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut shutdown_rx => {
                break;
            }
        }
    }
}

async fn connect(endpoint: &str) -> Option<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>> {
    match tokio_tungstenite::connect_async(endpoint).await {
        Ok((stream, _response)) => Some(stream),
        Err(e) => {
            tracing::debug!(%endpoint, %e, "hub bridge: connect failed");
            None
        }
    }
}

/// Exponential backoff for the per-runtime connection supervisor: doubles
/// from `1s` up to a `30s` cap.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    floor: Duration,
    cap: Duration,
    attempt: u32,
    consecutive_failures: u64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self { floor: Duration::from_secs(1), cap: Duration::from_secs(30), attempt: 0, consecutive_failures: 0 }
    }
}

impl ReconnectBackoff {
    /// Delay for the next reconnect attempt, also returning whether this
    /// failure is the 3rd consecutive one (the supervisor logs only then,
    /// to avoid flooding logs during an extended outage).
    pub fn next_delay(&mut self) -> (Duration, bool) {
        self.consecutive_failures += 1;
        let should_log = self.consecutive_failures % 3 == 0;
        let multiplier = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let scaled = self.floor.saturating_mul(multiplier);
        let delay = scaled.min(self.cap);
        if scaled < self.cap {
            self.attempt += 1;
        }
        (delay, should_log)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.consecutive_failures = 0;
    }
}

#[cfg(test)]
#[path = "hub_client_tests.rs"]
mod tests;
