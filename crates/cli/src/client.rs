// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin client for the daemon's control socket: connect, send one framed
//! request, read one framed response. No retry or auto-start logic — if the
//! daemon isn't listening, the caller is told to start it themselves.

use std::path::PathBuf;
use std::time::Duration;

use oj_wire::{ControlRequest, ControlResponse, FramingError};
use thiserror::Error;
use tokio::net::UnixStream;
use tokio::time::timeout;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Timeout for a single request/response round trip over the control socket.
pub fn ipc_timeout() -> Duration {
    parse_duration_ms("OJ_IPC_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("ojd is not running (no daemon listening on {0})")]
    DaemonNotRunning(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Framing(#[from] FramingError),
    #[error("daemon reported an error: {0}")]
    Rejected(String),
    #[error("unexpected response from daemon")]
    UnexpectedResponse,
}

/// Connects to the control socket for one request. Each call opens and
/// closes a fresh connection, matching the protocol's one-request-per-frame
/// contract.
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn connect(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub async fn send(&self, request: &ControlRequest) -> Result<ControlResponse, ClientError> {
        let connect = UnixStream::connect(&self.socket_path);
        let mut stream = timeout(ipc_timeout(), connect)
            .await
            .map_err(|_| ClientError::Timeout(ipc_timeout()))?
            .map_err(|_| ClientError::DaemonNotRunning(self.socket_path.display().to_string()))?;

        timeout(ipc_timeout(), oj_wire::write_message(&mut stream, request)).await.map_err(|_| ClientError::Timeout(ipc_timeout()))??;

        let response: ControlResponse = timeout(ipc_timeout(), oj_wire::read_message(&mut stream)).await.map_err(|_| ClientError::Timeout(ipc_timeout()))??;

        if let ControlResponse::Error { message } = &response {
            return Err(ClientError::Rejected(message.clone()));
        }
        Ok(response)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
