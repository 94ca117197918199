// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unary RPC client for a task runtime's command service.
//!
//! The runtime is an opaque peer; this client only needs to know the wire
//! shape ([`oj_wire::runtime_rpc`]) and the framing convention
//! ([`oj_wire::framing`]) already used for the control socket, reused here
//! over a plain TCP connection to the runtime's endpoint.

use async_trait::async_trait;
use oj_wire::runtime_rpc::{RuntimeRpcRequest, RuntimeRpcResponse};
use oj_wire::{
    CancelCommand, CheckHealthResult, EnsureRepositoryWorkspace, GetCommandStatus,
    ReadEventBacklog, ReadEventBacklogResult, RefreshRepositoryWorkspace,
    RepositoryWorkspaceResult, StartCommand,
};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::error::{AdapterError, AdapterResult};

/// Result of a `StartCommand`/`CancelCommand` call.
#[derive(Debug, Clone)]
pub struct CommandAck {
    pub success: bool,
    pub error_message: Option<String>,
}

/// Result of `GetCommandStatus`.
#[derive(Debug, Clone)]
pub struct CommandStatusReply {
    pub status: oj_wire::CommandStatus,
    pub result_envelope: Option<oj_wire::ResultEnvelope>,
}

/// The unary operations a task runtime exposes. One implementation per
/// connected endpoint; `oj-engine` holds these behind a
/// [`crate::factory::RuntimeClientFactory`] keyed by runtime id.
#[async_trait]
pub trait RuntimeClient: Send + Sync + 'static {
    async fn start_command(&self, req: StartCommand) -> AdapterResult<CommandAck>;
    async fn cancel_command(&self, req: CancelCommand) -> AdapterResult<CommandAck>;
    async fn get_command_status(&self, req: GetCommandStatus) -> AdapterResult<CommandStatusReply>;
    async fn check_health(&self) -> AdapterResult<CheckHealthResult>;
    async fn read_event_backlog(&self, req: ReadEventBacklog) -> AdapterResult<ReadEventBacklogResult>;
    async fn ensure_repository_workspace(&self, req: EnsureRepositoryWorkspace) -> AdapterResult<RepositoryWorkspaceResult>;
    async fn refresh_repository_workspace(&self, req: RefreshRepositoryWorkspace) -> AdapterResult<RepositoryWorkspaceResult>;

    /// `RefreshRepositoryWorkspace` with the documented fallback contract: if the
    /// runtime reports it unimplemented, retry `EnsureRepositoryWorkspace`
    /// with `repository_key_hint` set to the prior call's `local_path`.
    async fn refresh_or_ensure_workspace(
        &self,
        repository_clone_url: &str,
        branch_name: &str,
        prior_local_path: Option<String>,
    ) -> AdapterResult<RepositoryWorkspaceResult> {
        let refresh = self
            .refresh_repository_workspace(RefreshRepositoryWorkspace {
                repository_clone_url: repository_clone_url.to_string(),
                branch_name: branch_name.to_string(),
            })
            .await?;
        if !refresh.unimplemented {
            return Ok(refresh);
        }
        self.ensure_repository_workspace(EnsureRepositoryWorkspace {
            repository_clone_url: repository_clone_url.to_string(),
            branch_name: branch_name.to_string(),
            repository_key_hint: prior_local_path,
        })
        .await
    }
}

/// [`RuntimeClient`] over a fresh TCP connection per call, framed with
/// [`oj_wire::framing`]. Task runtimes are long-lived but low-QPS peers
/// (one command per run, one health probe per cycle), so a connection pool
/// is not worth the complexity the source doesn't need either.
#[derive(Debug, Clone)]
pub struct TcpRuntimeClient {
    endpoint: String,
    timeout: Duration,
}

impl TcpRuntimeClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), timeout: Duration::from_secs(10) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(&self, request: RuntimeRpcRequest) -> AdapterResult<RuntimeRpcResponse> {
        tokio::time::timeout(self.timeout, self.call_inner(request))
            .await
            .map_err(|_| AdapterError::Timeout(format!("rpc to {} timed out", self.endpoint)))?
    }

    async fn call_inner(&self, request: RuntimeRpcRequest) -> AdapterResult<RuntimeRpcResponse> {
        let addr = self.endpoint.trim_start_matches("http://").trim_start_matches("https://");
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| AdapterError::Connect(format!("connect to {addr} failed: {e}")))?;
        oj_wire::write_message(&mut stream, &request)
            .await
            .map_err(|e| AdapterError::Request(format!("write to {addr} failed: {e}")))?;
        oj_wire::read_message(&mut stream).await.map_err(|e| AdapterError::Request(format!("read from {addr} failed: {e}")))
    }
}

#[async_trait]
impl RuntimeClient for TcpRuntimeClient {
    async fn start_command(&self, req: StartCommand) -> AdapterResult<CommandAck> {
        match self.call(RuntimeRpcRequest::StartCommand(req)).await? {
            RuntimeRpcResponse::StartCommand(r) => Ok(CommandAck { success: r.success, error_message: r.error_message }),
            RuntimeRpcResponse::Error { message } => Err(AdapterError::Remote(message)),
            _ => Err(AdapterError::Remote("unexpected response shape for start_command".into())),
        }
    }

    async fn cancel_command(&self, req: CancelCommand) -> AdapterResult<CommandAck> {
        match self.call(RuntimeRpcRequest::CancelCommand(req)).await? {
            RuntimeRpcResponse::CancelCommand(r) => Ok(CommandAck { success: r.success, error_message: r.error_message }),
            RuntimeRpcResponse::Error { message } => Err(AdapterError::Remote(message)),
            _ => Err(AdapterError::Remote("unexpected response shape for cancel_command".into())),
        }
    }

    async fn get_command_status(&self, req: GetCommandStatus) -> AdapterResult<CommandStatusReply> {
        match self.call(RuntimeRpcRequest::GetCommandStatus(req)).await? {
            RuntimeRpcResponse::GetCommandStatus(r) => Ok(CommandStatusReply { status: r.status, result_envelope: r.result_envelope }),
            RuntimeRpcResponse::Error { message } => Err(AdapterError::Remote(message)),
            _ => Err(AdapterError::Remote("unexpected response shape for get_command_status".into())),
        }
    }

    async fn check_health(&self) -> AdapterResult<CheckHealthResult> {
        match self.call(RuntimeRpcRequest::CheckHealth).await? {
            RuntimeRpcResponse::CheckHealth(r) => Ok(r),
            RuntimeRpcResponse::Error { message } => Err(AdapterError::Remote(message)),
            _ => Err(AdapterError::Remote("unexpected response shape for check_health".into())),
        }
    }

    async fn read_event_backlog(&self, req: ReadEventBacklog) -> AdapterResult<ReadEventBacklogResult> {
        match self.call(RuntimeRpcRequest::ReadEventBacklog(req)).await? {
            RuntimeRpcResponse::ReadEventBacklog(r) => Ok(r),
            RuntimeRpcResponse::Error { message } => Err(AdapterError::Remote(message)),
            _ => Err(AdapterError::Remote("unexpected response shape for read_event_backlog".into())),
        }
    }

    async fn ensure_repository_workspace(&self, req: EnsureRepositoryWorkspace) -> AdapterResult<RepositoryWorkspaceResult> {
        match self.call(RuntimeRpcRequest::EnsureRepositoryWorkspace(req)).await? {
            RuntimeRpcResponse::RepositoryWorkspace(r) => Ok(r),
            RuntimeRpcResponse::Error { message } => Err(AdapterError::Remote(message)),
            _ => Err(AdapterError::Remote("unexpected response shape for ensure_repository_workspace".into())),
        }
    }

    async fn refresh_repository_workspace(&self, req: RefreshRepositoryWorkspace) -> AdapterResult<RepositoryWorkspaceResult> {
        match self.call(RuntimeRpcRequest::RefreshRepositoryWorkspace(req)).await? {
            RuntimeRpcResponse::RepositoryWorkspace(r) => Ok(r),
            RuntimeRpcResponse::Error { message } => Err(AdapterError::Remote(message)),
            _ => Err(AdapterError::Remote("unexpected response shape for refresh_repository_workspace".into())),
        }
    }
}

#[cfg(test)]
#[path = "runtime_client_tests.rs"]
mod tests;
