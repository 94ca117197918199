// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope types for the runtime's unary command service.
//!
//! The runtime RPC service is an opaque peer: this crate
//! only needs a wire shape for it, so every call is framed the same way the
//! control socket is (length-prefixed JSON, [`crate::framing`]), tagged by
//! operation name. This keeps `oj-adapters` free of a second wire format.

use serde::{Deserialize, Serialize};

use crate::rpc::{
    CancelCommand, CheckHealthResult, EnsureRepositoryWorkspace, GetCommandStatus,
    ReadEventBacklog, ReadEventBacklogResult, RefreshRepositoryWorkspace,
    RepositoryWorkspaceResult, ResultEnvelope, StartCommand,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RuntimeRpcRequest {
    StartCommand(StartCommand),
    CancelCommand(CancelCommand),
    GetCommandStatus(GetCommandStatus),
    CheckHealth,
    ReadEventBacklog(ReadEventBacklog),
    EnsureRepositoryWorkspace(EnsureRepositoryWorkspace),
    RefreshRepositoryWorkspace(RefreshRepositoryWorkspace),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCommandResult {
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelCommandResult {
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStatusResult {
    pub status: crate::rpc::CommandStatus,
    pub result_envelope: Option<ResultEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RuntimeRpcResponse {
    StartCommand(StartCommandResult),
    CancelCommand(CancelCommandResult),
    GetCommandStatus(CommandStatusResult),
    CheckHealth(CheckHealthResult),
    ReadEventBacklog(ReadEventBacklogResult),
    RepositoryWorkspace(RepositoryWorkspaceResult),
    Error { message: String },
}

#[cfg(test)]
#[path = "runtime_rpc_tests.rs"]
mod tests;
