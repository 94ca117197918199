// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-wire: wire-facing message shapes and framing shared by the daemon,
//! the CLI, and the runtime adapters. No business logic lives here.

pub mod control;
pub mod framing;
pub mod hub;
pub mod messages;
pub mod rpc;
pub mod runtime_rpc;

pub use control::{ControlRequest, ControlResponse, DaemonStatusReport, IncidentSummary};
pub use framing::{read_message, write_message, FramingError, MAX_FRAME_BYTES};
pub use hub::{HubFrame, SubscribeRequest};
pub use messages::{JobEventMessage, TaskRuntimeStatusMessage};
pub use rpc::{
    CancelCommand, CheckHealthResult, CommandStatus, EnsureRepositoryWorkspace, GetCommandStatus,
    ReadEventBacklog, ReadEventBacklogResult, RefreshRepositoryWorkspace,
    RepositoryWorkspaceResult, ResultEnvelope, ResultEnvelopeMetadata, StartCommand,
};
pub use runtime_rpc::{
    CancelCommandResult, CommandStatusResult, RuntimeRpcRequest, RuntimeRpcResponse,
    StartCommandResult,
};
