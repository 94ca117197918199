// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-adapters: I/O boundaries between the engine and the outside world —
//! container lifecycle, the task runtime's unary RPC service, its
//! streaming event hub, and outbound notifications. No orchestration logic
//! lives here; `oj-engine` calls through these traits and decides what to
//! do with the results.

pub mod container;
pub mod error;
pub mod factory;
pub mod hub_client;
pub mod publisher;
pub mod runtime_client;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use container::{ContainerClient, ContainerHandle, ContainerLabels, DockerContainerClient};
pub use error::{AdapterError, AdapterResult};
pub use factory::{AdapterBundle, RuntimeClientFactory, TcpRuntimeClientFactory};
pub use hub_client::{run_bridge, HubConnectionState, HubEvent, ReconnectBackoff};
pub use publisher::{DesktopPublisher, Publisher, PublisherError, Severity};
pub use runtime_client::{CommandAck, CommandStatusReply, RuntimeClient, TcpRuntimeClient};

#[cfg(any(test, feature = "test-support"))]
pub use test_support::{FakeContainerClient, FakeRuntimeClient, FakeRuntimeClientFactory};
