// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binds a task runtime's endpoint to the clients that talk to it.
//!
//! The engine deals only in runtime ids and endpoints; this factory is the
//! one seam that turns an endpoint string into live transport objects, so
//! tests can swap in fakes without threading construction details through
//! every call site.

use std::sync::Arc;

use oj_core::TaskRuntimeId;

use crate::container::ContainerClient;
use crate::runtime_client::RuntimeClient;

/// Produces a [`RuntimeClient`] for a runtime's current endpoint. Endpoints
/// can change across restarts (a fresh `docker run` remaps the published
/// port), so callers re-resolve through this factory rather than caching a
/// client past a lifecycle transition.
pub trait RuntimeClientFactory: Send + Sync + 'static {
    fn client_for(&self, runtime_id: &TaskRuntimeId, endpoint: &str) -> Arc<dyn RuntimeClient>;
}

/// [`RuntimeClientFactory`] backed by [`crate::runtime_client::TcpRuntimeClient`].
#[derive(Debug, Clone, Default)]
pub struct TcpRuntimeClientFactory;

impl RuntimeClientFactory for TcpRuntimeClientFactory {
    fn client_for(&self, _runtime_id: &TaskRuntimeId, endpoint: &str) -> Arc<dyn RuntimeClient> {
        Arc::new(crate::runtime_client::TcpRuntimeClient::new(endpoint))
    }
}

/// Bundles the container client and runtime-client factory the lifecycle
/// manager and event listener both need, so the daemon wires up one
/// implementation of each per process rather than passing them separately
/// through every constructor.
#[derive(Clone)]
pub struct AdapterBundle {
    pub containers: Arc<dyn ContainerClient>,
    pub runtime_clients: Arc<dyn RuntimeClientFactory>,
}

impl AdapterBundle {
    pub fn docker() -> Self {
        Self {
            containers: Arc::new(crate::container::DockerContainerClient::new()),
            runtime_clients: Arc::new(TcpRuntimeClientFactory),
        }
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
