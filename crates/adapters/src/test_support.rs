// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fakes for every adapter trait, reused by `oj-engine`'s test
//! suite via the `test-support` feature so engine tests never shell out to
//! `docker` or open a socket.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use oj_core::TaskRuntimeId;
use oj_wire::{
    CancelCommand, CheckHealthResult, EnsureRepositoryWorkspace, GetCommandStatus,
    ReadEventBacklog, ReadEventBacklogResult, RefreshRepositoryWorkspace,
    RepositoryWorkspaceResult, StartCommand,
};
use parking_lot::Mutex;

use crate::container::{ContainerClient, ContainerHandle, ContainerLabels};
use crate::error::{AdapterError, AdapterResult};
use crate::factory::RuntimeClientFactory;
use crate::runtime_client::{CommandAck, CommandStatusReply, RuntimeClient};

#[derive(Default)]
struct FakeContainerState {
    next_id: u64,
    containers: HashMap<String, ContainerLabels>,
    removed: Vec<String>,
    fail_next_ensure_image: bool,
}

/// [`ContainerClient`] backed by an in-memory map instead of `docker`.
#[derive(Clone, Default)]
pub struct FakeContainerClient {
    inner: Arc<Mutex<FakeContainerState>>,
}

impl FakeContainerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn managed_ids(&self) -> Vec<String> {
        self.inner.lock().containers.keys().cloned().collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.inner.lock().removed.clone()
    }

    pub fn fail_next_ensure_image(&self) {
        self.inner.lock().fail_next_ensure_image = true;
    }
}

#[async_trait]
impl ContainerClient for FakeContainerClient {
    async fn create_and_start(
        &self,
        _name: &str,
        _image: &str,
        labels: &ContainerLabels,
        _workspace_path: Option<&str>,
    ) -> AdapterResult<ContainerHandle> {
        let mut guard = self.inner.lock();
        guard.next_id += 1;
        let container_id = format!("fake-container-{}", guard.next_id);
        guard.containers.insert(container_id.clone(), labels.clone());
        let endpoint = format!("http://127.0.0.1:{}", 20000 + guard.next_id);
        Ok(ContainerHandle { container_id, endpoint })
    }

    async fn stop(&self, _container_id: &str) -> AdapterResult<()> {
        Ok(())
    }

    async fn start(&self, container_id: &str) -> AdapterResult<ContainerHandle> {
        Ok(ContainerHandle { container_id: container_id.to_string(), endpoint: format!("http://127.0.0.1:9{container_id}") })
    }

    async fn remove(&self, container_id: &str) -> AdapterResult<()> {
        let mut guard = self.inner.lock();
        guard.containers.remove(container_id);
        guard.removed.push(container_id.to_string());
        Ok(())
    }

    async fn kill(&self, container_id: &str) -> AdapterResult<()> {
        self.remove(container_id).await
    }

    async fn ensure_image(&self, _image: &str) -> AdapterResult<()> {
        let mut guard = self.inner.lock();
        if guard.fail_next_ensure_image {
            guard.fail_next_ensure_image = false;
            return Err(AdapterError::Docker("image pull failed".into()));
        }
        Ok(())
    }

    async fn list_managed(&self) -> AdapterResult<Vec<(String, ContainerLabels)>> {
        Ok(self.inner.lock().containers.iter().map(|(id, labels)| (id.clone(), labels.clone())).collect())
    }
}

#[derive(Default)]
struct FakeRuntimeState {
    command_status: HashMap<String, CommandStatusReply>,
    health: CheckHealthResult,
    backlog: Vec<oj_wire::JobEventMessage>,
}

/// [`RuntimeClient`] that answers from pre-seeded state instead of dialing a
/// runtime endpoint.
#[derive(Clone)]
pub struct FakeRuntimeClient {
    inner: Arc<Mutex<FakeRuntimeState>>,
}

impl Default for FakeRuntimeClient {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeRuntimeState {
                command_status: HashMap::new(),
                health: CheckHealthResult { success: true, error_message: None },
                backlog: Vec::new(),
            })),
        }
    }
}

impl FakeRuntimeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_health(&self, success: bool) {
        self.inner.lock().health = CheckHealthResult { success, error_message: if success { None } else { Some("probe failed".into()) } };
    }

    pub fn seed_backlog(&self, events: Vec<oj_wire::JobEventMessage>) {
        self.inner.lock().backlog = events;
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntimeClient {
    async fn start_command(&self, _req: StartCommand) -> AdapterResult<CommandAck> {
        Ok(CommandAck { success: true, error_message: None })
    }

    async fn cancel_command(&self, _req: CancelCommand) -> AdapterResult<CommandAck> {
        Ok(CommandAck { success: true, error_message: None })
    }

    async fn get_command_status(&self, req: GetCommandStatus) -> AdapterResult<CommandStatusReply> {
        let key = req.run_id.to_string();
        self.inner
            .lock()
            .command_status
            .get(&key)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(format!("no status seeded for {key}")))
    }

    async fn check_health(&self) -> AdapterResult<CheckHealthResult> {
        Ok(self.inner.lock().health.clone())
    }

    async fn read_event_backlog(&self, req: ReadEventBacklog) -> AdapterResult<ReadEventBacklogResult> {
        let guard = self.inner.lock();
        let events: Vec<_> =
            guard.backlog.iter().filter(|e| e.delivery_id > req.after_delivery_id).take(req.max_events as usize).cloned().collect();
        let has_more = guard.backlog.iter().any(|e| e.delivery_id > req.after_delivery_id) && events.len() == req.max_events as usize;
        Ok(ReadEventBacklogResult { success: true, error_message: None, has_more, events })
    }

    async fn ensure_repository_workspace(&self, _req: EnsureRepositoryWorkspace) -> AdapterResult<RepositoryWorkspaceResult> {
        Ok(RepositoryWorkspaceResult { success: true, error_message: None, local_path: Some("/workspace/repo".into()), unimplemented: false })
    }

    async fn refresh_repository_workspace(&self, _req: RefreshRepositoryWorkspace) -> AdapterResult<RepositoryWorkspaceResult> {
        Ok(RepositoryWorkspaceResult { success: true, error_message: None, local_path: Some("/workspace/repo".into()), unimplemented: false })
    }
}

/// [`RuntimeClientFactory`] that always hands back the same
/// [`FakeRuntimeClient`], regardless of runtime id or endpoint.
#[derive(Clone, Default)]
pub struct FakeRuntimeClientFactory {
    client: FakeRuntimeClient,
}

impl FakeRuntimeClientFactory {
    pub fn new(client: FakeRuntimeClient) -> Self {
        Self { client }
    }
}

impl RuntimeClientFactory for FakeRuntimeClientFactory {
    fn client_for(&self, _runtime_id: &TaskRuntimeId, _endpoint: &str) -> Arc<dyn RuntimeClient> {
        Arc::new(self.client.clone())
    }
}

#[cfg(test)]
#[path = "test_support_tests.rs"]
mod tests;
