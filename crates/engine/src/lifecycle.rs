// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime Directory & Lifecycle Manager: owns every container-level
//! transition a task runtime goes through (provision, restart, recycle,
//! drain, idle scale-down) and the registration heartbeat that keeps
//! `active_runs`/`last_activity_utc_ms` fresh between health probes.
//!
//! Image pulls and generic container operations (start/stop/remove) run
//! through separate concurrency gates, so a slow image pull for one task
//! never starves a restart of an unrelated runtime.

use std::sync::Arc;

use oj_core::{Clock, CoreError, CoreResult, Repository, Task, TaskRuntime, TaskRuntimeId, TaskRuntimeRegistration, TaskRuntimeState};
use oj_adapters::{AdapterBundle, ContainerLabels};
use oj_storage::Store;
use tokio::sync::Semaphore;

use crate::config::LifecycleConfig;

const CONTAINER_OP_SLOTS: usize = 4;
const IMAGE_BUILD_SLOTS: usize = 1;

/// Drives the container-level state transitions of task runtimes.
pub struct LifecycleManager<C: Clock> {
    store: Arc<dyn Store>,
    adapters: AdapterBundle,
    clock: C,
    config: LifecycleConfig,
    container_gate: Arc<Semaphore>,
    image_gate: Arc<Semaphore>,
}

impl<C: Clock> LifecycleManager<C> {
    pub fn new(store: Arc<dyn Store>, adapters: AdapterBundle, clock: C, config: LifecycleConfig) -> Self {
        Self {
            store,
            adapters,
            clock,
            config,
            container_gate: Arc::new(Semaphore::new(CONTAINER_OP_SLOTS)),
            image_gate: Arc::new(Semaphore::new(IMAGE_BUILD_SLOTS)),
        }
    }

    pub async fn list_task_runtimes(&self) -> CoreResult<Vec<TaskRuntime>> {
        self.store.list_task_runtimes().await
    }

    pub async fn get_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<Option<TaskRuntime>> {
        self.store.get_task_runtime(id).await
    }

    /// Pull `image` if not already present locally. Idempotent; gated
    /// separately from generic container ops so it never blocks a
    /// restart/recycle in flight for another runtime.
    pub async fn ensure_task_runtime_image_available(&self, image: &str) -> CoreResult<()> {
        let _permit = self.image_gate.acquire().await.map_err(|e| CoreError::Fatal(e.to_string()))?;
        self.adapters.containers.ensure_image(image).await?;
        Ok(())
    }

    /// Record a runtime's heartbeat registration. Called by the control
    /// surface a runtime uses to report in before its first health probe.
    pub async fn report_heartbeat(&self, registration: TaskRuntimeRegistration) -> CoreResult<()> {
        self.store.save_registration(registration, self.clock.epoch_ms()).await
    }

    /// Create and start a fresh container for `task`, persisting a
    /// `Provisioning` stub first so a failed image pull or container
    /// create still leaves a diagnosable row behind rather than nothing.
    pub async fn provision_task_runtime(&self, task: &Task, repository: &Repository) -> CoreResult<TaskRuntime> {
        let now = self.clock.epoch_ms();
        let id = TaskRuntimeId::new();
        let mut stub = TaskRuntime {
            id,
            task_id: task.id,
            state: TaskRuntimeState::Provisioning,
            active_runs: 0,
            max_parallel_runs: task.concurrency_limit.max(1),
            endpoint: String::new(),
            container_id: None,
            workspace_path: Some(repository.cache_path.clone()),
            runtime_home_path: None,
            last_activity_utc_ms: now,
            inactive_after_utc_ms: None,
            last_error: None,
            cold_start_count: 0,
            failed_start_count: 0,
            created_at_ms: now,
        };

        if let Err(e) = self.ensure_task_runtime_image_available(&task.worker_image_ref).await {
            stub.last_error = Some(e.to_string());
            stub.failed_start_count += 1;
            self.store.upsert_task_runtime(stub).await?;
            return Err(e);
        }

        let _permit = self.container_gate.acquire().await.map_err(|e| CoreError::Fatal(e.to_string()))?;
        let name = format!("oj-{}", id.suffix());
        let labels = ContainerLabels { run_id: None, task_id: task.id.to_string(), repo_id: repository.id.to_string() };
        let handle = match self.adapters.containers.create_and_start(&name, &task.worker_image_ref, &labels, Some(&repository.cache_path)).await {
            Ok(handle) => handle,
            Err(e) => {
                let core_err: CoreError = e.into();
                stub.last_error = Some(core_err.to_string());
                stub.failed_start_count += 1;
                self.store.upsert_task_runtime(stub).await?;
                return Err(core_err);
            }
        };

        stub.state = TaskRuntimeState::Ready;
        stub.endpoint = handle.endpoint;
        stub.container_id = Some(handle.container_id);
        stub.cold_start_count += 1;
        stub.last_error = None;
        self.store.upsert_task_runtime(stub.clone()).await?;
        Ok(stub)
    }

    /// Stop and restart the same container in place. A missing container
    /// is not an error at the adapter layer, but the endpoint it reports
    /// back after `start` may have changed (port remapping).
    pub async fn restart_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<TaskRuntime> {
        let mut runtime = self.store.get_task_runtime(id).await?.ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let Some(container_id) = runtime.container_id.clone() else {
            return Err(CoreError::ValidationFailure(format!("runtime {id} has no container to restart")));
        };
        let _permit = self.container_gate.acquire().await.map_err(|e| CoreError::Fatal(e.to_string()))?;
        self.adapters.containers.stop(&container_id).await?;
        let handle = self.adapters.containers.start(&container_id).await?;
        runtime.endpoint = handle.endpoint;
        runtime.state = TaskRuntimeState::Ready;
        runtime.last_error = None;
        runtime.record_activity(self.clock.epoch_ms());
        self.store.upsert_task_runtime(runtime.clone()).await?;
        Ok(runtime)
    }

    /// Remove the runtime's container entirely and provision a fresh one
    /// for the same task, keeping the `TaskRuntimeId` stable since one
    /// runtime row exists per task.
    pub async fn recycle_task_runtime(&self, id: TaskRuntimeId) -> CoreResult<TaskRuntime> {
        let runtime = self.store.get_task_runtime(id).await?.ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let task = self.store.get_task(runtime.task_id).await?.ok_or_else(|| CoreError::NotFound(runtime.task_id.to_string()))?;

        if let Some(container_id) = runtime.container_id.clone() {
            let _permit = self.container_gate.acquire().await.map_err(|e| CoreError::Fatal(e.to_string()))?;
            self.adapters.containers.remove(&container_id).await?;
        }

        self.ensure_task_runtime_image_available(&task.worker_image_ref).await?;
        let _permit = self.container_gate.acquire().await.map_err(|e| CoreError::Fatal(e.to_string()))?;
        let name = format!("oj-{}", id.suffix());
        let labels = ContainerLabels { run_id: None, task_id: task.id.to_string(), repo_id: String::new() };
        let handle = self.adapters.containers.create_and_start(&name, &task.worker_image_ref, &labels, runtime.workspace_path.as_deref()).await?;

        let mut recycled = runtime;
        recycled.state = TaskRuntimeState::Ready;
        recycled.endpoint = handle.endpoint;
        recycled.container_id = Some(handle.container_id);
        recycled.active_runs = 0;
        recycled.cold_start_count += 1;
        recycled.failed_start_count = 0;
        recycled.last_error = None;
        recycled.record_activity(self.clock.epoch_ms());
        self.store.upsert_task_runtime(recycled.clone()).await?;
        Ok(recycled)
    }

    /// Toggle the draining flag. Draining runtimes stay visible (so the
    /// operator can watch them finish their in-flight runs) but the
    /// dispatcher never routes a new run to one.
    pub async fn set_task_runtime_draining(&self, id: TaskRuntimeId, draining: bool) -> CoreResult<TaskRuntime> {
        let mut runtime = self.store.get_task_runtime(id).await?.ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        runtime.state = if draining { TaskRuntimeState::Draining } else { TaskRuntimeState::Ready };
        self.store.upsert_task_runtime(runtime.clone()).await?;
        Ok(runtime)
    }

    /// Stop idle, zero-activity `Ready` runtimes down to
    /// `min_warm_runtimes`, oldest-idle first. Returns the number stopped.
    pub async fn scale_down_idle_task_runtimes(&self) -> CoreResult<u32> {
        let now = self.clock.epoch_ms();
        let idle_timeout_ms = self.config.idle_timeout_secs * 1000;
        let runtimes = self.store.list_task_runtimes().await?;
        let total_ready = runtimes.iter().filter(|r| r.state == TaskRuntimeState::Ready).count() as u32;
        if total_ready <= self.config.min_warm_runtimes {
            return Ok(0);
        }
        let mut idle: Vec<TaskRuntime> = runtimes
            .into_iter()
            .filter(|r| r.state == TaskRuntimeState::Ready && r.active_runs == 0 && now.saturating_sub(r.last_activity_utc_ms) >= idle_timeout_ms)
            .collect();
        idle.sort_by_key(|r| r.last_activity_utc_ms);

        let allowed_to_stop = (total_ready - self.config.min_warm_runtimes) as usize;
        let mut stopped = 0u32;
        for mut runtime in idle.into_iter().take(allowed_to_stop) {
            if let Some(container_id) = runtime.container_id.clone() {
                let _permit = self.container_gate.acquire().await.map_err(|e| CoreError::Fatal(e.to_string()))?;
                self.adapters.containers.stop(&container_id).await?;
            }
            runtime.state = TaskRuntimeState::Stopped;
            runtime.inactive_after_utc_ms = Some(now);
            self.store.upsert_task_runtime(runtime).await?;
            stopped += 1;
        }
        Ok(stopped)
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
