// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run Queue Drainer: a periodic tick that gives every task with at least
//! one queued run a single dispatch attempt, without tight-looping when a
//! task has no capacity this cycle.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use oj_core::{Clock, CoreResult, RunState};
use oj_storage::{RunFilter, Store};
use tokio::sync::oneshot;

use crate::config::QueueDrainerConfig;
use crate::dispatcher::Dispatcher;

pub struct QueueDrainer<C: Clock> {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher<C>>,
    config: QueueDrainerConfig,
}

impl<C: Clock> QueueDrainer<C> {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<Dispatcher<C>>, config: QueueDrainerConfig) -> Self {
        Self { store, dispatcher, config }
    }

    /// Give every task with at least one `Queued` run a single dispatch
    /// attempt. Returns the number of tasks that successfully dispatched.
    pub async fn run_once(&self) -> CoreResult<u32> {
        let queued = self.store.list_runs(RunFilter { task_id: None, state: Some(RunState::Queued) }).await?;
        let task_ids: BTreeSet<_> = queued.into_iter().map(|r| r.task_id).collect();
        let mut dispatched = 0u32;
        for task_id in task_ids {
            if self.dispatcher.dispatch_next_queued_for_task(task_id).await? {
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Run the periodic tick until `shutdown` fires. Errors from a single
    /// tick are logged and never stop the loop.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::warn!(error = %e, "queue drainer tick failed");
                    }
                }
                _ = &mut shutdown => break,
            }
        }
    }
}

#[cfg(test)]
#[path = "drainer_tests.rs"]
mod tests;
