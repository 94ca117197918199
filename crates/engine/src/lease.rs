// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease coordinator: thin wrapper over [`Store`]'s conditional-upsert lease
//! operations, giving background singleton loops (retention cleanup)
//! a `try_acquire`/`release` pair instead of re-deriving the TTL math at
//! every call site.

use std::sync::Arc;
use std::time::Duration;

use oj_core::{Clock, CoreResult};
use oj_storage::Store;

/// One named singleton lease, held by at most one process at a time across
/// the fleet.
pub struct LeaseCoordinator<C: Clock> {
    store: Arc<dyn Store>,
    clock: C,
    name: &'static str,
    owner_id: String,
}

impl<C: Clock> LeaseCoordinator<C> {
    pub fn new(store: Arc<dyn Store>, clock: C, name: &'static str, owner_id: impl Into<String>) -> Self {
        Self { store, clock, name, owner_id: owner_id.into() }
    }

    /// Attempt to acquire (or renew) the lease for `ttl`. Returns `true` if
    /// this process now holds it.
    pub async fn try_acquire(&self, ttl: Duration) -> CoreResult<bool> {
        let now = self.clock.epoch_ms();
        let expires_at = now.saturating_add(ttl.as_millis() as u64);
        self.store.acquire_lease(self.name, &self.owner_id, expires_at, now).await
    }

    /// Best-effort release; a no-op if this process no longer holds the
    /// lease.
    pub async fn release(&self) -> CoreResult<()> {
        self.store.release_lease(self.name, &self.owner_id).await
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
