// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leases: a single-row-per-name singleton lock used to keep exactly one
//! instance of a background service (retention cleanup, queue drainer)
//! active across a fleet of daemons.
//!
//! Acquisition is a single conditional upsert, not a read-then-write: the
//! store implements `acquire` as
//! `INSERT ... ON CONFLICT (name) DO UPDATE ... WHERE expires_at < :now OR
//! owner_id = :owner`, so a stale or self-held lease is always reclaimable
//! without a races-prone check-then-act.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub name: String,
    pub owner_id: String,
    pub expires_at_utc_ms: u64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_utc_ms < now_ms
    }

    pub fn is_held_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
