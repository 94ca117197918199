// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifacts reassembled from manifest/chunk/commit event triples, with
//! per-artifact and per-run size caps enforced at append time.

use crate::ids::RunId;
use serde::{Deserialize, Serialize};

/// A completed artifact, persisted once its commit event has been seen and
/// its reassembled bytes hash-verified against the manifest.
///
/// Deduplicated by `(run_id, file_name)`: a resend of an already-committed
/// artifact overwrites in place rather than producing a duplicate row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub run_id: RunId,
    pub file_name: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// In-flight reassembly state for one artifact, held under the per-assembly
/// mutex while chunks arrive out of order or duplicated.
#[derive(Debug, Default)]
pub struct ArtifactAssembly {
    pub expected_sha256: Option<String>,
    pub expected_size_bytes: Option<u64>,
    chunks: std::collections::BTreeMap<u64, Vec<u8>>,
    received_bytes: u64,
}

impl ArtifactAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk. Returns an error if admitting it would exceed
    /// `max_artifact_bytes`; the caller drops the whole assembly on this
    /// outcome rather than retrying silently.
    pub fn push_chunk(&mut self, index: u64, data: Vec<u8>, max_artifact_bytes: u64) -> Result<(), crate::error::CoreError> {
        let incoming = data.len() as u64;
        if self.received_bytes + incoming > max_artifact_bytes {
            return Err(crate::error::CoreError::ResourceExhausted(format!(
                "artifact exceeds {max_artifact_bytes} byte cap"
            )));
        }
        if self.chunks.insert(index, data).is_none() {
            self.received_bytes += incoming;
        }
        Ok(())
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// Concatenate chunks in index order. Returns `None` if any index in
    /// `0..chunk_count` is missing.
    pub fn assemble(&self, chunk_count: u64) -> Option<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.received_bytes as usize);
        for i in 0..chunk_count {
            buf.extend_from_slice(self.chunks.get(&i)?);
        }
        Some(buf)
    }
}

/// Tracks total committed artifact bytes per run, enforcing the per-run cap
/// independently of any single artifact's own cap. Cleared on a run's
/// terminal event or an explicit cache-clear request.
#[derive(Debug, Default)]
pub struct RunArtifactTotals {
    totals: std::collections::HashMap<RunId, u64>,
}

impl RunArtifactTotals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_add(&mut self, run_id: RunId, additional_bytes: u64, max_total_bytes_per_run: u64) -> Result<(), crate::error::CoreError> {
        let current = self.totals.get(&run_id).copied().unwrap_or(0);
        let next = current + additional_bytes;
        if next > max_total_bytes_per_run {
            return Err(crate::error::CoreError::ResourceExhausted(format!(
                "run artifact total exceeds {max_total_bytes_per_run} byte cap"
            )));
        }
        self.totals.insert(run_id, next);
        Ok(())
    }

    pub fn clear(&mut self, run_id: RunId) {
        self.totals.remove(&run_id);
    }

    pub fn total_for(&self, run_id: RunId) -> u64 {
        self.totals.get(&run_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
