// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-module error kinds for the orchestration core.
//!
//! Mirrors the semantic error kinds from the design: every adapter boundary
//! (store, runtime client, publisher) converts its own error type into one of
//! these variants rather than leaking transport-specific errors upward.
//! Nothing here is control flow via panics — `NotFound`/`Conflict` are
//! ordinary values, not exceptions.

use thiserror::Error;

/// Semantic error kind shared across the orchestration core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// RPC, hub, or DB connection reset. Retried with back-off at the loop
    /// boundary; never propagated to a caller as a hard failure.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Unknown runtime/run/task id. Callers treat this as `None`/`false`,
    /// never as an exception.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is already satisfied (terminal run already completed,
    /// lease held by another owner). Callers treat this as a no-op success.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Branch name, envelope JSON, or config validation failed.
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    /// Deadline exceeded or the operation was cancelled.
    #[error("timeout or cancelled: {0}")]
    Timeout(String),

    /// Artifact caps or the concurrency gate rejected this work. Logged and
    /// dropped, never retried silently.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Unrecoverable at this layer; surfaced to the host lifecycle (e.g. the
    /// store being unavailable at startup).
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientNetwork(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
