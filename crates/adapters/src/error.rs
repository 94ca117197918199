// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter-local error kind, converted to [`oj_core::CoreError`] at every
//! call site so the engine never sees transport-specific error types.

use oj_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("remote returned error: {0}")]
    Remote(String),

    #[error("docker command failed: {0}")]
    Docker(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unimplemented on remote")]
    Unimplemented,
}

impl From<AdapterError> for CoreError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Connect(m) | AdapterError::Request(m) => CoreError::TransientNetwork(m),
            AdapterError::Timeout(m) => CoreError::Timeout(m),
            AdapterError::Remote(m) => CoreError::Fatal(m),
            AdapterError::Docker(m) => CoreError::TransientNetwork(m),
            AdapterError::NotFound(m) => CoreError::NotFound(m),
            AdapterError::Unimplemented => {
                CoreError::ValidationFailure("unimplemented on remote".into())
            }
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
