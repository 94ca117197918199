// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-local error type: every adapter/store error the orchestration
//! loops see converts into [`oj_core::CoreError`] at the call site (via
//! `?`/`.into()`), so this crate has nothing left to wrap except its own
//! local validation failures.

pub use oj_core::{CoreError, CoreResult};

pub type EngineResult<T> = CoreResult<T>;
