// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

/// Protocol version (from Cargo.toml); no build-time git hash is baked in,
/// since this workspace has no build script to supply one.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
