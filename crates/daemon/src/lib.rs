// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Odd Jobs Daemon: the process that supervises the control plane's
//! background components (`oj-engine`) and exposes them over a local
//! control socket.
//!
//! `oj-wire::control` carries the IPC protocol; this crate is the process
//! that answers it. Business logic lives in `oj-engine` — this crate wires
//! components together, resolves configuration and logging, and runs the
//! Unix-domain-socket server.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod lock;
pub mod logging;
pub mod server;
pub mod supervisor;

pub use lock::{DaemonLock, LockError};
pub use server::{run_control_server, ServerError};
pub use supervisor::{build_store, Supervisor};
