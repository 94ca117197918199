// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single-instance lock on the state directory: acquired first, before
//! anything else touches the socket or store, so two daemons never fight
//! over the same `ojd.sock`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("ojd is already running (pid {0})")]
    AlreadyRunning(String),
    #[error("failed to access lock file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Held for the process lifetime; dropping it releases the `flock`.
pub struct DaemonLock {
    _file: File,
    path: PathBuf,
}

impl DaemonLock {
    /// Acquires `<state_dir>/daemon.pid` exclusively and stamps it with this
    /// process's pid. Fails immediately rather than blocking, since a
    /// second daemon should report the conflict and exit, not hang.
    pub fn acquire(state_dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(state_dir).map_err(|source| LockError::Io { path: state_dir.to_path_buf(), source })?;
        let path = state_dir.join("daemon.pid");

        let mut file = OpenOptions::new().write(true).create(true).truncate(false).open(&path).map_err(|source| LockError::Io { path: path.clone(), source })?;
        file.try_lock_exclusive().map_err(|_| {
            let pid = std::fs::read_to_string(&path).unwrap_or_default().trim().to_string();
            LockError::AlreadyRunning(pid)
        })?;

        file.set_len(0).map_err(|source| LockError::Io { path: path.clone(), source })?;
        writeln!(file, "{}", std::process::id()).map_err(|source| LockError::Io { path: path.clone(), source })?;

        Ok(Self { _file: file, path })
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
