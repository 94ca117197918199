// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque identifiers for every entity in the orchestration core.

crate::define_id! {
    /// Identifies a single execution attempt of a [`crate::task::Task`].
    pub struct RunId("run-");
}

crate::define_id! {
    /// Identifies a repeatable recipe that can produce runs.
    pub struct TaskId("tsk-");
}

crate::define_id! {
    /// Identifies a repository's git coordinates and local cache metadata.
    pub struct RepositoryId("rpo-");
}

crate::define_id! {
    /// Identifies a containerised worker that hosts a task's runs.
    pub struct TaskRuntimeId("trt-");
}
