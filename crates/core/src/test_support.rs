// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures and proptest strategies, reused by downstream
//! crates' test suites via the `test-support` feature.

use crate::ids::{RepositoryId, RunId, TaskId};
use crate::run::{Run, RunState};

pub fn sample_run(state: RunState) -> Run {
    let mut run = Run::new_queued(RepositoryId::new(), TaskId::new(), "agentic", "json-lines", 1_000);
    run.state = state;
    run
}

#[cfg(feature = "proptest")]
pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_run_state() -> impl Strategy<Value = RunState> {
        prop_oneof![
            Just(RunState::Queued),
            Just(RunState::PendingApproval),
            Just(RunState::Running),
            Just(RunState::Succeeded),
            Just(RunState::Failed),
            Just(RunState::Obsolete),
        ]
    }

    /// Arbitrary monotonically increasing delivery id sequence, used by
    /// checkpoint-advancement proptests.
    pub fn arb_delivery_sequence(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
        proptest::collection::vec(1u64..1_000, 1..max_len).prop_map(|mut v| {
            v.sort_unstable();
            v.dedup();
            v
        })
    }

    pub fn arb_run_id() -> impl Strategy<Value = RunId> {
        Just(RunId::new())
    }
}
