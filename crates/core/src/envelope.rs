// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure classification for a run's completion envelope.
//!
//! Order matters: the envelope's own `metadata.failure_class` always wins
//! when present, since the runtime is in the best position to know why it
//! gave up. Everything below that is a best-effort string match over the
//! summary/error text that ships from runtimes too old to set the field.

use crate::run::FailureClass;

/// Minimal view over a result envelope needed to classify a failure.
/// Deliberately not the full wire envelope type (that lives in the wire
/// crate) so this stays testable without a serde round trip.
#[derive(Debug, Default)]
pub struct EnvelopeFailureInput<'a> {
    pub metadata_failure_class: Option<FailureClass>,
    pub summary: Option<&'a str>,
    pub error: Option<&'a str>,
}

pub fn classify_failure(input: &EnvelopeFailureInput<'_>) -> Option<FailureClass> {
    if let Some(class) = input.metadata_failure_class {
        return Some(class);
    }
    if let Some(summary) = input.summary {
        if summary.contains("Workspace preparation failed") {
            return Some(FailureClass::WorkspacePreparation);
        }
    }
    if let Some(error) = input.error {
        if error.contains("Envelope validation") {
            return Some(FailureClass::EnvelopeValidation);
        }
        let lower = error.to_ascii_lowercase();
        if lower.contains("timeout") || lower.contains("cancelled") || lower.contains("canceled") {
            return Some(FailureClass::Timeout);
        }
    }
    None
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
