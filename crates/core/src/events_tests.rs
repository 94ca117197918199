use super::*;
use crate::ids::RunId;

#[test]
fn synthetic_sequence_is_strictly_increasing_even_with_repeated_timestamps() {
    let mut seq = SyntheticSequence::new();
    let a = seq.next(1_000);
    let b = seq.next(1_000);
    let c = seq.next(1_000);
    assert!(a < b);
    assert!(b < c);
}

#[test]
fn synthetic_sequence_jumps_forward_on_timestamp_gap() {
    let mut seq = SyntheticSequence::new();
    seq.next(1_000);
    let later = seq.next(5_000);
    assert_eq!(later, 5_000);
}

#[test]
fn synthetic_sequence_seeds_from_last_known_watermark() {
    let mut seq = SyntheticSequence::seed_from(42);
    assert_eq!(seq.next(10), 43);
}

#[test]
fn tool_projection_completes_with_output() {
    let run_id = RunId::new();
    let mut projection = RunToolProjection::started(run_id, "call-1", 5, Some("{}".into()));
    assert_eq!(projection.status, ToolCallStatus::Started);
    projection.complete(9, true, Some("{\"ok\":true}".into()));
    assert_eq!(projection.status, ToolCallStatus::Succeeded);
    assert_eq!(projection.sequence_end, Some(9));
}
