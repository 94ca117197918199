use super::*;
use crate::ids::RunId;

#[test]
fn assembly_rejects_chunk_that_would_exceed_cap() {
    let mut assembly = ArtifactAssembly::new();
    assembly.push_chunk(0, vec![0u8; 10], 15).unwrap();
    let err = assembly.push_chunk(1, vec![0u8; 10], 15).unwrap_err();
    assert!(matches!(err, crate::error::CoreError::ResourceExhausted(_)));
}

#[test]
fn assembly_reassembles_out_of_order_chunks() {
    let mut assembly = ArtifactAssembly::new();
    assembly.push_chunk(1, vec![2, 3], 100).unwrap();
    assembly.push_chunk(0, vec![0, 1], 100).unwrap();
    assert_eq!(assembly.assemble(2), Some(vec![0, 1, 2, 3]));
}

#[test]
fn assembly_is_none_when_a_chunk_is_missing() {
    let mut assembly = ArtifactAssembly::new();
    assembly.push_chunk(0, vec![0], 100).unwrap();
    assert_eq!(assembly.assemble(2), None);
}

#[test]
fn run_totals_enforce_per_run_cap_and_clear_on_terminal() {
    let mut totals = RunArtifactTotals::new();
    let run_id = RunId::new();
    totals.try_add(run_id, 100, 150).unwrap();
    let err = totals.try_add(run_id, 100, 150).unwrap_err();
    assert!(matches!(err, crate::error::CoreError::ResourceExhausted(_)));
    totals.clear(run_id);
    assert_eq!(totals.total_for(run_id), 0);
    totals.try_add(run_id, 100, 150).unwrap();
}
