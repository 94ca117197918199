use super::*;
use oj_core::RunId;

#[test]
fn envelope_prefers_metadata_failure_class() {
    let envelope = ResultEnvelope {
        run_id: RunId::new(),
        succeeded: false,
        summary: Some("Workspace preparation failed: out of disk".into()),
        output_json: None,
        error: None,
        metadata: ResultEnvelopeMetadata { failure_class: Some(FailureClass::Timeout), ..Default::default() },
    };
    assert_eq!(envelope.classify_failure(), Some(FailureClass::Timeout));
}

#[test]
fn envelope_falls_back_to_text_matching_without_metadata() {
    let envelope = ResultEnvelope {
        run_id: RunId::new(),
        succeeded: false,
        summary: None,
        output_json: None,
        error: Some("Envelope validation: bad json".into()),
        metadata: ResultEnvelopeMetadata::default(),
    };
    assert_eq!(envelope.classify_failure(), Some(FailureClass::EnvelopeValidation));
}

#[test]
fn envelope_serializes_with_snake_case_fields() {
    let envelope = ResultEnvelope {
        run_id: RunId::new(),
        succeeded: true,
        summary: Some("done".into()),
        output_json: None,
        error: None,
        metadata: ResultEnvelopeMetadata::default(),
    };
    let json = serde_json::to_string(&envelope).unwrap();
    assert!(json.contains("\"succeeded\":true"));
    assert!(json.contains("\"run_id\""));
}

#[test]
fn obsolete_disposition_is_detected_from_metadata() {
    let metadata = ResultEnvelopeMetadata { run_disposition: Some("obsolete".into()), ..Default::default() };
    assert!(metadata.is_obsolete());
    assert!(!ResultEnvelopeMetadata::default().is_obsolete());
}
