use super::*;

#[test]
fn lease_expiry_is_exclusive_of_now() {
    let lease = Lease { name: "retention".into(), owner_id: "daemon-a".into(), expires_at_utc_ms: 1_000 };
    assert!(!lease.is_expired(1_000));
    assert!(lease.is_expired(1_001));
}

#[test]
fn lease_held_by_checks_owner_id() {
    let lease = Lease { name: "retention".into(), owner_id: "daemon-a".into(), expires_at_utc_ms: 1_000 };
    assert!(lease.is_held_by("daemon-a"));
    assert!(!lease.is_held_by("daemon-b"));
}
