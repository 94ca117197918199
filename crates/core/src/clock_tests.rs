use super::*;

#[test]
fn fake_clock_advances_instant_and_epoch_together() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    let ms0 = clock.epoch_ms();

    clock.advance(Duration::from_secs(5));

    assert_eq!(clock.now(), t0 + Duration::from_secs(5));
    assert_eq!(clock.epoch_ms(), ms0 + 5_000);
}

#[test]
fn fake_clock_set_overrides_instant_only() {
    let clock = FakeClock::new();
    let target = clock.now() + Duration::from_secs(60);
    clock.set(target);
    assert_eq!(clock.now(), target);
}

#[test]
fn fake_clock_default_epoch_is_stable() {
    let a = FakeClock::default();
    let b = FakeClock::default();
    assert_eq!(a.epoch_ms(), b.epoch_ms());
}

#[test]
fn system_clock_epoch_ms_is_plausible() {
    let clock = SystemClock;
    // Sometime after 2021-01-01 in epoch millis.
    assert!(clock.epoch_ms() > 1_600_000_000_000);
}
