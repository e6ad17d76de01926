use super::*;

#[test]
fn system_clock_monotonic_does_not_go_backwards() {
    let clock = SystemClock;
    let a = clock.now_monotonic();
    let b = clock.now_monotonic();
    assert!(b >= a);
}
