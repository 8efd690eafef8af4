//! Tests for utility functions

use measurement_plane::util::{elapsed_ms, init_tracing, now_ms};

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_elapsed_ms_saturates() {
    assert_eq!(elapsed_ms(now_ms() + 60_000), 0);
    assert!(elapsed_ms(now_ms() - 1_000) >= 1_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
