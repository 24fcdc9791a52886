// crates/tidepool-core/tests/classification.rs
// ============================================================================
// Module: Usage Classification Tests
// Description: Truth-table tests for active/idle/never-used classification.
// Purpose: Pin the classification rules the idle scan depends on.
// Dependencies: tidepool-core
// ============================================================================

//! ## Overview
//! Exercises [`tidepool_core::UsageStatus::classify`] across counter and
//! window combinations.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::time::Duration;

use tidepool_core::Timestamp;
use tidepool_core::UsageStatus;
use tidepool_core::UsageWindow;

/// Thirty days, the default idle threshold.
const IDLE_AFTER: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn day_ms(days: i64) -> i64 {
    days * 24 * 60 * 60 * 1_000
}

#[test]
fn zero_operations_is_never_used_regardless_of_elapsed_time() {
    let now = Timestamp::from_unix_millis(day_ms(1_000));
    for window_age_days in [0, 1, 29, 30, 31, 365] {
        let window = UsageWindow {
            total_operations: 0,
            window_start: Some(Timestamp::from_unix_millis(
                day_ms(1_000) - day_ms(window_age_days),
            )),
        };
        assert_eq!(
            UsageStatus::classify(window, now, IDLE_AFTER),
            UsageStatus::NeverUsed,
            "zero counters must classify never_used at age {window_age_days}d"
        );
    }
}

#[test]
fn missing_statistics_window_is_never_used() {
    let now = Timestamp::from_unix_millis(day_ms(1_000));
    let window = UsageWindow {
        total_operations: 42,
        window_start: None,
    };
    assert_eq!(UsageStatus::classify(window, now, IDLE_AFTER), UsageStatus::NeverUsed);
}

#[test]
fn stale_window_with_operations_is_idle() {
    let now = Timestamp::from_unix_millis(day_ms(1_000));
    let window = UsageWindow {
        total_operations: 7,
        window_start: Some(Timestamp::from_unix_millis(day_ms(1_000) - day_ms(31))),
    };
    assert_eq!(UsageStatus::classify(window, now, IDLE_AFTER), UsageStatus::Idle);
}

#[test]
fn fresh_window_with_operations_is_active() {
    let now = Timestamp::from_unix_millis(day_ms(1_000));
    let window = UsageWindow {
        total_operations: 7,
        window_start: Some(Timestamp::from_unix_millis(day_ms(1_000) - day_ms(29))),
    };
    assert_eq!(UsageStatus::classify(window, now, IDLE_AFTER), UsageStatus::Active);
}

#[test]
fn window_exactly_at_threshold_is_active() {
    let now = Timestamp::from_unix_millis(day_ms(1_000));
    let window = UsageWindow {
        total_operations: 1,
        window_start: Some(Timestamp::from_unix_millis(day_ms(1_000) - day_ms(30))),
    };
    // The threshold is exclusive: exactly idle_after old is still active.
    assert_eq!(UsageStatus::classify(window, now, IDLE_AFTER), UsageStatus::Active);
}

#[test]
fn pause_candidates_are_never_used_and_idle() {
    assert!(UsageStatus::NeverUsed.is_pause_candidate());
    assert!(UsageStatus::Idle.is_pause_candidate());
    assert!(!UsageStatus::Active.is_pause_candidate());
}
