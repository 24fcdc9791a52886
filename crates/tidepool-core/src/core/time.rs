// crates/tidepool-core/src/core/time.rs
// ============================================================================
// Module: Tidepool Time Model
// Description: Canonical timestamp representation for registry and queue records.
// Purpose: Keep decision logic deterministic by making callers supply time.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Tidepool records carry explicit unix-millisecond timestamps. The core
//! never reads wall-clock time; scanners and handlers pass `now` in, which
//! keeps idle classification and scheduling decisions replayable in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix-epoch millisecond timestamp.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Arithmetic saturates instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp advanced by the given duration.
    #[must_use]
    pub fn saturating_add(self, delay: Duration) -> Self {
        let millis = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns the non-negative elapsed duration from `earlier` to `self`.
    ///
    /// Returns zero when `earlier` is not actually earlier.
    #[must_use]
    pub fn saturating_since(self, earlier: Self) -> Duration {
        let millis = self.0.saturating_sub(earlier.0);
        u64::try_from(millis).map_or(Duration::ZERO, Duration::from_millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
