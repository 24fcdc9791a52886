// crates/tidepool-orchestrator/src/clock.rs
// ============================================================================
// Module: Wall Clock
// Description: The runtime's single wall-clock read point.
// Purpose: Keep core logic time-free; only the runtime reads the clock.
// Dependencies: tidepool-core
// ============================================================================

//! ## Overview
//! Core decision logic takes explicit timestamps. The runtime reads the
//! wall clock here, in one place, and threads the value through scans,
//! workers, and handlers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tidepool_core::Timestamp;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Reads the current wall-clock time as a core timestamp.
#[must_use]
pub fn wall_clock_now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
    Timestamp::from_unix_millis(millis)
}
