// crates/tidepool-orchestrator/src/dirty.rs
// ============================================================================
// Module: Reconciliation Dirty Flag
// Description: Atomically checked-and-cleared reconciliation trigger.
// Purpose: Coalesce allow-list mutations into one pending reconciliation.
// Dependencies: std::sync::atomic
// ============================================================================

//! ## Overview
//! Any allow-list mutation marks the flag; the reconciliation scan
//! consumes it with an atomic swap, so a mutation arriving mid-pass
//! simply leaves the flag set again and triggers another pass. The flag
//! starts dirty so the first pass after startup always reconciles,
//! covering rules written while the process was down.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

// ============================================================================
// SECTION: Dirty Flag
// ============================================================================

/// Process-wide reconciliation trigger.
///
/// # Invariants
/// - `take` observes and clears the flag in one atomic step.
#[derive(Debug)]
pub struct DirtyFlag {
    /// Pending-reconciliation marker.
    flag: AtomicBool,
}

impl Default for DirtyFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyFlag {
    /// Creates a flag that starts dirty.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(true),
        }
    }

    /// Marks the configuration out of sync.
    pub fn mark(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Atomically consumes the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    /// Returns whether the flag is currently set.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
