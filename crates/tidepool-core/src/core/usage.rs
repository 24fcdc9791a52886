// crates/tidepool-core/src/core/usage.rs
// ============================================================================
// Module: Usage Classification
// Description: Telemetry snapshots and active/idle/never-used classification.
// Purpose: Turn engine statistics into lifecycle decisions deterministically.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! The usage telemetry reader reports per-database counters from the
//! engine's statistics views. Classification itself is a pure function so
//! the idle scan can be exercised without a live engine: a database with
//! zero recorded operations is `NeverUsed` no matter how old it is, a
//! database whose statistics window started before the idle threshold is
//! `Idle`, and everything else is `Active`. Missing statistics are treated
//! as `NeverUsed` rather than failing the scan.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DatabaseName;
use crate::core::identifiers::RoleName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Usage Snapshots
// ============================================================================

/// Size, connection, and operation counters for one managed database.
///
/// # Invariants
/// - Counters are snapshots since the engine's last statistics reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUsage {
    /// Database name.
    pub name: DatabaseName,
    /// On-disk size in bytes.
    pub size_bytes: i64,
    /// Number of live backend connections.
    pub active_connections: i64,
    /// Sum of read, fetch, insert, update, and delete counters.
    pub total_operations: i64,
}

/// Statistics window observed for one database.
///
/// # Invariants
/// - `window_start` is `None` when the engine has no statistics row for the
///   database; classification treats that as never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Sum of read, fetch, insert, update, and delete counters.
    pub total_operations: i64,
    /// Start of the statistics window (last statistics reset).
    pub window_start: Option<Timestamp>,
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Lifecycle-relevant usage status for a managed database.
///
/// # Invariants
/// - Variants are stable for serialization and scan reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    /// No operations recorded since the statistics window opened.
    NeverUsed,
    /// Operations recorded, but the window is older than the idle threshold.
    Idle,
    /// Operations recorded within the idle threshold.
    Active,
}

impl UsageStatus {
    /// Returns a stable label for reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NeverUsed => "never_used",
            Self::Idle => "idle",
            Self::Active => "active",
        }
    }

    /// Returns whether databases with this status are pause candidates.
    #[must_use]
    pub const fn is_pause_candidate(self) -> bool {
        matches!(self, Self::NeverUsed | Self::Idle)
    }

    /// Classifies a statistics window against the idle threshold.
    ///
    /// Zero recorded operations always classify as [`Self::NeverUsed`],
    /// regardless of elapsed time. A missing window start also classifies
    /// as [`Self::NeverUsed`] so a single unavailable statistics row never
    /// fails a whole scan.
    #[must_use]
    pub fn classify(window: UsageWindow, now: Timestamp, idle_after: Duration) -> Self {
        if window.total_operations == 0 {
            return Self::NeverUsed;
        }
        let Some(start) = window.window_start else {
            return Self::NeverUsed;
        };
        if now.saturating_since(start) > idle_after {
            return Self::Idle;
        }
        Self::Active
    }
}

/// Idle-scan report entry for one managed database.
///
/// # Invariants
/// - `status` is never [`UsageStatus::Active`]; active databases are not reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleDatabase {
    /// Database name.
    pub database: DatabaseName,
    /// Role that owns the database.
    pub owner_role: RoleName,
    /// Classification that made the database a pause candidate.
    pub status: UsageStatus,
}
