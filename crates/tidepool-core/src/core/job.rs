// crates/tidepool-core/src/core/job.rs
// ============================================================================
// Module: Lifecycle Job Model
// Description: Queue names, job kinds, payloads, and retry policy.
// Purpose: Define the durable shapes moved through the delayed-job pipeline.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! Lifecycle work is carried by durable delayed jobs: pause and delete
//! transitions, credential rotation, and scheduled backups. Jobs are
//! delivered at least once, so payloads carry enqueue-time context only as
//! a hint; every handler re-reads authoritative registry state before
//! mutating anything. Exhausted jobs move to a dead-letter table with
//! their full payload rather than being dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DatabaseName;
use crate::core::identifiers::JobId;
use crate::core::identifiers::ProjectId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Queues
// ============================================================================

/// Job queue identity. One worker drains each queue serially; queues run
/// concurrently with respect to each other, and no ordering holds across
/// them.
///
/// # Invariants
/// - Variants are stable for persistence and worker routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobQueue {
    /// Pause and delete transitions.
    Lifecycle,
    /// Credential rotation and scheduled backups.
    Maintenance,
}

impl JobQueue {
    /// Returns a stable label for persistence and telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::Maintenance => "maintenance",
        }
    }

    /// Parses a persisted queue label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "lifecycle" => Some(Self::Lifecycle),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// All queues, in worker start order.
    pub const ALL: [Self; 2] = [Self::Lifecycle, Self::Maintenance];
}

// ============================================================================
// SECTION: Job Kinds and Payloads
// ============================================================================

/// Lifecycle job kinds.
///
/// # Invariants
/// - Variants are stable for persistence and dead-letter inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Rotate a project's role password.
    RotatePassword,
    /// Revoke access to newly idle databases and pause them.
    PauseDbConnection,
    /// Drop databases whose pause grace period elapsed.
    DeleteDatabase,
    /// Dump a database and upload the archive to object storage.
    DatabaseBackup,
}

impl JobKind {
    /// Returns a stable label for persistence and telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RotatePassword => "rotate_password",
            Self::PauseDbConnection => "pause_db_connection",
            Self::DeleteDatabase => "delete_database",
            Self::DatabaseBackup => "database_backup",
        }
    }

    /// Returns the queue this kind is routed to.
    #[must_use]
    pub const fn queue(self) -> JobQueue {
        match self {
            Self::PauseDbConnection | Self::DeleteDatabase => JobQueue::Lifecycle,
            Self::RotatePassword | Self::DatabaseBackup => JobQueue::Maintenance,
        }
    }
}

/// Job payload, tagged by kind.
///
/// # Invariants
/// - Payload fields are enqueue-time snapshots; handlers re-read registry
///   state where correctness depends on freshness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Rotate the project's role password.
    RotatePassword {
        /// Target project.
        project_id: ProjectId,
    },
    /// Pause the listed databases for the project.
    PauseDbConnection {
        /// Target project.
        project_id: ProjectId,
        /// Databases that became idle in the triggering scan.
        newly_inactive: Vec<DatabaseName>,
        /// Databases already paused when the scan ran.
        previously_inactive: Vec<DatabaseName>,
    },
    /// Drop whatever databases are still paused for the project.
    DeleteDatabase {
        /// Target project.
        project_id: ProjectId,
    },
    /// Dump and upload one database.
    DatabaseBackup {
        /// Target project.
        project_id: ProjectId,
        /// Database to dump.
        database_name: DatabaseName,
    },
}

impl JobPayload {
    /// Returns the kind tag for this payload.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::RotatePassword { .. } => JobKind::RotatePassword,
            Self::PauseDbConnection { .. } => JobKind::PauseDbConnection,
            Self::DeleteDatabase { .. } => JobKind::DeleteDatabase,
            Self::DatabaseBackup { .. } => JobKind::DatabaseBackup,
        }
    }

    /// Returns the project the job targets.
    #[must_use]
    pub const fn project_id(&self) -> &ProjectId {
        match self {
            Self::RotatePassword { project_id }
            | Self::PauseDbConnection { project_id, .. }
            | Self::DeleteDatabase { project_id }
            | Self::DatabaseBackup { project_id, .. } => project_id,
        }
    }
}

// ============================================================================
// SECTION: Job Records
// ============================================================================

/// Durable queue entry.
///
/// # Invariants
/// - `attempts` counts completed executions that failed; a freshly enqueued
///   job has zero attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job identifier.
    pub id: JobId,
    /// Queue the job is routed to.
    pub queue: JobQueue,
    /// Payload, tagged by kind.
    pub payload: JobPayload,
    /// Earliest execution time.
    pub not_before: Timestamp,
    /// Failed execution count.
    pub attempts: u32,
    /// Enqueue time.
    pub created_at: Timestamp,
}

/// Exhausted job surfaced for operator attention.
///
/// # Invariants
/// - Carries the full payload; no job is silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Original job identifier.
    pub id: JobId,
    /// Queue the job was routed to.
    pub queue: JobQueue,
    /// Payload at enqueue time.
    pub payload: JobPayload,
    /// Failed execution count at dead-letter time.
    pub attempts: u32,
    /// Time of the final failure.
    pub failed_at: Timestamp,
    /// Message from the final failure.
    pub last_error: String,
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Per-queue retry policy with exponential backoff.
///
/// # Invariants
/// - `max_attempts` is at least 1; a policy that never executes is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Executions allowed before dead-lettering.
    pub max_attempts: u32,
    /// Base retry delay; doubles per failed attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Returns the delay before the next attempt after `attempts` failures.
    #[must_use]
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Returns whether a job with `attempts` failures is exhausted.
    #[must_use]
    pub const fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}
