// crates/tidepool-core/src/core/project.rs
// ============================================================================
// Module: Tenant Registry Records
// Description: Tenant project, database binding, and backup record types.
// Purpose: Define the persistent shapes mutated by lifecycle transitions.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A tenant project maps one platform user to one engine role and the
//! databases that role owns. Lifecycle transitions mutate only two fields:
//! the set of paused database names and the in-progress guard that keeps
//! overlapping lifecycle jobs from being scheduled. The encrypted password
//! envelope is opaque here; only the credential vault can open it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::BackupId;
use crate::core::identifiers::DatabaseName;
use crate::core::identifiers::OwnerId;
use crate::core::identifiers::ProjectId;
use crate::core::identifiers::RoleName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Database Binding
// ============================================================================

/// Engine binding assigned to a project at provisioning time.
///
/// # Invariants
/// - A project has at most one live role/database pair per creation event.
/// - `password_envelope` is a sealed vault envelope, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseBinding {
    /// Role that owns the project's databases.
    pub role_name: RoleName,
    /// Database created at provisioning time.
    pub database_name: DatabaseName,
    /// Engine host.
    pub host: String,
    /// Engine port.
    pub port: u16,
    /// Encrypted role password (vault envelope).
    pub password_envelope: String,
    /// Optional schema name when the tenant scopes to a schema.
    pub schema_name: Option<String>,
}

// ============================================================================
// SECTION: Tenant Project
// ============================================================================

/// Persistent record for one tenant project.
///
/// # Invariants
/// - `inactive_databases` is always a subset of the databases owned by the
///   project's role.
/// - `action_in_progress` guards against overlapping lifecycle jobs; it is
///   set when a pause job is enqueued and cleared by the executing handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantProject {
    /// Project identifier.
    pub id: ProjectId,
    /// Owning platform user.
    pub owner_id: OwnerId,
    /// Display title.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Engine binding.
    pub binding: DatabaseBinding,
    /// Names of currently paused databases.
    pub inactive_databases: BTreeSet<DatabaseName>,
    /// Lifecycle job overlap guard.
    pub action_in_progress: bool,
    /// Creation time.
    pub created_at: Timestamp,
}

impl TenantProject {
    /// Merges newly paused database names into the inactive set.
    ///
    /// Re-applying the same names is a no-op, which keeps the pause handler
    /// idempotent under at-least-once delivery.
    pub fn merge_inactive(&mut self, names: impl IntoIterator<Item = DatabaseName>) {
        self.inactive_databases.extend(names);
    }

    /// Clears the inactive set, returning the names that were paused.
    pub fn take_inactive(&mut self) -> BTreeSet<DatabaseName> {
        std::mem::take(&mut self.inactive_databases)
    }

    /// Returns whether the named database is currently paused.
    #[must_use]
    pub fn is_inactive(&self, name: &DatabaseName) -> bool {
        self.inactive_databases.contains(name)
    }
}

// ============================================================================
// SECTION: Backup Records
// ============================================================================

/// Record of one successful database dump.
///
/// # Invariants
/// - One record per successful dump; the referenced object is immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Backup identifier.
    pub id: BackupId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Database the dump was taken from.
    pub database_name: DatabaseName,
    /// Object storage identifier for the uploaded archive.
    pub object_id: String,
    /// Dump creation time.
    pub created_at: Timestamp,
}
