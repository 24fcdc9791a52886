// crates/tidepool-core/src/interfaces/mod.rs
// ============================================================================
// Module: Tidepool Interfaces
// Description: Backend-agnostic interfaces for registry, queue, engine,
// storage, and notification collaborators.
// Purpose: Define the contract surfaces used by the orchestrator runtime.
// Dependencies: crate::core, async-trait, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how Tidepool integrates with its collaborators
//! without embedding backend specifics. Registry and job stores are
//! synchronous (they are local, fast lookups); engine, object storage, and
//! notification calls perform network I/O and are async. Implementations
//! must fail closed on missing or invalid data, and handlers built on
//! these traits re-read authoritative state rather than trusting
//! enqueue-time payload snapshots.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::allowlist::CidrRule;
use crate::core::allowlist::RuleBinding;
use crate::core::allowlist::WhitelistRule;
use crate::core::identifiers::BackupId;
use crate::core::identifiers::DatabaseName;
use crate::core::identifiers::JobId;
use crate::core::identifiers::OwnerId;
use crate::core::identifiers::ProjectId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::WhitelistRuleId;
use crate::core::job::DeadLetter;
use crate::core::job::JobPayload;
use crate::core::job::JobQueue;
use crate::core::job::JobRecord;
use crate::core::job::RetryPolicy;
use crate::core::project::BackupRecord;
use crate::core::project::TenantProject;
use crate::core::time::Timestamp;
use crate::core::usage::DatabaseUsage;
use crate::core::usage::IdleDatabase;

// ============================================================================
// SECTION: Registry Store
// ============================================================================

/// Registry store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Requested record does not exist.
    #[error("registry record not found: {0}")]
    NotFound(String),
    /// Backing store failed.
    #[error("registry storage error: {0}")]
    Storage(String),
    /// Record failed validation on read or write.
    #[error("registry invalid data: {0}")]
    Invalid(String),
    /// Stored data is corrupt or undecodable.
    #[error("registry corruption: {0}")]
    Corrupt(String),
}

/// Persistent tenant registry.
///
/// The registry supports unique lookups and atomic single-row updates; the
/// core assumes nothing else about the backing engine.
pub trait RegistryStore: Send + Sync {
    /// Creates a project row together with its seed allow-list rule.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the write fails or the id collides.
    fn create_project(&self, project: &TenantProject) -> Result<(), RegistryError>;

    /// Fetches a project by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no such project exists.
    fn project(&self, id: &ProjectId) -> Result<TenantProject, RegistryError>;

    /// Fetches a project by id, scoped to an owner.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn project_for_owner(
        &self,
        id: &ProjectId,
        owner: &OwnerId,
    ) -> Result<Option<TenantProject>, RegistryError>;

    /// Lists all projects for an owner.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn projects_by_owner(&self, owner: &OwnerId) -> Result<Vec<TenantProject>, RegistryError>;

    /// Lists projects whose role is in the given set.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn projects_by_roles(&self, roles: &[RoleName]) -> Result<Vec<TenantProject>, RegistryError>;

    /// Atomically replaces a project's inactive set and action guard.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no such project exists.
    fn update_inactive_databases(
        &self,
        id: &ProjectId,
        inactive: &BTreeSet<DatabaseName>,
        action_in_progress: bool,
    ) -> Result<(), RegistryError>;

    /// Replaces a project's sealed password envelope.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no such project exists.
    fn set_password_envelope(&self, id: &ProjectId, envelope: &str) -> Result<(), RegistryError>;

    /// Inserts an allow-list rule and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the write fails.
    fn add_whitelist_rule(
        &self,
        project_id: &ProjectId,
        database_name: &DatabaseName,
        cidr: &CidrRule,
    ) -> Result<WhitelistRule, RegistryError>;

    /// Lists allow-list rules for a project.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn whitelist_rules(&self, project_id: &ProjectId) -> Result<Vec<WhitelistRule>, RegistryError>;

    /// Removes an allow-list rule.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no such rule exists.
    fn remove_whitelist_rule(
        &self,
        project_id: &ProjectId,
        rule_id: WhitelistRuleId,
    ) -> Result<(), RegistryError>;

    /// Lists every rule (active and pending) joined with its project role,
    /// for reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn rule_bindings(&self) -> Result<Vec<RuleBinding>, RegistryError>;

    /// Marks every pending rule active after a successful reconciliation.
    ///
    /// Returns the number of rules flipped.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the write fails.
    fn mark_rules_active(&self) -> Result<u64, RegistryError>;

    /// Records a successful dump.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the write fails.
    fn record_backup(
        &self,
        project_id: &ProjectId,
        database_name: &DatabaseName,
        object_id: &str,
        created_at: Timestamp,
    ) -> Result<BackupRecord, RegistryError>;

    /// Lists a project's backup records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn backups(&self, project_id: &ProjectId) -> Result<Vec<BackupRecord>, RegistryError>;

    /// Fetches one backup record scoped to a project.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the read fails.
    fn backup(
        &self,
        project_id: &ProjectId,
        backup_id: BackupId,
    ) -> Result<Option<BackupRecord>, RegistryError>;
}

// ============================================================================
// SECTION: Job Store
// ============================================================================

/// Job queue errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backing store failed.
    #[error("queue storage error: {0}")]
    Storage(String),
    /// Job payload failed to encode or decode.
    #[error("queue payload invalid: {0}")]
    Payload(String),
    /// Referenced job does not exist.
    #[error("queue job not found: {0}")]
    NotFound(JobId),
}

/// Outcome of recording a job failure.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Job rescheduled for another attempt at the given time.
    Retried(Timestamp),
    /// Retries exhausted; job moved to the dead-letter table.
    DeadLettered,
}

/// Durable delayed-job store with at-least-once delivery.
pub trait JobStore: Send + Sync {
    /// Enqueues a job on its kind's queue, runnable at `not_before`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the write fails.
    fn enqueue(
        &self,
        payload: &JobPayload,
        not_before: Timestamp,
        now: Timestamp,
    ) -> Result<JobId, QueueError>;

    /// Claims the next due job on a queue, if any.
    ///
    /// Jobs are returned in scheduled order. A claimed job stays in the
    /// store until [`JobStore::complete`] removes it, so a crash
    /// mid-execution redelivers it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the read fails.
    fn claim_due(&self, queue: JobQueue, now: Timestamp) -> Result<Option<JobRecord>, QueueError>;

    /// Removes a job after successful execution.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the write fails.
    fn complete(&self, id: JobId) -> Result<(), QueueError>;

    /// Records a failed execution, rescheduling or dead-lettering.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the write fails.
    fn fail(
        &self,
        id: JobId,
        error: &str,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<FailureOutcome, QueueError>;

    /// Lists dead-lettered jobs for a queue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when the read fails.
    fn dead_letters(&self, queue: JobQueue) -> Result<Vec<DeadLetter>, QueueError>;
}

// ============================================================================
// SECTION: Engine Administration
// ============================================================================

/// Engine administration errors.
///
/// # Invariants
/// - `Transient` is retryable; `Provisioning` aborts the enclosing request.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connection or timeout failure; safe to retry.
    #[error("engine transient failure: {0}")]
    Transient(String),
    /// Role or database creation step failed.
    #[error("provisioning failed: {0}")]
    Provisioning(String),
    /// Statement execution failed.
    #[error("engine sql failure: {0}")]
    Sql(String),
}

/// Inputs for creating a role/database pair.
///
/// # Invariants
/// - Names are provisioner-generated and safe as SQL identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSpec {
    /// Role to create.
    pub role_name: RoleName,
    /// Plaintext password for the new role.
    pub password: String,
    /// Database to create, owned by the role.
    pub database_name: DatabaseName,
}

/// Privileged engine interface.
///
/// Read-only telemetry calls may share a pooled connection; mutating calls
/// use freshly opened, short-lived sessions that are explicitly closed.
#[async_trait]
pub trait EngineAdmin: Send + Sync {
    /// Creates a role and a database owned by it, then enables the
    /// statistics and cross-database-link extensions inside the new
    /// database.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Provisioning`] when any step fails; callers
    /// must treat the attempt as wholly failed.
    async fn create_instance(&self, spec: &ProvisionSpec) -> Result<(), EngineError>;

    /// Best-effort removal of a partially created role/database pair.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when cleanup itself cannot run.
    async fn cleanup_orphans(
        &self,
        role: &RoleName,
        database: &DatabaseName,
    ) -> Result<(), EngineError>;

    /// Lists databases owned by roles matching the pattern, with usage
    /// counters.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the catalog query fails.
    async fn list_owned_databases(
        &self,
        owner_pattern: &str,
    ) -> Result<Vec<DatabaseUsage>, EngineError>;

    /// Reports pause candidates: databases never used or idle for longer
    /// than `idle_after`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the statistics query fails.
    async fn find_idle(
        &self,
        idle_after: Duration,
        now: Timestamp,
    ) -> Result<Vec<IdleDatabase>, EngineError>;

    /// Revokes public privileges and the owner's connect right on each
    /// database, then terminates live backends. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a statement fails.
    async fn revoke_access(
        &self,
        databases: &[DatabaseName],
        owner: &RoleName,
    ) -> Result<(), EngineError>;

    /// Restores public privileges and the owner's connect right on each
    /// database. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a statement fails.
    async fn grant_access(
        &self,
        databases: &[DatabaseName],
        owner: &RoleName,
    ) -> Result<(), EngineError>;

    /// Terminates live backends connected to each database.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the terminate query fails.
    async fn terminate_connections(&self, databases: &[DatabaseName]) -> Result<(), EngineError>;

    /// Drops each database if it still exists. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a drop fails.
    async fn drop_databases(&self, databases: &[DatabaseName]) -> Result<(), EngineError>;

    /// Sets a role's password to the supplied plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the alter fails.
    async fn alter_role_password(
        &self,
        role: &RoleName,
        new_password: &str,
    ) -> Result<(), EngineError>;

    /// Asks the engine to reload its configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the reload signal fails.
    async fn reload_configuration(&self) -> Result<(), EngineError>;
}

// ============================================================================
// SECTION: Object Storage
// ============================================================================

/// Object storage errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local or network I/O failure; safe to retry.
    #[error("object storage io error: {0}")]
    Io(String),
    /// Request rejected before transfer.
    #[error("object storage invalid request: {0}")]
    Invalid(String),
    /// Backend reported a failure.
    #[error("object storage backend error: {0}")]
    Backend(String),
}

/// Durable, private object storage for backup archives.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads a local file as a private object and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the upload fails.
    async fn upload(
        &self,
        local_path: &std::path::Path,
        object_key: &str,
    ) -> Result<String, StorageError>;

    /// Produces a time-limited signed download URL for a stored object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when signing fails.
    async fn signed_download_url(
        &self,
        object_id: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notification delivery errors.
///
/// # Invariants
/// - Failures never roll back the lifecycle transition that triggered them.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery to a channel failed.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Delivery channels for lifecycle notifications.
///
/// # Invariants
/// - Variants are stable for routing and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Chat channel (for example, a linked guild channel).
    Chat,
    /// Tenant email.
    Mail,
}

/// Lifecycle event kinds delivered to tenants.
///
/// # Invariants
/// - Variants are stable for routing and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A role password was rotated.
    PasswordRotated,
    /// Databases were paused for inactivity.
    DatabasePaused,
    /// Paused databases were dropped after the grace period.
    DatabaseDeleted,
    /// A chat integration was linked.
    IntegrationLinked,
}

/// One lifecycle notification.
///
/// # Invariants
/// - `databases` lists every database the event covers; may be empty for
///   events that are not database-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Event kind.
    pub kind: NotificationKind,
    /// Channels to deliver on.
    pub channels: Vec<Channel>,
    /// Project the event concerns.
    pub project_id: ProjectId,
    /// Project display title.
    pub project_title: String,
    /// Databases the event covers.
    pub databases: Vec<DatabaseName>,
}

/// Outbound notification interface; called fire-and-forget by handlers.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one event to its channels.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when every channel fails; partial delivery
    /// is reported as success.
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}
