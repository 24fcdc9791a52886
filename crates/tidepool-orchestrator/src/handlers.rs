// crates/tidepool-orchestrator/src/handlers.rs
// ============================================================================
// Module: Lifecycle Job Handlers
// Description: Pause, delete, rotate, and backup job execution.
// Purpose: Converge to the same end state under at-least-once delivery.
// Dependencies: tidepool-backup, tidepool-core, tidepool-pg, tidepool-vault
// ============================================================================

//! ## Overview
//! Every handler starts by re-fetching the authoritative project row;
//! payload fields beyond the project id are treated as hints. The delete
//! handler in particular decides from the re-read inactive set, which is
//! how a tenant resume during the grace window turns the eventual delete
//! into a no-op. Engine operations are idempotent (revokes, drops with
//! existence checks), so a crash between an engine call and the registry
//! write converges on replay. Notification failures are recorded and
//! swallowed; they never fail the job.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tidepool_backup::BackupError;
use tidepool_backup::BackupRunner;
use tidepool_core::Channel;
use tidepool_core::DatabaseName;
use tidepool_core::EngineAdmin;
use tidepool_core::EngineError;
use tidepool_core::JobPayload;
use tidepool_core::JobStore;
use tidepool_core::NotificationEvent;
use tidepool_core::NotificationKind;
use tidepool_core::Notifier;
use tidepool_core::ProjectId;
use tidepool_core::QueueError;
use tidepool_core::RegistryError;
use tidepool_core::RegistryStore;
use tidepool_core::Timestamp;
use tidepool_pg::generate_password;
use tidepool_vault::CredentialVault;
use tidepool_vault::VaultError;

use crate::telemetry::OrchestratorEvent;
use crate::telemetry::TelemetrySink;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Handler execution errors; the worker converts these into retries.
///
/// # Invariants
/// - Variants are stable for retry diagnostics.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Registry read/write failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Follow-up job scheduling failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Credential sealing failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
    /// Backup pipeline failed.
    #[error(transparent)]
    Backup(#[from] BackupError),
}

// ============================================================================
// SECTION: Intervals
// ============================================================================

/// Interval constants consumed by handlers.
///
/// # Invariants
/// - Values come from configuration, never call sites.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleIntervals {
    /// Grace period between pause and deletion.
    pub delete_grace: Duration,
    /// Period between password rotations.
    pub rotation_interval: Duration,
    /// Period between scheduled backups.
    pub backup_interval: Duration,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Job handler set with its collaborator handles.
pub struct JobHandlers {
    /// Tenant registry.
    registry: Arc<dyn RegistryStore>,
    /// Delayed job store.
    jobs: Arc<dyn JobStore>,
    /// Engine administrative interface.
    engine: Arc<dyn EngineAdmin>,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// Outbound notifier.
    notifier: Arc<dyn Notifier>,
    /// Backup pipeline.
    backup: Arc<dyn BackupRunner>,
    /// Telemetry sink.
    telemetry: Arc<dyn TelemetrySink>,
    /// Interval constants.
    intervals: LifecycleIntervals,
}

impl std::fmt::Debug for JobHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandlers").field("intervals", &self.intervals).finish_non_exhaustive()
    }
}

impl JobHandlers {
    /// Creates the handler set.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "One handle per collaborator seam.")]
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        jobs: Arc<dyn JobStore>,
        engine: Arc<dyn EngineAdmin>,
        vault: Arc<CredentialVault>,
        notifier: Arc<dyn Notifier>,
        backup: Arc<dyn BackupRunner>,
        telemetry: Arc<dyn TelemetrySink>,
        intervals: LifecycleIntervals,
    ) -> Self {
        Self {
            registry,
            jobs,
            engine,
            vault,
            notifier,
            backup,
            telemetry,
            intervals,
        }
    }

    /// Dispatches one payload to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when execution fails; the worker applies
    /// the retry policy.
    pub async fn handle(&self, payload: &JobPayload, now: Timestamp) -> Result<(), HandlerError> {
        match payload {
            JobPayload::PauseDbConnection {
                project_id,
                newly_inactive,
                ..
            } => self.handle_pause(project_id, newly_inactive, now).await,
            JobPayload::DeleteDatabase {
                project_id,
            } => self.handle_delete(project_id, now).await,
            JobPayload::RotatePassword {
                project_id,
            } => self.handle_rotate(project_id, now).await,
            JobPayload::DatabaseBackup {
                project_id,
                database_name,
            } => self.handle_backup(project_id, database_name, now).await,
        }
    }

    /// Pauses newly idle databases: revoke, merge, notify, schedule delete.
    async fn handle_pause(
        &self,
        project_id: &ProjectId,
        newly_inactive: &[DatabaseName],
        now: Timestamp,
    ) -> Result<(), HandlerError> {
        if newly_inactive.is_empty() {
            return Ok(());
        }
        let project = self.registry.project(project_id)?;
        self.engine.revoke_access(newly_inactive, &project.binding.role_name).await?;

        // Set-union keeps a replay from double-counting databases.
        let mut merged = project.inactive_databases.clone();
        merged.extend(newly_inactive.iter().cloned());
        self.registry.update_inactive_databases(project_id, &merged, false)?;

        self.notify(NotificationEvent {
            kind: NotificationKind::DatabasePaused,
            channels: vec![Channel::Chat, Channel::Mail],
            project_id: project.id.clone(),
            project_title: project.title.clone(),
            databases: merged.iter().cloned().collect(),
        })
        .await;

        self.jobs.enqueue(
            &JobPayload::DeleteDatabase {
                project_id: project_id.clone(),
            },
            now.saturating_add(self.intervals.delete_grace),
            now,
        )?;
        Ok(())
    }

    /// Drops whatever is still paused; a resumed project makes this a no-op.
    async fn handle_delete(
        &self,
        project_id: &ProjectId,
        _now: Timestamp,
    ) -> Result<(), HandlerError> {
        let project = self.registry.project(project_id)?;
        if project.inactive_databases.is_empty() {
            // Tenant resumed during the grace window; nothing to drop and
            // no engine writes are performed.
            self.telemetry.record(&OrchestratorEvent::DeleteSkipped {
                project: project_id.to_string(),
            });
            return Ok(());
        }
        let names: Vec<DatabaseName> = project.inactive_databases.iter().cloned().collect();
        self.engine.terminate_connections(&names).await?;
        self.engine.drop_databases(&names).await?;
        self.registry.update_inactive_databases(
            project_id,
            &std::collections::BTreeSet::new(),
            false,
        )?;

        self.notify(NotificationEvent {
            kind: NotificationKind::DatabaseDeleted,
            channels: vec![Channel::Chat, Channel::Mail],
            project_id: project.id.clone(),
            project_title: project.title.clone(),
            databases: names,
        })
        .await;
        Ok(())
    }

    /// Rotates the role password and reseeds the next rotation.
    async fn handle_rotate(
        &self,
        project_id: &ProjectId,
        now: Timestamp,
    ) -> Result<(), HandlerError> {
        let project = self.registry.project(project_id)?;
        // Fresh entropy every time; never derived from the old value.
        let new_password = generate_password();
        self.engine
            .alter_role_password(&project.binding.role_name, &new_password)
            .await?;
        let envelope = self.vault.encrypt(&new_password)?;
        self.registry.set_password_envelope(project_id, &envelope)?;

        self.jobs.enqueue(
            &JobPayload::RotatePassword {
                project_id: project_id.clone(),
            },
            now.saturating_add(self.intervals.rotation_interval),
            now,
        )?;

        self.notify(NotificationEvent {
            kind: NotificationKind::PasswordRotated,
            channels: vec![Channel::Chat],
            project_id: project.id.clone(),
            project_title: project.title.clone(),
            databases: Vec::new(),
        })
        .await;
        Ok(())
    }

    /// Runs one backup and reseeds the next one.
    async fn handle_backup(
        &self,
        project_id: &ProjectId,
        database: &DatabaseName,
        now: Timestamp,
    ) -> Result<(), HandlerError> {
        let project = self.registry.project(project_id)?;
        if project.is_inactive(database) {
            // A paused database rejects tenant connections; dump again
            // once it is resumed.
            self.telemetry.record(&OrchestratorEvent::BackupSkipped {
                project: project_id.to_string(),
                database: database.to_string(),
            });
        } else {
            self.backup.run_backup(&project, database, now).await?;
        }
        self.jobs.enqueue(
            &JobPayload::DatabaseBackup {
                project_id: project_id.clone(),
                database_name: database.clone(),
            },
            now.saturating_add(self.intervals.backup_interval),
            now,
        )?;
        Ok(())
    }

    /// Fire-and-forget notification; total failure is recorded, not raised.
    async fn notify(&self, event: NotificationEvent) {
        let kind = event.kind;
        if let Err(err) = self.notifier.notify(&event).await {
            self.telemetry.record(&OrchestratorEvent::NotifyFailed {
                kind: kind_label(kind),
                error: err.to_string(),
            });
        }
    }
}

/// Returns a stable label for a notification kind.
const fn kind_label(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::PasswordRotated => "password_rotated",
        NotificationKind::DatabasePaused => "database_paused",
        NotificationKind::DatabaseDeleted => "database_deleted",
        NotificationKind::IntegrationLinked => "integration_linked",
    }
}
