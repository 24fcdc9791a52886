// crates/tidepool-pg/src/provisioner.rs
// ============================================================================
// Module: Instance Provisioner
// Description: Role/database creation with registry write and job seeding.
// Purpose: Stand up a complete tenant instance or fail without tenant-visible
// leftovers.
// Dependencies: rand, tidepool-core, tidepool-vault, crate::credentials
// ============================================================================

//! ## Overview
//! Provisioning derives names, generates a password, creates the role and
//! database with the required extensions in one administrative pass, and
//! only then writes the registry row (sealing the password through the
//! vault) and schedules the first rotation and backup jobs. A failure in
//! any engine step aborts the attempt with a single provisioning error;
//! role and database creation are not transactional in the engine, so the
//! provisioner runs a best-effort orphan cleanup before reporting failure
//! and re-runs it as a guard before a retry of the same owner/title pair.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tidepool_core::DatabaseBinding;
use tidepool_core::EngineAdmin;
use tidepool_core::EngineError;
use tidepool_core::JobPayload;
use tidepool_core::JobStore;
use tidepool_core::OwnerId;
use tidepool_core::ProjectId;
use tidepool_core::ProvisionSpec;
use tidepool_core::QueueError;
use tidepool_core::RegistryError;
use tidepool_core::RegistryStore;
use tidepool_core::TenantProject;
use tidepool_core::Timestamp;
use tidepool_vault::CredentialVault;
use tidepool_vault::VaultError;

use crate::credentials::derive_role_name;
use crate::credentials::generate_database_name;
use crate::credentials::generate_password;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provisioning errors.
///
/// # Invariants
/// - Any variant means no tenant-visible instance was left addressable.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Engine-side creation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Registry write failed after engine creation.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Seeding the first rotation/backup jobs failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Sealing the generated password failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

// ============================================================================
// SECTION: Provisioner
// ============================================================================

/// Result of a successful provisioning run.
///
/// # Invariants
/// - `password` is the only plaintext copy ever surfaced; the registry
///   row holds the sealed envelope.
#[derive(Debug)]
pub struct ProvisionedProject {
    /// Created registry record.
    pub project: TenantProject,
    /// Plaintext password, returned once to the tenant.
    pub password: String,
}

/// Timing inputs for job seeding.
///
/// # Invariants
/// - Both intervals come from configuration, never call sites.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionSchedule {
    /// Delay before the first password rotation.
    pub rotation_interval: Duration,
    /// Delay before the first backup.
    pub backup_interval: Duration,
}

/// Instance provisioner.
pub struct Provisioner {
    /// Engine administrative interface.
    engine: Arc<dyn EngineAdmin>,
    /// Tenant registry.
    registry: Arc<dyn RegistryStore>,
    /// Delayed job store.
    jobs: Arc<dyn JobStore>,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// Engine host recorded in bindings.
    host: String,
    /// Engine port recorded in bindings.
    port: u16,
    /// Job seeding delays.
    schedule: ProvisionSchedule,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner").field("host", &self.host).finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Creates a provisioner.
    #[must_use]
    pub fn new(
        engine: Arc<dyn EngineAdmin>,
        registry: Arc<dyn RegistryStore>,
        jobs: Arc<dyn JobStore>,
        vault: Arc<CredentialVault>,
        host: impl Into<String>,
        port: u16,
        schedule: ProvisionSchedule,
    ) -> Self {
        Self {
            engine,
            registry,
            jobs,
            vault,
            host: host.into(),
            port,
            schedule,
        }
    }

    /// Provisions a complete tenant instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when any step fails. Engine-side
    /// leftovers are cleaned up best-effort before the error surfaces.
    pub async fn provision(
        &self,
        owner: &OwnerId,
        title: &str,
        description: &str,
        now: Timestamp,
    ) -> Result<ProvisionedProject, ProvisionError> {
        let role_name = derive_role_name(owner, title);
        let database_name = generate_database_name(title);
        let password = generate_password();

        // Guard against orphans from a previously failed attempt with the
        // same derived role before creating anything new.
        self.engine.cleanup_orphans(&role_name, &database_name).await?;

        let spec = ProvisionSpec {
            role_name: role_name.clone(),
            password: password.clone(),
            database_name: database_name.clone(),
        };
        if let Err(err) = self.engine.create_instance(&spec).await {
            let _ = self.engine.cleanup_orphans(&role_name, &database_name).await;
            return Err(err.into());
        }

        let envelope = self.vault.encrypt(&password)?;
        let project = TenantProject {
            id: generate_project_id(),
            owner_id: owner.clone(),
            title: title.to_string(),
            description: description.to_string(),
            binding: DatabaseBinding {
                role_name,
                database_name,
                host: self.host.clone(),
                port: self.port,
                password_envelope: envelope,
                schema_name: None,
            },
            inactive_databases: std::collections::BTreeSet::new(),
            action_in_progress: false,
            created_at: now,
        };
        if let Err(err) = self.registry.create_project(&project) {
            let _ = self
                .engine
                .cleanup_orphans(&project.binding.role_name, &project.binding.database_name)
                .await;
            return Err(err.into());
        }

        self.jobs.enqueue(
            &JobPayload::RotatePassword {
                project_id: project.id.clone(),
            },
            now.saturating_add(self.schedule.rotation_interval),
            now,
        )?;
        self.jobs.enqueue(
            &JobPayload::DatabaseBackup {
                project_id: project.id.clone(),
                database_name: project.binding.database_name.clone(),
            },
            now.saturating_add(self.schedule.backup_interval),
            now,
        )?;

        Ok(ProvisionedProject {
            project,
            password,
        })
    }
}

/// Generates an opaque project identifier.
fn generate_project_id() -> ProjectId {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    let mut id = String::with_capacity(2 + bytes.len() * 2);
    id.push_str("p_");
    for byte in bytes {
        id.push_str(&format!("{byte:02x}"));
    }
    ProjectId::new(id)
}
