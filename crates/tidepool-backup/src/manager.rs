// crates/tidepool-backup/src/manager.rs
// ============================================================================
// Module: Backup Manager
// Description: Dump, compress, upload, record; signed download resolution.
// Purpose: Drive one backup end to end with unconditional scratch cleanup.
// Dependencies: async-trait, flate2, tempfile, thiserror, tidepool-core,
// tidepool-vault, tokio
// ============================================================================

//! ## Overview
//! One backup run dumps the tenant database with `pg_dump` (authenticated
//! as the tenant role with a vault-opened password), gzips the dump in
//! scratch space, uploads the archive, and records the object in the
//! registry. Scratch files live in a temp directory that is removed when
//! the run ends, success or failure. The signed-download path re-reads
//! the backup record scoped to the owning project and never returns raw
//! credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;
use tidepool_core::BackupId;
use tidepool_core::BackupRecord;
use tidepool_core::DatabaseName;
use tidepool_core::ObjectStore;
use tidepool_core::ProjectId;
use tidepool_core::RegistryError;
use tidepool_core::RegistryStore;
use tidepool_core::StorageError;
use tidepool_core::TenantProject;
use tidepool_core::Timestamp;
use tidepool_vault::CredentialVault;
use tidepool_vault::VaultError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backup pipeline errors.
///
/// # Invariants
/// - Variants are stable for retry classification; dump and storage
///   failures are retryable by the job orchestrator.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The dump utility failed or was unavailable.
    #[error("dump failed: {0}")]
    Dump(String),
    /// Local scratch I/O failed.
    #[error("backup io error: {0}")]
    Io(String),
    /// Upload or signing failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Registry read/write failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Opening the credential envelope failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

// ============================================================================
// SECTION: Object Keys
// ============================================================================

/// Builds the object key for one archive.
#[must_use]
pub fn object_key(
    prefix: Option<&str>,
    project_id: &ProjectId,
    database: &DatabaseName,
    created_at: Timestamp,
) -> String {
    let prefix = prefix.map_or(String::new(), |prefix| {
        let trimmed = prefix.trim_matches('/');
        if trimmed.is_empty() { String::new() } else { format!("{trimmed}/") }
    });
    format!(
        "{prefix}{}/{}/{}.sql.gz",
        project_id.as_str(),
        database.as_str(),
        created_at.as_unix_millis()
    )
}

// ============================================================================
// SECTION: Backup Runner Interface
// ============================================================================

/// Backup execution seam consumed by the job orchestrator.
#[async_trait]
pub trait BackupRunner: Send + Sync {
    /// Dumps one database and returns the stored object id.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when any stage fails.
    async fn run_backup(
        &self,
        project: &TenantProject,
        database: &DatabaseName,
        now: Timestamp,
    ) -> Result<BackupRecord, BackupError>;
}

// ============================================================================
// SECTION: Backup Manager
// ============================================================================

/// End-to-end backup pipeline.
pub struct BackupManager {
    /// Tenant registry for backup records.
    registry: Arc<dyn RegistryStore>,
    /// Archive storage.
    storage: Arc<dyn ObjectStore>,
    /// Credential vault for tenant passwords.
    vault: Arc<CredentialVault>,
    /// Optional object key prefix.
    prefix: Option<String>,
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager").finish_non_exhaustive()
    }
}

impl BackupManager {
    /// Creates a backup manager.
    #[must_use]
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        storage: Arc<dyn ObjectStore>,
        vault: Arc<CredentialVault>,
        prefix: Option<String>,
    ) -> Self {
        Self {
            registry,
            storage,
            vault,
            prefix,
        }
    }

    /// Resolves a signed download URL for a recorded backup.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Registry`] when the record does not belong
    /// to the project, or [`BackupError::Storage`] when signing fails.
    pub async fn signed_download_url(
        &self,
        project_id: &ProjectId,
        backup_id: BackupId,
        ttl: Duration,
    ) -> Result<String, BackupError> {
        let record = self
            .registry
            .backup(project_id, backup_id)?
            .ok_or_else(|| RegistryError::NotFound(format!("backup {backup_id}")))?;
        Ok(self.storage.signed_download_url(&record.object_id, ttl).await?)
    }

    /// Runs the dump utility into `dump_path`.
    async fn run_dump(
        project: &TenantProject,
        database: &DatabaseName,
        password: &str,
        dump_path: &Path,
    ) -> Result<(), BackupError> {
        let output = tokio::process::Command::new("pg_dump")
            .arg("--host")
            .arg(&project.binding.host)
            .arg("--port")
            .arg(project.binding.port.to_string())
            .arg("--username")
            .arg(project.binding.role_name.as_str())
            .arg("--dbname")
            .arg(database.as_str())
            .arg("--format=plain")
            .arg("--no-owner")
            .arg("--file")
            .arg(dump_path)
            .env("PGPASSWORD", password)
            .output()
            .await
            .map_err(|err| BackupError::Dump(err.to_string()))?;
        if !output.status.success() {
            return Err(BackupError::Dump(String::from_utf8_lossy(&output.stderr).to_string()));
        }
        Ok(())
    }

    /// Gzips the dump file next to it and returns the archive path.
    fn compress(dump_path: &Path) -> Result<std::path::PathBuf, BackupError> {
        let archive_path = dump_path.with_extension("sql.gz");
        let mut input =
            std::fs::File::open(dump_path).map_err(|err| BackupError::Io(err.to_string()))?;
        let output =
            std::fs::File::create(&archive_path).map_err(|err| BackupError::Io(err.to_string()))?;
        let mut encoder = GzEncoder::new(output, Compression::default());
        std::io::copy(&mut input, &mut encoder)
            .map_err(|err| BackupError::Io(err.to_string()))?;
        let mut archive =
            encoder.finish().map_err(|err| BackupError::Io(err.to_string()))?;
        archive.flush().map_err(|err| BackupError::Io(err.to_string()))?;
        Ok(archive_path)
    }
}

#[async_trait]
impl BackupRunner for BackupManager {
    async fn run_backup(
        &self,
        project: &TenantProject,
        database: &DatabaseName,
        now: Timestamp,
    ) -> Result<BackupRecord, BackupError> {
        let password = self.vault.decrypt(&project.binding.password_envelope)?;
        // The scratch directory is removed on drop, so local files never
        // outlive the run regardless of outcome.
        let scratch = tempfile::Builder::new()
            .prefix("tidepool-dump-")
            .tempdir()
            .map_err(|err| BackupError::Io(err.to_string()))?;
        let dump_path = scratch.path().join(format!("{}.sql", database.as_str()));

        Self::run_dump(project, database, &password, &dump_path).await?;
        let archive_path = Self::compress(&dump_path)?;

        let key = object_key(self.prefix.as_deref(), &project.id, database, now);
        let object_id = self.storage.upload(&archive_path, &key).await?;
        let record = self.registry.record_backup(&project.id, database, &object_id, now)?;
        Ok(record)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
