// crates/tidepool-config/src/lib.rs
// ============================================================================
// Module: Tidepool Configuration
// Description: TOML configuration model, load guards, and validation.
// Purpose: Give every interval, endpoint, and secret a single declared home.
// Dependencies: serde, thiserror, tidepool-vault, toml
// ============================================================================

//! ## Overview
//! All tunables the orchestrator consumes live here: the engine admin
//! endpoint, the durable store path, object storage coordinates, the
//! vault key, and every lifecycle interval (idle threshold, delete grace,
//! rotation and backup periods, scan intervals). Intervals are expressed
//! as durations through accessors, never hard-coded at call sites.
//! Loading is strict: path-length, file-size, and UTF-8 guards run before
//! parsing, validation runs after, and a missing or malformed vault key
//! is a fatal load error rather than a runtime condition.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tidepool_vault::KEY_LEN;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is supplied.
pub const DEFAULT_CONFIG_PATH: &str = "tidepool.toml";
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum config file size in bytes.
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;
/// Environment variable overriding the vault key in the file.
pub const VAULT_KEY_ENV: &str = "TIDEPOOL_VAULT_KEY";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for startup diagnostics.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config path exceeds the maximum length.
    #[error("config path exceeds max length: {0} bytes")]
    PathTooLong(usize),
    /// A path component exceeds the maximum length.
    #[error("config path component too long: {0} bytes")]
    PathComponentTooLong(usize),
    /// Config file exceeds the size limit.
    #[error("config file exceeds size limit: {0} bytes")]
    FileTooLarge(u64),
    /// Config file is not valid UTF-8.
    #[error("config file must be utf-8")]
    NotUtf8,
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file failed to parse.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A config value failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Engine administrative endpoint.
///
/// # Invariants
/// - `admin_user` and `admin_password` must be non-empty.
/// - `hba_file_path` points at the engine's host-based auth file.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Engine host.
    pub host: String,
    /// Engine port.
    #[serde(default = "default_engine_port")]
    pub port: u16,
    /// Privileged role used for administration.
    pub admin_user: String,
    /// Password for the privileged role.
    pub admin_password: String,
    /// Maintenance database for administrative sessions.
    #[serde(default = "default_admin_database")]
    pub admin_database: String,
    /// Path to the engine's host-based authentication file.
    pub hba_file_path: String,
}

/// Credential vault key material.
///
/// # Invariants
/// - `key_hex` decodes to exactly 32 bytes; [`VAULT_KEY_ENV`] overrides it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VaultConfig {
    /// Hex-encoded 32-byte key.
    #[serde(default)]
    pub key_hex: Option<String>,
}

/// Object storage coordinates for backup archives.
///
/// # Invariants
/// - `bucket` must be non-empty.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket name.
    pub bucket: String,
    /// Region (optional; falls back to environment configuration).
    #[serde(default)]
    pub region: Option<String>,
    /// Optional key prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Custom endpoint URL (for S3-compatible stores).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Force path-style addressing (for S3-compatible stores).
    #[serde(default)]
    pub force_path_style: bool,
    /// Signed download URL lifetime in seconds.
    #[serde(default = "default_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
}

/// Durable registry and queue store settings.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Path to the store database file.
    pub path: String,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Lifecycle interval settings, in days.
///
/// # Invariants
/// - All values must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Days without activity before a database is idle.
    #[serde(default = "default_idle_threshold_days")]
    pub idle_threshold_days: u32,
    /// Grace days between pause and deletion.
    #[serde(default = "default_delete_grace_days")]
    pub delete_grace_days: u32,
    /// Days between password rotations.
    #[serde(default = "default_rotation_interval_days")]
    pub rotation_interval_days: u32,
    /// Days between scheduled backups.
    #[serde(default = "default_backup_interval_days")]
    pub backup_interval_days: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            idle_threshold_days: default_idle_threshold_days(),
            delete_grace_days: default_delete_grace_days(),
            rotation_interval_days: default_rotation_interval_days(),
            backup_interval_days: default_backup_interval_days(),
        }
    }
}

/// Scanner and worker cadence settings.
///
/// # Invariants
/// - All values must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between idle-detection scans.
    #[serde(default = "default_idle_scan_interval_secs")]
    pub idle_scan_interval_secs: u64,
    /// Seconds between access-control reconciliation runs.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Milliseconds between queue polls when a queue is drained.
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_scan_interval_secs: default_idle_scan_interval_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            worker_poll_interval_ms: default_worker_poll_interval_ms(),
        }
    }
}

/// Queue retry settings.
///
/// # Invariants
/// - `max_attempts` must be at least 1.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Executions allowed before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay in seconds; doubles per failed attempt.
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
        }
    }
}

/// Host-based authentication settings the reconciler writes.
///
/// # Invariants
/// - `platform_cidr` must be a valid CIDR literal.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessControlConfig {
    /// Network the platform's own services connect from.
    #[serde(default = "default_platform_cidr")]
    pub platform_cidr: String,
    /// Authentication method written into generated rules.
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            platform_cidr: default_platform_cidr(),
            auth_method: default_auth_method(),
        }
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default engine port.
const fn default_engine_port() -> u16 {
    5432
}

/// Returns the default maintenance database.
fn default_admin_database() -> String {
    "postgres".to_string()
}

/// Returns the default signed URL lifetime in seconds.
const fn default_signed_url_ttl_secs() -> u64 {
    300
}

/// Returns the default store busy timeout in milliseconds.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Returns the default idle threshold in days.
const fn default_idle_threshold_days() -> u32 {
    30
}

/// Returns the default pause-to-delete grace in days.
const fn default_delete_grace_days() -> u32 {
    7
}

/// Returns the default rotation interval in days.
const fn default_rotation_interval_days() -> u32 {
    30
}

/// Returns the default backup interval in days.
const fn default_backup_interval_days() -> u32 {
    7
}

/// Returns the default idle scan cadence in seconds.
const fn default_idle_scan_interval_secs() -> u64 {
    60
}

/// Returns the default reconciliation cadence in seconds.
const fn default_reconcile_interval_secs() -> u64 {
    60
}

/// Returns the default queue poll cadence in milliseconds.
const fn default_worker_poll_interval_ms() -> u64 {
    500
}

/// Returns the default retry attempt cap.
const fn default_max_attempts() -> u32 {
    3
}

/// Returns the default retry base delay in seconds.
const fn default_retry_base_delay_secs() -> u64 {
    30
}

/// Returns the default platform network CIDR.
fn default_platform_cidr() -> String {
    "10.0.0.0/8".to_string()
}

/// Returns the default authentication method.
fn default_auth_method() -> String {
    "scram-sha-256".to_string()
}

// ============================================================================
// SECTION: Top-Level Config
// ============================================================================

/// Complete Tidepool configuration.
///
/// # Invariants
/// - Validated on load; accessors may assume validated values.
#[derive(Debug, Clone, Deserialize)]
pub struct TidepoolConfig {
    /// Engine administrative endpoint.
    pub database: DatabaseConfig,
    /// Credential vault key.
    #[serde(default)]
    pub vault: VaultConfig,
    /// Object storage for backups.
    pub storage: StorageConfig,
    /// Durable registry and queue store.
    pub registry: RegistryConfig,
    /// Lifecycle intervals.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Scanner and worker cadence.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Queue retry settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Host-based authentication settings.
    #[serde(default)]
    pub access_control: AccessControlConfig,
}

impl TidepoolConfig {
    /// Loads and validates a configuration file.
    ///
    /// With no explicit path, [`DEFAULT_CONFIG_PATH`] in the working
    /// directory is used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on guard, parse, or validation failure.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        validate_path(path)?;
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::FileTooLarge(metadata.len()));
        }
        let raw = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let text = String::from_utf8(raw).map_err(|_| ConfigError::NotUtf8)?;
        let config: Self =
            toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::Invalid("database.host must be set".to_string()));
        }
        if self.database.port == 0 {
            return Err(ConfigError::Invalid("database.port must be non-zero".to_string()));
        }
        if self.database.admin_user.trim().is_empty() {
            return Err(ConfigError::Invalid("database.admin_user must be set".to_string()));
        }
        if self.database.admin_password.is_empty() {
            return Err(ConfigError::Invalid("database.admin_password must be set".to_string()));
        }
        if self.database.hba_file_path.trim().is_empty() {
            return Err(ConfigError::Invalid("database.hba_file_path must be set".to_string()));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.bucket must be set".to_string()));
        }
        if self.storage.signed_url_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "storage.signed_url_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.registry.path.trim().is_empty() {
            return Err(ConfigError::Invalid("registry.path must be set".to_string()));
        }
        for (name, value) in [
            ("lifecycle.idle_threshold_days", u64::from(self.lifecycle.idle_threshold_days)),
            ("lifecycle.delete_grace_days", u64::from(self.lifecycle.delete_grace_days)),
            ("lifecycle.rotation_interval_days", u64::from(self.lifecycle.rotation_interval_days)),
            ("lifecycle.backup_interval_days", u64::from(self.lifecycle.backup_interval_days)),
            ("scheduler.idle_scan_interval_secs", self.scheduler.idle_scan_interval_secs),
            ("scheduler.reconcile_interval_secs", self.scheduler.reconcile_interval_secs),
            ("scheduler.worker_poll_interval_ms", self.scheduler.worker_poll_interval_ms),
            ("queue.max_attempts", u64::from(self.queue.max_attempts)),
            ("queue.retry_base_delay_secs", self.queue.retry_base_delay_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        self.vault_key().map(|_| ())
    }

    /// Resolves the vault key: [`VAULT_KEY_ENV`] first, then `vault.key_hex`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the key is absent, not hex,
    /// or not exactly 32 bytes.
    pub fn vault_key(&self) -> Result<[u8; KEY_LEN], ConfigError> {
        let from_env = std::env::var(VAULT_KEY_ENV).ok();
        let hex = from_env
            .as_deref()
            .or(self.vault.key_hex.as_deref())
            .ok_or_else(|| {
                ConfigError::Invalid(format!("vault key missing: set {VAULT_KEY_ENV} or vault.key_hex"))
            })?;
        decode_key_hex(hex)
    }

    /// Returns the idle threshold as a duration.
    #[must_use]
    pub const fn idle_threshold(&self) -> Duration {
        days(self.lifecycle.idle_threshold_days)
    }

    /// Returns the pause-to-delete grace as a duration.
    #[must_use]
    pub const fn delete_grace(&self) -> Duration {
        days(self.lifecycle.delete_grace_days)
    }

    /// Returns the rotation interval as a duration.
    #[must_use]
    pub const fn rotation_interval(&self) -> Duration {
        days(self.lifecycle.rotation_interval_days)
    }

    /// Returns the backup interval as a duration.
    #[must_use]
    pub const fn backup_interval(&self) -> Duration {
        days(self.lifecycle.backup_interval_days)
    }

    /// Returns the idle scan cadence as a duration.
    #[must_use]
    pub const fn idle_scan_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.idle_scan_interval_secs)
    }

    /// Returns the reconciliation cadence as a duration.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.reconcile_interval_secs)
    }

    /// Returns the queue poll cadence as a duration.
    #[must_use]
    pub const fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.worker_poll_interval_ms)
    }

    /// Returns the retry base delay as a duration.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.queue.retry_base_delay_secs)
    }

    /// Returns the signed URL lifetime as a duration.
    #[must_use]
    pub const fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.signed_url_ttl_secs)
    }
}

/// Converts whole days to a duration.
const fn days(count: u32) -> Duration {
    Duration::from_secs(count as u64 * 24 * 60 * 60)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates path length guards.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let total = path.as_os_str().len();
    if total > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::PathTooLong(total));
    }
    for component in path.components() {
        let len = component.as_os_str().len();
        if len > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::PathComponentTooLong(len));
        }
    }
    Ok(())
}

/// Decodes a hex key into exactly [`KEY_LEN`] bytes.
fn decode_key_hex(hex: &str) -> Result<[u8; KEY_LEN], ConfigError> {
    let trimmed = hex.trim();
    if trimmed.len() != KEY_LEN * 2 {
        return Err(ConfigError::Invalid(format!(
            "vault key must be {} hex chars, got {}",
            KEY_LEN * 2,
            trimmed.len()
        )));
    }
    let mut key = [0u8; KEY_LEN];
    for (index, chunk) in trimmed.as_bytes().chunks_exact(2).enumerate() {
        let text = std::str::from_utf8(chunk)
            .map_err(|_| ConfigError::Invalid("vault key must be hex".to_string()))?;
        key[index] = u8::from_str_radix(text, 16)
            .map_err(|_| ConfigError::Invalid("vault key must be hex".to_string()))?;
    }
    Ok(key)
}
