// crates/tidepool-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Registry and Queue Store
// Description: Durable RegistryStore + JobStore implementation on SQLite WAL.
// Purpose: Persist tenant rows and delayed jobs with fail-closed decoding.
// Dependencies: rusqlite, serde_json, thiserror, tidepool-core
// ============================================================================

//! ## Overview
//! This module implements the registry and queue interfaces from
//! `tidepool-core` on a single `SQLite` database. Rows decode strictly:
//! an unknown queue label or undecodable payload surfaces as corruption,
//! never as a silently skipped record. Job completion deletes the row;
//! failure either reschedules it with exponential backoff or moves it to
//! the dead-letter table with its full payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;
use tidepool_core::BackupId;
use tidepool_core::BackupRecord;
use tidepool_core::CidrRule;
use tidepool_core::DatabaseBinding;
use tidepool_core::DatabaseName;
use tidepool_core::DeadLetter;
use tidepool_core::FailureOutcome;
use tidepool_core::JobId;
use tidepool_core::JobPayload;
use tidepool_core::JobQueue;
use tidepool_core::JobRecord;
use tidepool_core::JobStore;
use tidepool_core::OwnerId;
use tidepool_core::ProjectId;
use tidepool_core::QueueError;
use tidepool_core::RegistryError;
use tidepool_core::RegistryStore;
use tidepool_core::RetryPolicy;
use tidepool_core::RoleName;
use tidepool_core::RuleBinding;
use tidepool_core::TenantProject;
use tidepool_core::Timestamp;
use tidepool_core::WhitelistRule;
use tidepool_core::WhitelistRuleId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Schema bootstrap statements.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    role_name TEXT NOT NULL UNIQUE,
    database_name TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    password_envelope TEXT NOT NULL,
    schema_name TEXT,
    inactive_databases TEXT NOT NULL,
    action_in_progress INTEGER NOT NULL,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
CREATE TABLE IF NOT EXISTS whitelist_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL REFERENCES projects(id),
    database_name TEXT NOT NULL,
    cidr TEXT NOT NULL,
    is_active INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_whitelist_project ON whitelist_rules(project_id);
CREATE TABLE IF NOT EXISTS backups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL REFERENCES projects(id),
    database_name TEXT NOT NULL,
    object_id TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_backups_project ON backups(project_id, created_at_ms);
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    not_before_ms INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(queue, not_before_ms, id);
CREATE TABLE IF NOT EXISTS dead_letters (
    id INTEGER PRIMARY KEY,
    queue TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    failed_at_ms INTEGER NOT NULL,
    last_error TEXT NOT NULL
);
";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a config with the default busy timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or undecodable row.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for RegistryError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::VersionMismatch(message) => Self::Storage(message),
        }
    }
}

impl From<SqliteStoreError> for QueueError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Corrupt(message) | SqliteStoreError::Invalid(message) => {
                Self::Payload(message)
            }
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::VersionMismatch(message) => Self::Storage(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable registry and queue store on one `SQLite` database.
///
/// # Invariants
/// - All access serializes through the inner connection lock; workers and
///   scanners share one store handle.
pub struct SqliteStore {
    /// Single serialized connection.
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the file cannot be opened, the
    /// pragmas fail, or the schema version mismatches.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if config.path.as_os_str().is_empty() {
            return Err(SqliteStoreError::Invalid("store path must be set".to_string()));
        }
        if config.path.is_dir() {
            return Err(SqliteStoreError::Invalid("store path is a directory".to_string()));
        }
        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "synchronous", "full")?;
        conn.pragma_update(None, "foreign_keys", "on")?;
        Self::check_schema_version(&conn)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when bootstrap fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "on")?;
        Self::check_schema_version(&conn)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Verifies or stamps the schema version pragma.
    fn check_schema_version(conn: &Connection) -> Result<(), SqliteStoreError> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            return Ok(());
        }
        if version != SCHEMA_VERSION {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "expected {SCHEMA_VERSION}, found {version}"
            )));
        }
        Ok(())
    }

    /// Runs a closure with the locked connection.
    fn with_conn<T>(
        &self,
        run: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SqliteStoreError::Io("store lock poisoned".to_string()))?;
        run(&conn)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Decodes a project row; column order matches [`PROJECT_COLUMNS`].
fn decode_project(row: &rusqlite::Row<'_>) -> Result<TenantProject, SqliteStoreError> {
    let inactive_raw: String = row.get(10)?;
    let inactive: Vec<String> = serde_json::from_str(&inactive_raw)
        .map_err(|err| SqliteStoreError::Corrupt(format!("inactive_databases: {err}")))?;
    let schema_name: Option<String> = row.get(9)?;
    let port: i64 = row.get(7)?;
    let port = u16::try_from(port)
        .map_err(|_| SqliteStoreError::Corrupt(format!("port out of range: {port}")))?;
    Ok(TenantProject {
        id: ProjectId::new(row.get::<_, String>(0)?),
        owner_id: OwnerId::new(row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        binding: DatabaseBinding {
            role_name: RoleName::new(row.get::<_, String>(4)?),
            database_name: DatabaseName::new(row.get::<_, String>(5)?),
            host: row.get(6)?,
            port,
            password_envelope: row.get(8)?,
            schema_name,
        },
        inactive_databases: inactive.into_iter().map(DatabaseName::new).collect(),
        action_in_progress: row.get::<_, i64>(11)? != 0,
        created_at: Timestamp::from_unix_millis(row.get(12)?),
    })
}

/// Project column list shared by every project select.
const PROJECT_COLUMNS: &str = "id, owner_id, title, description, role_name, database_name, \
                               host, port, password_envelope, schema_name, inactive_databases, \
                               action_in_progress, created_at_ms";

/// Decodes a whitelist rule row.
fn decode_rule(row: &rusqlite::Row<'_>) -> Result<WhitelistRule, SqliteStoreError> {
    let cidr_raw: String = row.get(3)?;
    let cidr = CidrRule::parse(&cidr_raw)
        .map_err(|err| SqliteStoreError::Corrupt(format!("stored cidr: {err}")))?;
    Ok(WhitelistRule {
        id: WhitelistRuleId::new(row.get(0)?),
        project_id: ProjectId::new(row.get::<_, String>(1)?),
        database_name: DatabaseName::new(row.get::<_, String>(2)?),
        cidr,
        is_active: row.get::<_, i64>(4)? != 0,
    })
}

/// Decodes a job row into a [`JobRecord`].
fn decode_job(row: &rusqlite::Row<'_>) -> Result<JobRecord, SqliteStoreError> {
    let queue_label: String = row.get(1)?;
    let queue = JobQueue::from_label(&queue_label)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown queue: {queue_label}")))?;
    let payload_raw: String = row.get(3)?;
    let payload: JobPayload = serde_json::from_str(&payload_raw)
        .map_err(|err| SqliteStoreError::Corrupt(format!("job payload: {err}")))?;
    let attempts: i64 = row.get(5)?;
    Ok(JobRecord {
        id: JobId::new(row.get(0)?),
        queue,
        payload,
        not_before: Timestamp::from_unix_millis(row.get(4)?),
        attempts: u32::try_from(attempts)
            .map_err(|_| SqliteStoreError::Corrupt(format!("attempts out of range: {attempts}")))?,
        created_at: Timestamp::from_unix_millis(row.get(6)?),
    })
}

/// Encodes an inactive set as a JSON array.
fn encode_inactive(inactive: &BTreeSet<DatabaseName>) -> Result<String, SqliteStoreError> {
    let names: Vec<&str> = inactive.iter().map(DatabaseName::as_str).collect();
    serde_json::to_string(&names)
        .map_err(|err| SqliteStoreError::Invalid(format!("inactive_databases: {err}")))
}

// ============================================================================
// SECTION: RegistryStore Implementation
// ============================================================================

impl RegistryStore for SqliteStore {
    fn create_project(&self, project: &TenantProject) -> Result<(), RegistryError> {
        let inactive = encode_inactive(&project.inactive_databases)?;
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO projects (id, owner_id, title, description, role_name, \
                 database_name, host, port, password_envelope, schema_name, \
                 inactive_databases, action_in_progress, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    project.id.as_str(),
                    project.owner_id.as_str(),
                    project.title,
                    project.description,
                    project.binding.role_name.as_str(),
                    project.binding.database_name.as_str(),
                    project.binding.host,
                    i64::from(project.binding.port),
                    project.binding.password_envelope,
                    project.binding.schema_name,
                    inactive,
                    i64::from(project.action_in_progress),
                    project.created_at.as_unix_millis(),
                ],
            )?;
            // Every new project starts with the open seed rule, pending
            // activation by the next reconciliation pass.
            tx.execute(
                "INSERT INTO whitelist_rules (project_id, database_name, cidr, is_active) \
                 VALUES (?1, ?2, '0.0.0.0/0', 0)",
                params![project.id.as_str(), project.binding.database_name.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .map_err(RegistryError::from)
    }

    fn project(&self, id: &ProjectId) -> Result<TenantProject, RegistryError> {
        let found = self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id.as_str()],
                |row| Ok(decode_project(row)),
            )
            .optional()?
            .transpose()
        })?;
        found.ok_or_else(|| RegistryError::NotFound(format!("project {id}")))
    }

    fn project_for_owner(
        &self,
        id: &ProjectId,
        owner: &OwnerId,
    ) -> Result<Option<TenantProject>, RegistryError> {
        Ok(self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1 AND owner_id = ?2"),
                params![id.as_str(), owner.as_str()],
                |row| Ok(decode_project(row)),
            )
            .optional()?
            .transpose()
        })?)
    }

    fn projects_by_owner(&self, owner: &OwnerId) -> Result<Vec<TenantProject>, RegistryError> {
        Ok(self.with_conn(|conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = ?1 ORDER BY created_at_ms"
            ))?;
            let rows = statement.query_map(params![owner.as_str()], |row| Ok(decode_project(row)))?;
            let mut projects = Vec::new();
            for row in rows {
                projects.push(row??);
            }
            Ok(projects)
        })?)
    }

    fn projects_by_roles(&self, roles: &[RoleName]) -> Result<Vec<TenantProject>, RegistryError> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.with_conn(|conn| {
            let mut statement = conn.prepare(&format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE role_name = ?1"
            ))?;
            let mut projects = Vec::new();
            for role in roles {
                let found = statement
                    .query_row(params![role.as_str()], |row| Ok(decode_project(row)))
                    .optional()?
                    .transpose()?;
                if let Some(project) = found {
                    projects.push(project);
                }
            }
            Ok(projects)
        })?)
    }

    fn update_inactive_databases(
        &self,
        id: &ProjectId,
        inactive: &BTreeSet<DatabaseName>,
        action_in_progress: bool,
    ) -> Result<(), RegistryError> {
        let encoded = encode_inactive(inactive)?;
        let updated = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE projects SET inactive_databases = ?1, action_in_progress = ?2 \
                 WHERE id = ?3",
                params![encoded, i64::from(action_in_progress), id.as_str()],
            )?)
        })?;
        if updated == 0 {
            return Err(RegistryError::NotFound(format!("project {id}")));
        }
        Ok(())
    }

    fn set_password_envelope(&self, id: &ProjectId, envelope: &str) -> Result<(), RegistryError> {
        let updated = self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE projects SET password_envelope = ?1 WHERE id = ?2",
                params![envelope, id.as_str()],
            )?)
        })?;
        if updated == 0 {
            return Err(RegistryError::NotFound(format!("project {id}")));
        }
        Ok(())
    }

    fn add_whitelist_rule(
        &self,
        project_id: &ProjectId,
        database_name: &DatabaseName,
        cidr: &CidrRule,
    ) -> Result<WhitelistRule, RegistryError> {
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO whitelist_rules (project_id, database_name, cidr, is_active) \
                 VALUES (?1, ?2, ?3, 0)",
                params![project_id.as_str(), database_name.as_str(), cidr.as_str()],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(WhitelistRule {
            id: WhitelistRuleId::new(id),
            project_id: project_id.clone(),
            database_name: database_name.clone(),
            cidr: cidr.clone(),
            is_active: false,
        })
    }

    fn whitelist_rules(&self, project_id: &ProjectId) -> Result<Vec<WhitelistRule>, RegistryError> {
        Ok(self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, project_id, database_name, cidr, is_active \
                 FROM whitelist_rules WHERE project_id = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map(params![project_id.as_str()], |row| Ok(decode_rule(row)))?;
            let mut rules = Vec::new();
            for row in rows {
                rules.push(row??);
            }
            Ok(rules)
        })?)
    }

    fn remove_whitelist_rule(
        &self,
        project_id: &ProjectId,
        rule_id: WhitelistRuleId,
    ) -> Result<(), RegistryError> {
        let removed = self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM whitelist_rules WHERE id = ?1 AND project_id = ?2",
                params![rule_id.get(), project_id.as_str()],
            )?)
        })?;
        if removed == 0 {
            return Err(RegistryError::NotFound(format!("whitelist rule {rule_id}")));
        }
        Ok(())
    }

    fn rule_bindings(&self) -> Result<Vec<RuleBinding>, RegistryError> {
        Ok(self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT r.id, r.project_id, r.database_name, r.cidr, r.is_active, p.role_name \
                 FROM whitelist_rules r JOIN projects p ON p.id = r.project_id ORDER BY r.id",
            )?;
            let rows = statement.query_map([], |row| {
                let role: String = row.get(5)?;
                Ok(decode_rule(row).map(|rule| RuleBinding {
                    rule,
                    role: RoleName::new(role),
                }))
            })?;
            let mut bindings = Vec::new();
            for row in rows {
                bindings.push(row??);
            }
            Ok(bindings)
        })?)
    }

    fn mark_rules_active(&self) -> Result<u64, RegistryError> {
        let flipped = self.with_conn(|conn| {
            Ok(conn.execute("UPDATE whitelist_rules SET is_active = 1 WHERE is_active = 0", [])?)
        })?;
        Ok(u64::try_from(flipped).unwrap_or(u64::MAX))
    }

    fn record_backup(
        &self,
        project_id: &ProjectId,
        database_name: &DatabaseName,
        object_id: &str,
        created_at: Timestamp,
    ) -> Result<BackupRecord, RegistryError> {
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO backups (project_id, database_name, object_id, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    project_id.as_str(),
                    database_name.as_str(),
                    object_id,
                    created_at.as_unix_millis(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(BackupRecord {
            id: BackupId::new(id),
            project_id: project_id.clone(),
            database_name: database_name.clone(),
            object_id: object_id.to_string(),
            created_at,
        })
    }

    fn backups(&self, project_id: &ProjectId) -> Result<Vec<BackupRecord>, RegistryError> {
        Ok(self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, project_id, database_name, object_id, created_at_ms \
                 FROM backups WHERE project_id = ?1 ORDER BY created_at_ms DESC, id DESC",
            )?;
            let rows = statement.query_map(params![project_id.as_str()], |row| {
                Ok(BackupRecord {
                    id: BackupId::new(row.get(0)?),
                    project_id: ProjectId::new(row.get::<_, String>(1)?),
                    database_name: DatabaseName::new(row.get::<_, String>(2)?),
                    object_id: row.get(3)?,
                    created_at: Timestamp::from_unix_millis(row.get(4)?),
                })
            })?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })?)
    }

    fn backup(
        &self,
        project_id: &ProjectId,
        backup_id: BackupId,
    ) -> Result<Option<BackupRecord>, RegistryError> {
        Ok(self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, project_id, database_name, object_id, created_at_ms \
                     FROM backups WHERE project_id = ?1 AND id = ?2",
                    params![project_id.as_str(), backup_id.get()],
                    |row| {
                        Ok(BackupRecord {
                            id: BackupId::new(row.get(0)?),
                            project_id: ProjectId::new(row.get::<_, String>(1)?),
                            database_name: DatabaseName::new(row.get::<_, String>(2)?),
                            object_id: row.get(3)?,
                            created_at: Timestamp::from_unix_millis(row.get(4)?),
                        })
                    },
                )
                .optional()?)
        })?)
    }
}

// ============================================================================
// SECTION: JobStore Implementation
// ============================================================================

impl JobStore for SqliteStore {
    fn enqueue(
        &self,
        payload: &JobPayload,
        not_before: Timestamp,
        now: Timestamp,
    ) -> Result<JobId, QueueError> {
        let kind = payload.kind();
        let encoded = serde_json::to_string(payload)
            .map_err(|err| QueueError::Payload(err.to_string()))?;
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (queue, kind, payload, not_before_ms, attempts, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    kind.queue().as_str(),
                    kind.as_str(),
                    encoded,
                    not_before.as_unix_millis(),
                    now.as_unix_millis(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(JobId::new(id))
    }

    fn claim_due(&self, queue: JobQueue, now: Timestamp) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, queue, kind, payload, not_before_ms, attempts, created_at_ms \
                 FROM jobs WHERE queue = ?1 AND not_before_ms <= ?2 \
                 ORDER BY not_before_ms, id LIMIT 1",
                params![queue.as_str(), now.as_unix_millis()],
                |row| Ok(decode_job(row)),
            )
            .optional()?
            .transpose()
        })?)
    }

    fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let removed = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM jobs WHERE id = ?1", params![id.get()])?)
        })?;
        if removed == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    fn fail(
        &self,
        id: JobId,
        error: &str,
        policy: &RetryPolicy,
        now: Timestamp,
    ) -> Result<FailureOutcome, QueueError> {
        let outcome = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let job = tx
                .query_row(
                    "SELECT id, queue, kind, payload, not_before_ms, attempts, created_at_ms \
                     FROM jobs WHERE id = ?1",
                    params![id.get()],
                    |row| Ok(decode_job(row)),
                )
                .optional()?
                .transpose()?;
            let Some(job) = job else {
                return Ok(None);
            };
            let attempts = job.attempts.saturating_add(1);
            if policy.is_exhausted(attempts) {
                tx.execute(
                    "INSERT INTO dead_letters \
                     (id, queue, kind, payload, attempts, failed_at_ms, last_error) \
                     SELECT id, queue, kind, payload, ?2, ?3, ?4 FROM jobs WHERE id = ?1",
                    params![id.get(), i64::from(attempts), now.as_unix_millis(), error],
                )?;
                tx.execute("DELETE FROM jobs WHERE id = ?1", params![id.get()])?;
                tx.commit()?;
                return Ok(Some(FailureOutcome::DeadLettered));
            }
            let next = now.saturating_add(policy.backoff(attempts));
            tx.execute(
                "UPDATE jobs SET attempts = ?1, not_before_ms = ?2 WHERE id = ?3",
                params![i64::from(attempts), next.as_unix_millis(), id.get()],
            )?;
            tx.commit()?;
            Ok(Some(FailureOutcome::Retried(next)))
        })?;
        outcome.ok_or(QueueError::NotFound(id))
    }

    fn dead_letters(&self, queue: JobQueue) -> Result<Vec<DeadLetter>, QueueError> {
        Ok(self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, queue, kind, payload, attempts, failed_at_ms, last_error \
                 FROM dead_letters WHERE queue = ?1 ORDER BY failed_at_ms, id",
            )?;
            let rows = statement.query_map(params![queue.as_str()], |row| {
                let queue_label: String = row.get(1)?;
                let payload_raw: String = row.get(3)?;
                let attempts: i64 = row.get(4)?;
                Ok((queue_label, payload_raw, attempts, row.get::<_, i64>(0)?, row.get::<_, i64>(5)?, row.get::<_, String>(6)?))
            })?;
            let mut letters = Vec::new();
            for row in rows {
                let (queue_label, payload_raw, attempts, id, failed_at, last_error) = row?;
                let queue = JobQueue::from_label(&queue_label).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("unknown queue: {queue_label}"))
                })?;
                let payload: JobPayload = serde_json::from_str(&payload_raw)
                    .map_err(|err| SqliteStoreError::Corrupt(format!("dead letter payload: {err}")))?;
                letters.push(DeadLetter {
                    id: JobId::new(id),
                    queue,
                    payload,
                    attempts: u32::try_from(attempts).map_err(|_| {
                        SqliteStoreError::Corrupt(format!("attempts out of range: {attempts}"))
                    })?,
                    failed_at: Timestamp::from_unix_millis(failed_at),
                    last_error,
                });
            }
            Ok(letters)
        })?)
    }
}
