// crates/tidepool-pg/src/engine.rs
// ============================================================================
// Module: Engine Administration
// Description: EngineAdmin implementation over tokio-postgres sessions.
// Purpose: Execute provisioning, telemetry, and lifecycle statements safely.
// Dependencies: async-trait, tidepool-core, tidepool-querygen, tokio,
// tokio-postgres
// ============================================================================

//! ## Overview
//! [`PgEngine`] holds one long-lived administrative session for read-only
//! catalog and statistics queries. Mutating operations never touch that
//! session: each opens a fresh short-lived connection that is dropped when
//! the statement batch finishes. Identifiers interpolated into DDL go
//! through the querygen quoting primitives; values go through literal
//! quoting or bound parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tidepool_core::DatabaseName;
use tidepool_core::DatabaseUsage;
use tidepool_core::EngineAdmin;
use tidepool_core::EngineError;
use tidepool_core::IdleDatabase;
use tidepool_core::ProvisionSpec;
use tidepool_core::RoleName;
use tidepool_core::Timestamp;
use tidepool_core::UsageStatus;
use tidepool_core::UsageWindow;
use tidepool_querygen::QueryError;
use tidepool_querygen::quote_identifier;
use tidepool_querygen::quote_literal;
use tokio_postgres::Client;
use tokio_postgres::NoTls;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Connection settings for the administrative interface.
///
/// # Invariants
/// - `admin_database` is the maintenance database used for sessions that
///   are not bound to a specific tenant database.
#[derive(Debug, Clone)]
pub struct PgEngineConfig {
    /// Engine host.
    pub host: String,
    /// Engine port.
    pub port: u16,
    /// Privileged role.
    pub admin_user: String,
    /// Privileged role password.
    pub admin_password: String,
    /// Maintenance database.
    pub admin_database: String,
}

impl PgEngineConfig {
    /// Builds a tokio-postgres config for the named database.
    fn pg_config(&self, database: &str) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.admin_user)
            .password(&self.admin_password)
            .dbname(database);
        config
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// `PostgreSQL` administrative backend.
///
/// # Invariants
/// - `read_client` is only used for read-only catalog/statistics queries.
pub struct PgEngine {
    /// Connection settings.
    config: PgEngineConfig,
    /// Shared read-only session on the maintenance database.
    read_client: Client,
}

impl std::fmt::Debug for PgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEngine").field("host", &self.config.host).finish_non_exhaustive()
    }
}

impl PgEngine {
    /// Connects the shared read-only session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transient`] when the engine is unreachable.
    pub async fn connect(config: PgEngineConfig) -> Result<Self, EngineError> {
        let database = config.admin_database.clone();
        let read_client = open_session(&config, &database).await?;
        Ok(Self {
            config,
            read_client,
        })
    }

    /// Opens a fresh short-lived session on the maintenance database.
    async fn admin_session(&self) -> Result<Client, EngineError> {
        open_session(&self.config, &self.config.admin_database).await
    }

    /// Opens a fresh short-lived session on a specific database.
    async fn database_session(&self, database: &DatabaseName) -> Result<Client, EngineError> {
        open_session(&self.config, database.as_str()).await
    }
}

/// Opens one session and spawns its connection driver.
async fn open_session(config: &PgEngineConfig, database: &str) -> Result<Client, EngineError> {
    let (client, connection) = config
        .pg_config(database)
        .connect(NoTls)
        .await
        .map_err(|err| EngineError::Transient(err.to_string()))?;
    // The driver task ends when the client is dropped, closing the session.
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

/// Maps a statement error into the engine taxonomy.
fn sql_error(err: &tokio_postgres::Error) -> EngineError {
    if err.is_closed() {
        return EngineError::Transient(err.to_string());
    }
    EngineError::Sql(err.to_string())
}

/// Maps a quoting error into the engine taxonomy.
fn quote_error(err: &QueryError) -> EngineError {
    EngineError::Sql(err.to_string())
}

/// Converts an engine timestamp into core milliseconds.
fn to_timestamp(time: SystemTime) -> Option<Timestamp> {
    let millis = time.duration_since(UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok().map(Timestamp::from_unix_millis)
}

// ============================================================================
// SECTION: Telemetry Queries
// ============================================================================

/// Catalog query listing managed databases with usage counters.
const LIST_OWNED_SQL: &str = "\
SELECT d.datname, \
       pg_database_size(d.datname) AS size_bytes, \
       COALESCE(a.connections, 0)::bigint AS active_connections, \
       COALESCE(s.tup_returned + s.tup_fetched + s.tup_inserted \
                + s.tup_updated + s.tup_deleted, 0)::bigint AS total_operations \
FROM pg_database d \
JOIN pg_roles r ON d.datdba = r.oid \
LEFT JOIN pg_stat_database s ON s.datid = d.oid \
LEFT JOIN (SELECT datname, COUNT(*) AS connections \
           FROM pg_stat_activity GROUP BY datname) a ON a.datname = d.datname \
WHERE r.rolname LIKE $1 AND NOT d.datistemplate \
ORDER BY d.datname";

/// Statistics query feeding idle classification.
const FIND_IDLE_SQL: &str = "\
SELECT d.datname, r.rolname, \
       COALESCE(s.tup_returned + s.tup_fetched + s.tup_inserted \
                + s.tup_updated + s.tup_deleted, 0)::bigint AS total_operations, \
       s.stats_reset \
FROM pg_database d \
JOIN pg_roles r ON d.datdba = r.oid \
LEFT JOIN pg_stat_database s ON s.datid = d.oid \
WHERE NOT d.datistemplate AND d.datname <> 'postgres' \
ORDER BY d.datname";

// ============================================================================
// SECTION: EngineAdmin Implementation
// ============================================================================

#[async_trait]
impl EngineAdmin for PgEngine {
    async fn create_instance(&self, spec: &ProvisionSpec) -> Result<(), EngineError> {
        let role = quote_identifier(spec.role_name.as_str()).map_err(|err| quote_error(&err))?;
        let database =
            quote_identifier(spec.database_name.as_str()).map_err(|err| quote_error(&err))?;
        let password = quote_literal(&spec.password);

        let session = self.admin_session().await.map_err(provisioning)?;
        session
            .batch_execute(&format!(
                "CREATE ROLE {role} WITH LOGIN PASSWORD {password} CREATEDB"
            ))
            .await
            .map_err(|err| EngineError::Provisioning(err.to_string()))?;
        session
            .batch_execute(&format!("CREATE DATABASE {database} WITH OWNER {role}"))
            .await
            .map_err(|err| EngineError::Provisioning(err.to_string()))?;
        drop(session);

        // Extensions must be created inside the new database.
        let tenant_session =
            self.database_session(&spec.database_name).await.map_err(provisioning)?;
        tenant_session
            .batch_execute(
                "CREATE EXTENSION IF NOT EXISTS pg_stat_statements; \
                 CREATE EXTENSION IF NOT EXISTS dblink",
            )
            .await
            .map_err(|err| EngineError::Provisioning(err.to_string()))?;
        drop(tenant_session);
        Ok(())
    }

    async fn cleanup_orphans(
        &self,
        role: &RoleName,
        database: &DatabaseName,
    ) -> Result<(), EngineError> {
        let quoted_role = quote_identifier(role.as_str()).map_err(|err| quote_error(&err))?;
        let quoted_database =
            quote_identifier(database.as_str()).map_err(|err| quote_error(&err))?;
        let session = self.admin_session().await?;
        session
            .execute(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = $1 AND pid <> pg_backend_pid()",
                &[&database.as_str()],
            )
            .await
            .map_err(|err| sql_error(&err))?;
        session
            .batch_execute(&format!("DROP DATABASE IF EXISTS {quoted_database}"))
            .await
            .map_err(|err| sql_error(&err))?;
        session
            .batch_execute(&format!("DROP ROLE IF EXISTS {quoted_role}"))
            .await
            .map_err(|err| sql_error(&err))?;
        drop(session);
        Ok(())
    }

    async fn list_owned_databases(
        &self,
        owner_pattern: &str,
    ) -> Result<Vec<DatabaseUsage>, EngineError> {
        let rows = self
            .read_client
            .query(LIST_OWNED_SQL, &[&owner_pattern])
            .await
            .map_err(|err| sql_error(&err))?;
        let mut usages = Vec::with_capacity(rows.len());
        for row in rows {
            usages.push(DatabaseUsage {
                name: DatabaseName::new(row.get::<_, String>(0)),
                size_bytes: row.get(1),
                active_connections: row.get(2),
                total_operations: row.get(3),
            });
        }
        Ok(usages)
    }

    async fn find_idle(
        &self,
        idle_after: Duration,
        now: Timestamp,
    ) -> Result<Vec<IdleDatabase>, EngineError> {
        let rows = self
            .read_client
            .query(FIND_IDLE_SQL, &[])
            .await
            .map_err(|err| sql_error(&err))?;
        let mut idle = Vec::new();
        for row in rows {
            let window = UsageWindow {
                total_operations: row.get(2),
                // A database without a statistics row classifies never-used
                // instead of failing the scan.
                window_start: row
                    .get::<_, Option<SystemTime>>(3)
                    .and_then(to_timestamp),
            };
            let status = UsageStatus::classify(window, now, idle_after);
            if status.is_pause_candidate() {
                idle.push(IdleDatabase {
                    database: DatabaseName::new(row.get::<_, String>(0)),
                    owner_role: RoleName::new(row.get::<_, String>(1)),
                    status,
                });
            }
        }
        Ok(idle)
    }

    async fn revoke_access(
        &self,
        databases: &[DatabaseName],
        owner: &RoleName,
    ) -> Result<(), EngineError> {
        let quoted_owner = quote_identifier(owner.as_str()).map_err(|err| quote_error(&err))?;
        let session = self.admin_session().await?;
        for database in databases {
            let quoted = quote_identifier(database.as_str()).map_err(|err| quote_error(&err))?;
            session
                .batch_execute(&format!(
                    "REVOKE ALL PRIVILEGES ON DATABASE {quoted} FROM PUBLIC; \
                     REVOKE CONNECT ON DATABASE {quoted} FROM {quoted_owner}"
                ))
                .await
                .map_err(|err| sql_error(&err))?;
        }
        drop(session);
        self.terminate_connections(databases).await
    }

    async fn grant_access(
        &self,
        databases: &[DatabaseName],
        owner: &RoleName,
    ) -> Result<(), EngineError> {
        let quoted_owner = quote_identifier(owner.as_str()).map_err(|err| quote_error(&err))?;
        let session = self.admin_session().await?;
        for database in databases {
            let quoted = quote_identifier(database.as_str()).map_err(|err| quote_error(&err))?;
            session
                .batch_execute(&format!(
                    "GRANT ALL PRIVILEGES ON DATABASE {quoted} TO {quoted_owner}; \
                     GRANT CONNECT ON DATABASE {quoted} TO PUBLIC"
                ))
                .await
                .map_err(|err| sql_error(&err))?;
        }
        drop(session);
        Ok(())
    }

    async fn terminate_connections(&self, databases: &[DatabaseName]) -> Result<(), EngineError> {
        let session = self.admin_session().await?;
        for database in databases {
            session
                .execute(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                     WHERE datname = $1 AND pid <> pg_backend_pid()",
                    &[&database.as_str()],
                )
                .await
                .map_err(|err| sql_error(&err))?;
        }
        drop(session);
        Ok(())
    }

    async fn drop_databases(&self, databases: &[DatabaseName]) -> Result<(), EngineError> {
        let session = self.admin_session().await?;
        for database in databases {
            let quoted = quote_identifier(database.as_str()).map_err(|err| quote_error(&err))?;
            session
                .batch_execute(&format!("DROP DATABASE IF EXISTS {quoted}"))
                .await
                .map_err(|err| sql_error(&err))?;
        }
        drop(session);
        Ok(())
    }

    async fn alter_role_password(
        &self,
        role: &RoleName,
        new_password: &str,
    ) -> Result<(), EngineError> {
        let quoted_role = quote_identifier(role.as_str()).map_err(|err| quote_error(&err))?;
        let quoted_password = quote_literal(new_password);
        let session = self.admin_session().await?;
        session
            .batch_execute(&format!("ALTER ROLE {quoted_role} WITH PASSWORD {quoted_password}"))
            .await
            .map_err(|err| sql_error(&err))?;
        drop(session);
        Ok(())
    }

    async fn reload_configuration(&self) -> Result<(), EngineError> {
        self.read_client
            .execute("SELECT pg_reload_conf()", &[])
            .await
            .map_err(|err| sql_error(&err))?;
        Ok(())
    }
}

/// Remaps a session-open failure into a provisioning error.
fn provisioning(err: EngineError) -> EngineError {
    match err {
        EngineError::Transient(message) | EngineError::Sql(message) => {
            EngineError::Provisioning(message)
        }
        other @ EngineError::Provisioning(_) => other,
    }
}
