// crates/tidepool-pg/src/tenant.rs
// ============================================================================
// Module: Tenant Sessions
// Description: Short-lived tenant-credential sessions for ad-hoc queries.
// Purpose: Execute builder-rendered SQL against a tenant database.
// Dependencies: tidepool-core, tokio, tokio-postgres
// ============================================================================

//! ## Overview
//! Request-handling code builds statements through the query builder and
//! executes them here, connecting as the tenant role with a password the
//! vault just opened. Sessions are short-lived and dropped after the
//! statement finishes. Results come back through the simple-query (text)
//! protocol, which suits ad-hoc tenant SQL where column types are not
//! known in advance.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use tidepool_core::DatabaseBinding;
use tidepool_core::EngineError;
use tokio_postgres::Client;
use tokio_postgres::NoTls;
use tokio_postgres::SimpleQueryMessage;

// ============================================================================
// SECTION: Tenant Session
// ============================================================================

/// One short-lived session authenticated as the tenant role.
///
/// # Invariants
/// - The session is dropped (closing the connection) when this value is.
pub struct TenantSession {
    /// Underlying client.
    client: Client,
}

impl std::fmt::Debug for TenantSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantSession").finish_non_exhaustive()
    }
}

impl TenantSession {
    /// Connects to the bound database as the tenant role.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transient`] when the engine is unreachable
    /// or authentication fails.
    pub async fn connect(binding: &DatabaseBinding, password: &str) -> Result<Self, EngineError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&binding.host)
            .port(binding.port)
            .user(binding.role_name.as_str())
            .password(password)
            .dbname(binding.database_name.as_str());
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|err| EngineError::Transient(err.to_string()))?;
        tokio::spawn(async move {
            let _ = connection.await;
        });
        Ok(Self {
            client,
        })
    }

    /// Runs a builder-rendered read query, returning rows as column maps.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Sql`] when the statement fails.
    pub async fn query_rows(
        &self,
        sql: &str,
    ) -> Result<Vec<BTreeMap<String, Option<String>>>, EngineError> {
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(|err| EngineError::Sql(err.to_string()))?;
        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut decoded = BTreeMap::new();
                for (index, column) in row.columns().iter().enumerate() {
                    decoded.insert(
                        column.name().to_string(),
                        row.get(index).map(str::to_string),
                    );
                }
                rows.push(decoded);
            }
        }
        Ok(rows)
    }

    /// Runs a builder-rendered write statement.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Sql`] when the statement fails.
    pub async fn execute(&self, sql: &str) -> Result<(), EngineError> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|err| EngineError::Sql(err.to_string()))
    }
}
