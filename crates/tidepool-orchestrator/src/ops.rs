// crates/tidepool-orchestrator/src/ops.rs
// ============================================================================
// Module: Tenant Operations
// Description: Synchronous tenant-facing operations behind the HTTP boundary.
// Purpose: Validate at the boundary; reject bad input before any engine call.
// Dependencies: tidepool-core, tidepool-pg, tidepool-querygen, tidepool-vault,
// crate::dirty
// ============================================================================

//! ## Overview
//! These are the operations the request-handling layer calls on behalf of
//! an authenticated tenant: resume paused databases, manage the network
//! allow-list, and run builder-constructed search and bulk-update
//! statements against a tenant database. Validation failures (a bad CIDR,
//! a malformed filter) are rejected synchronously as client-visible
//! errors and never reach the engine or the queue; infrastructure
//! failures surface generically, with detail left to the caller's logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tidepool_core::CidrRule;
use tidepool_core::DatabaseName;
use tidepool_core::EngineAdmin;
use tidepool_core::OwnerId;
use tidepool_core::ProjectId;
use tidepool_core::RegistryStore;
use tidepool_core::TenantProject;
use tidepool_core::WhitelistRule;
use tidepool_core::WhitelistRuleId;
use tidepool_pg::TenantSession;
use tidepool_querygen::BulkUpdate;
use tidepool_querygen::FilterPredicate;
use tidepool_querygen::build_bulk_update;
use tidepool_querygen::build_filtered_select;
use tidepool_vault::CredentialVault;

use crate::dirty::DirtyFlag;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tenant operation errors.
///
/// # Invariants
/// - `Validation` carries a client-visible message; `Infrastructure`
///   carries internal detail the boundary should log, not expose.
#[derive(Debug, Error)]
pub enum TenantOpError {
    /// Input failed validation; safe to show to the tenant.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Project (or rule) not found for this owner.
    #[error("not found: {0}")]
    NotFound(String),
    /// Backend failure; show a generic message, log the detail.
    #[error("operation failed: {0}")]
    Infrastructure(String),
}

// ============================================================================
// SECTION: Tenant Operations
// ============================================================================

/// Tenant-facing operation surface.
pub struct TenantOps {
    /// Tenant registry.
    registry: Arc<dyn RegistryStore>,
    /// Engine administrative interface.
    engine: Arc<dyn EngineAdmin>,
    /// Credential vault.
    vault: Arc<CredentialVault>,
    /// Reconciliation trigger.
    dirty: Arc<DirtyFlag>,
}

impl std::fmt::Debug for TenantOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantOps").finish_non_exhaustive()
    }
}

impl TenantOps {
    /// Creates the operation surface.
    #[must_use]
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        engine: Arc<dyn EngineAdmin>,
        vault: Arc<CredentialVault>,
        dirty: Arc<DirtyFlag>,
    ) -> Self {
        Self {
            registry,
            engine,
            vault,
            dirty,
        }
    }

    /// Fetches a project scoped to its owner.
    fn owned_project(
        &self,
        project_id: &ProjectId,
        owner: &OwnerId,
    ) -> Result<TenantProject, TenantOpError> {
        self.registry
            .project_for_owner(project_id, owner)
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))?
            .ok_or_else(|| TenantOpError::NotFound(format!("project {project_id}")))
    }

    /// Resumes every paused database for the project.
    ///
    /// Valid while the pause has not reached deletion; once the inactive
    /// set is empty there is nothing to resume and the call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TenantOpError`] on scope or engine failure.
    pub async fn resume_databases(
        &self,
        project_id: &ProjectId,
        owner: &OwnerId,
    ) -> Result<Vec<DatabaseName>, TenantOpError> {
        let project = self.owned_project(project_id, owner)?;
        if project.inactive_databases.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<DatabaseName> = project.inactive_databases.iter().cloned().collect();
        self.engine
            .grant_access(&names, &project.binding.role_name)
            .await
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))?;
        // Last write wins on the inactive set; a delete job that fires
        // later re-reads this empty set and no-ops.
        self.registry
            .update_inactive_databases(project_id, &BTreeSet::new(), false)
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))?;
        Ok(names)
    }

    /// Adds a validated allow-list entry and triggers reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`TenantOpError::Validation`] on a malformed CIDR.
    pub fn add_whitelist_entry(
        &self,
        project_id: &ProjectId,
        owner: &OwnerId,
        database: &DatabaseName,
        cidr_text: &str,
    ) -> Result<WhitelistRule, TenantOpError> {
        let project = self.owned_project(project_id, owner)?;
        let cidr =
            CidrRule::parse(cidr_text).map_err(|err| TenantOpError::Validation(err.to_string()))?;
        let rule = self
            .registry
            .add_whitelist_rule(&project.id, database, &cidr)
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))?;
        self.dirty.mark();
        Ok(rule)
    }

    /// Removes an allow-list entry and triggers reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`TenantOpError::NotFound`] when the rule is not the
    /// owner's.
    pub fn remove_whitelist_entry(
        &self,
        project_id: &ProjectId,
        owner: &OwnerId,
        rule_id: WhitelistRuleId,
    ) -> Result<(), TenantOpError> {
        let project = self.owned_project(project_id, owner)?;
        self.registry.remove_whitelist_rule(&project.id, rule_id).map_err(|err| {
            match err {
                tidepool_core::RegistryError::NotFound(message) => {
                    TenantOpError::NotFound(message)
                }
                other => TenantOpError::Infrastructure(other.to_string()),
            }
        })?;
        self.dirty.mark();
        Ok(())
    }

    /// Lists the project's allow-list entries.
    ///
    /// # Errors
    ///
    /// Returns [`TenantOpError`] on scope or store failure.
    pub fn whitelist_entries(
        &self,
        project_id: &ProjectId,
        owner: &OwnerId,
    ) -> Result<Vec<WhitelistRule>, TenantOpError> {
        let project = self.owned_project(project_id, owner)?;
        self.registry
            .whitelist_rules(&project.id)
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))
    }

    /// Opens a tenant session on one of the project's databases.
    async fn tenant_session(
        &self,
        project: &TenantProject,
        database: &DatabaseName,
    ) -> Result<TenantSession, TenantOpError> {
        let password = self
            .vault
            .decrypt(&project.binding.password_envelope)
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))?;
        let mut binding = project.binding.clone();
        binding.database_name = database.clone();
        TenantSession::connect(&binding, &password)
            .await
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))
    }

    /// Runs a filtered search built from tenant predicates.
    ///
    /// # Errors
    ///
    /// Returns [`TenantOpError::Validation`] on a malformed filter before
    /// any engine contact.
    pub async fn filtered_search(
        &self,
        project_id: &ProjectId,
        owner: &OwnerId,
        database: &DatabaseName,
        table: &str,
        predicates: &[FilterPredicate],
    ) -> Result<Vec<BTreeMap<String, Option<String>>>, TenantOpError> {
        let project = self.owned_project(project_id, owner)?;
        let sql = build_filtered_select(table, predicates)
            .map_err(|err| TenantOpError::Validation(err.to_string()))?;
        let session = self.tenant_session(&project, database).await?;
        session
            .query_rows(&sql)
            .await
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))
    }

    /// Runs a set-based bulk update built from tenant row maps.
    ///
    /// # Errors
    ///
    /// Returns [`TenantOpError::Validation`] on a malformed request
    /// before any engine contact.
    pub async fn bulk_update(
        &self,
        project_id: &ProjectId,
        owner: &OwnerId,
        database: &DatabaseName,
        request: &BulkUpdate,
    ) -> Result<(), TenantOpError> {
        let project = self.owned_project(project_id, owner)?;
        let sql =
            build_bulk_update(request).map_err(|err| TenantOpError::Validation(err.to_string()))?;
        let session = self.tenant_session(&project, database).await?;
        session
            .execute(&sql)
            .await
            .map_err(|err| TenantOpError::Infrastructure(err.to_string()))
    }
}
