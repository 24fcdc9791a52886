// crates/tidepool-pg/src/lib.rs
// ============================================================================
// Module: Tidepool PG
// Description: PostgreSQL administration backend for the orchestrator.
// Purpose: Implement provisioning, telemetry, lifecycle ops, and HBA rules.
// Dependencies: async-trait, rand, tempfile, thiserror, tidepool-core,
// tidepool-querygen, tidepool-vault, tokio, tokio-postgres
// ============================================================================

//! ## Overview
//! This crate implements the core engine interface against a real
//! `PostgreSQL` cluster. Read-only telemetry shares one long-lived
//! administrative session; every mutating operation (role and database
//! creation, privilege changes, drops, password alters) opens a fresh
//! short-lived session that is dropped as soon as the statement batch
//! finishes, so elevated sessions are never left pooled. The host-based
//! authentication module rebuilds the engine's rule file from the
//! registry on every reconciliation rather than patching it.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod credentials;
pub mod engine;
pub mod hba;
pub mod provisioner;
pub mod tenant;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use credentials::derive_role_name;
pub use credentials::generate_database_name;
pub use credentials::generate_password;
pub use credentials::sanitize_title;
pub use engine::PgEngine;
pub use engine::PgEngineConfig;
pub use hba::HbaFile;
pub use hba::HbaSettings;
pub use hba::render_ruleset;
pub use provisioner::ProvisionError;
pub use provisioner::ProvisionSchedule;
pub use provisioner::ProvisionedProject;
pub use provisioner::Provisioner;
pub use tenant::TenantSession;
