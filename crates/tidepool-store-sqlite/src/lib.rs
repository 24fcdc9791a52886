// crates/tidepool-store-sqlite/src/lib.rs
// ============================================================================
// Module: Tidepool SQLite Store
// Description: Durable registry and job queue backed by SQLite WAL.
// Purpose: Persist tenant state and delayed jobs across restarts.
// Dependencies: rusqlite, serde_json, thiserror, tidepool-core
// ============================================================================

//! ## Overview
//! One SQLite file holds the tenant registry (projects, allow-list rules,
//! backup records) and the delayed job queue (jobs, dead letters). The
//! store opens in WAL mode with a busy timeout, verifies its schema
//! version, and fails closed on undecodable rows rather than repairing
//! them. Queue semantics are at-least-once: a claimed job stays in the
//! table until completion removes it, so a crash mid-execution redelivers.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
