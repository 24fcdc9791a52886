// crates/tidepool-backup/src/lib.rs
// ============================================================================
// Module: Tidepool Backup
// Description: Dump, compress, upload, and signed-download for tenant data.
// Purpose: Produce immutable private archives with time-limited access.
// Dependencies: async-trait, aws-config, aws-sdk-s3, flate2, sha2, tempfile,
// thiserror, tidepool-core, tidepool-vault, tokio
// ============================================================================

//! ## Overview
//! The backup manager dumps a tenant database with the external dump
//! utility, compresses the dump, uploads it to private object storage
//! with an integrity digest, records the result in the registry, and
//! removes local scratch files unconditionally. Downloads never expose
//! tenant credentials: callers receive a minutes-scale signed URL fetched
//! server-side.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod manager;
mod s3_store;

pub use manager::BackupError;
pub use manager::BackupManager;
pub use manager::BackupRunner;
pub use manager::object_key;
pub use s3_store::S3ObjectStore;
pub use s3_store::S3ObjectStoreConfig;
