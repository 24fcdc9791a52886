// crates/tidepool-pg/src/credentials.rs
// ============================================================================
// Module: Credential and Name Derivation
// Description: Role/database name derivation and password generation.
// Purpose: Produce collision-resistant, identifier-safe names per tenant.
// Dependencies: rand, tidepool-core
// ============================================================================

//! ## Overview
//! Provisioning derives a deterministic role name from the owner id and a
//! sanitized project title, and a collision-resistant database name by
//! suffixing the sanitized title with random bytes. Passwords are fresh
//! high-entropy hex strings; rotation always generates a new one rather
//! than deriving from the old value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::RngCore;
use rand::rngs::OsRng;
use tidepool_core::DatabaseName;
use tidepool_core::OwnerId;
use tidepool_core::RoleName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Random bytes in a generated password (hex doubles the length).
const PASSWORD_BYTES: usize = 12;
/// Random bytes suffixed to a database name.
const DATABASE_SUFFIX_BYTES: usize = 4;
/// Maximum sanitized-title length kept in derived names.
const MAX_TITLE_FRAGMENT: usize = 24;

// ============================================================================
// SECTION: Derivation
// ============================================================================

/// Sanitizes a project title into an identifier-safe fragment.
///
/// Every character outside `[A-Za-z0-9_]` becomes an underscore, the
/// result is lowercased, and long titles are truncated so derived names
/// stay inside the engine's identifier limit.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let mut sanitized: String = title
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect::<String>()
        .to_ascii_lowercase();
    sanitized.truncate(MAX_TITLE_FRAGMENT);
    if sanitized.is_empty() {
        sanitized.push_str("project");
    }
    sanitized
}

/// Derives the deterministic role name for an owner/title pair.
#[must_use]
pub fn derive_role_name(owner: &OwnerId, title: &str) -> RoleName {
    let owner_fragment = sanitize_title(owner.as_str());
    RoleName::new(format!("{owner_fragment}_{}", sanitize_title(title)))
}

/// Generates a unique database name from a sanitized title.
///
/// A random hex suffix keeps repeated titles from colliding.
#[must_use]
pub fn generate_database_name(title: &str) -> DatabaseName {
    let mut suffix = [0u8; DATABASE_SUFFIX_BYTES];
    OsRng.fill_bytes(&mut suffix);
    DatabaseName::new(format!("{}_{}_db", sanitize_title(title), hex(&suffix)))
}

/// Generates a fresh high-entropy password.
#[must_use]
pub fn generate_password() -> String {
    let mut bytes = [0u8; PASSWORD_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex(&bytes)
}

/// Hex-encodes a byte slice.
fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
