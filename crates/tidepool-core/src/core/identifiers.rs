// crates/tidepool-core/src/core/identifiers.rs
// ============================================================================
// Module: Tidepool Identifiers
// Description: Canonical opaque identifiers for projects, roles, and databases.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout Tidepool.
//! Project and owner identifiers are opaque strings issued by the registry;
//! role and database names are engine identifiers generated by the
//! provisioner. Numeric identifiers (jobs, rules, backups) are row ids
//! assigned by the durable store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: String Identifiers
// ============================================================================

/// Declares an opaque string identifier newtype.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

string_identifier! {
    /// Tenant project identifier issued by the registry.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    ProjectId
}

string_identifier! {
    /// Owning platform-user identifier.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization or validation is applied by this type.
    OwnerId
}

string_identifier! {
    /// Engine role name assigned to a project at provisioning time.
    ///
    /// # Invariants
    /// - Generated by the provisioner from sanitized inputs; safe as an SQL identifier.
    RoleName
}

string_identifier! {
    /// Engine database name assigned at provisioning time.
    ///
    /// # Invariants
    /// - Generated by the provisioner from sanitized inputs; safe as an SQL identifier.
    DatabaseName
}

// ============================================================================
// SECTION: Numeric Identifiers
// ============================================================================

/// Declares a numeric row-id newtype assigned by the durable store.
macro_rules! row_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates a new identifier from a raw row id.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw row id.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

row_identifier! {
    /// Queue job identifier.
    ///
    /// # Invariants
    /// - Assigned by the job store; unique within the store lifetime.
    JobId
}

row_identifier! {
    /// Whitelist rule identifier.
    ///
    /// # Invariants
    /// - Assigned by the registry store; unique within the store lifetime.
    WhitelistRuleId
}

row_identifier! {
    /// Backup record identifier.
    ///
    /// # Invariants
    /// - Assigned by the registry store; unique within the store lifetime.
    BackupId
}
