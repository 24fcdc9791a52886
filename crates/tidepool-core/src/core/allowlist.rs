// crates/tidepool-core/src/core/allowlist.rs
// ============================================================================
// Module: Network Allow-List
// Description: Whitelisted network rules and CIDR normalization.
// Purpose: Validate tenant-supplied sources before they reach engine config.
// Dependencies: crate::core::identifiers, serde, thiserror
// ============================================================================

//! ## Overview
//! Tenants declare which network sources may reach their databases. Rules
//! are validated and normalized at the boundary: a bare IPv4 address gains
//! a `/32` suffix, the special `0.0.0.0` entry normalizes to the open
//! `0.0.0.0/0`, and anything else that is not a well-formed IPv4 CIDR is
//! rejected before it is stored. A rule only becomes `is_active` after the
//! reconciler has written it into the engine's live host-based
//! authentication configuration and reloaded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::net::Ipv4Addr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::DatabaseName;
use crate::core::identifiers::ProjectId;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::WhitelistRuleId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Allow-list validation errors.
///
/// # Invariants
/// - Variants are stable for client-visible validation messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllowlistError {
    /// Input is not an IPv4 address or IPv4 CIDR.
    #[error("not a valid ipv4 address or cidr: {0}")]
    NotIpv4(String),
    /// CIDR prefix length is malformed or out of range.
    #[error("invalid cidr prefix: {0}")]
    InvalidPrefix(String),
}

// ============================================================================
// SECTION: CIDR Rules
// ============================================================================

/// Normalized IPv4 CIDR literal.
///
/// # Invariants
/// - Always carries an explicit prefix length between 0 and 32.
/// - Construction goes through [`CidrRule::parse`]; the stored form is the
///   normalized text written into engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CidrRule(String);

impl CidrRule {
    /// Parses and normalizes a tenant-supplied IPv4 address or CIDR.
    ///
    /// Bare addresses normalize to `/32`; the special `0.0.0.0` entry
    /// normalizes to `0.0.0.0/0`.
    ///
    /// # Errors
    ///
    /// Returns [`AllowlistError`] when the input is not IPv4 or carries a
    /// malformed prefix.
    pub fn parse(input: &str) -> Result<Self, AllowlistError> {
        let trimmed = input.trim();
        if let Some((address, prefix)) = trimmed.split_once('/') {
            let parsed: Ipv4Addr = address
                .parse()
                .map_err(|_| AllowlistError::NotIpv4(trimmed.to_string()))?;
            if prefix.is_empty() || prefix.len() > 2 || !prefix.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(AllowlistError::InvalidPrefix(trimmed.to_string()));
            }
            let bits: u8 = prefix
                .parse()
                .map_err(|_| AllowlistError::InvalidPrefix(trimmed.to_string()))?;
            if bits > 32 {
                return Err(AllowlistError::InvalidPrefix(trimmed.to_string()));
            }
            return Ok(Self(format!("{parsed}/{bits}")));
        }
        let parsed: Ipv4Addr = trimmed
            .parse()
            .map_err(|_| AllowlistError::NotIpv4(trimmed.to_string()))?;
        if parsed == Ipv4Addr::UNSPECIFIED {
            return Ok(Self("0.0.0.0/0".to_string()));
        }
        Ok(Self(format!("{parsed}/32")))
    }

    /// Returns the normalized CIDR text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CidrRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Whitelist Rules
// ============================================================================

/// Persistent allow-list entry for one project database.
///
/// # Invariants
/// - `is_active` is false until the rule has been written into the engine's
///   live configuration and the configuration reload succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistRule {
    /// Rule identifier.
    pub id: WhitelistRuleId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Target database.
    pub database_name: DatabaseName,
    /// Normalized source CIDR.
    pub cidr: CidrRule,
    /// Whether the rule is present in the enforced engine configuration.
    pub is_active: bool,
}

/// Whitelist rule joined with the owning project's role.
///
/// # Invariants
/// - `role` is the role bound to the rule's project at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBinding {
    /// Allow-list rule.
    pub rule: WhitelistRule,
    /// Role the rule authenticates.
    pub role: RoleName,
}
