// crates/tidepool-querygen/src/lib.rs
// ============================================================================
// Module: Tidepool Query Builder
// Description: Tenant-driven filtered search and bulk update rendering.
// Purpose: Turn structured query descriptions into injection-safe SQL.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Tenants describe ad-hoc searches and bulk updates as structured data;
//! this crate validates those descriptions exhaustively and renders SQL
//! through identifier and literal quoting primitives. Nothing here is ever
//! assembled by raw interpolation of tenant input, and validation failures
//! are client-visible errors raised before any statement reaches the
//! engine.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod filter;
pub mod quote;
pub mod update;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use filter::Connector;
pub use filter::FilterOperator;
pub use filter::FilterPredicate;
pub use filter::MAX_FILTER_PREDICATES;
pub use filter::build_filtered_select;
pub use filter::build_paginated_select;
pub use quote::quote_identifier;
pub use quote::quote_literal;
pub use update::BulkUpdate;
pub use update::build_bulk_update;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Query construction errors. All variants are client-visible validation
/// failures, not engine errors.
///
/// # Invariants
/// - Variants are stable for client-visible messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Predicate count exceeds the hard cap.
    #[error("too many predicates: {count} (max {max})")]
    TooManyPredicates {
        /// Supplied predicate count.
        count: usize,
        /// Hard cap.
        max: usize,
    },
    /// A predicate carries an empty field name.
    #[error("predicate {index} has an empty field")]
    EmptyField {
        /// Zero-based predicate index.
        index: usize,
    },
    /// A predicate carries an empty value.
    #[error("predicate {index} has an empty value")]
    EmptyValue {
        /// Zero-based predicate index.
        index: usize,
    },
    /// A non-final predicate carries an empty connector.
    #[error("predicate {index} is missing a connector")]
    MissingConnector {
        /// Zero-based predicate index.
        index: usize,
    },
    /// An identifier is empty or contains a NUL byte.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    /// The filter list is empty.
    #[error("at least one predicate is required")]
    NoPredicates,
    /// The bulk update names no rows.
    #[error("bulk update names no rows")]
    NoRows,
    /// The bulk update rows name no columns.
    #[error("bulk update names no columns")]
    NoColumns,
    /// Pagination bounds are out of range.
    #[error("invalid page bounds: page {page}, limit {limit}")]
    InvalidPage {
        /// One-based page number.
        page: u32,
        /// Page size.
        limit: u32,
    },
}
