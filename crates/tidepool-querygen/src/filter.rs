// crates/tidepool-querygen/src/filter.rs
// ============================================================================
// Module: Filtered Search Builder
// Description: Typed predicate AST rendered into a filtered SELECT.
// Purpose: Validate tenant filter descriptions exhaustively before rendering.
// Dependencies: crate::quote, serde
// ============================================================================

//! ## Overview
//! A filter is a list of predicates, each `field operator value` joined to
//! its successor by a connector. Validation rejects oversized lists, empty
//! fields or values, and missing connectors on non-final predicates; the
//! final predicate's connector is forced empty no matter what the caller
//! supplied. Operators and connectors are closed enums, so nothing outside
//! the allowed sets can reach the rendered statement.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::QueryError;
use crate::quote::quote_identifier;
use crate::quote::quote_literal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard cap on predicates per filter.
pub const MAX_FILTER_PREDICATES: usize = 50;
/// Hard cap on rows per page for paginated reads.
pub const MAX_PAGE_SIZE: u32 = 100;

// ============================================================================
// SECTION: Predicate AST
// ============================================================================

/// Comparison operators allowed in tenant filters.
///
/// # Invariants
/// - Variants are stable for serialization; wire forms are the SQL tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equality.
    #[serde(rename = "=")]
    Eq,
    /// Strictly less than.
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal.
    #[serde(rename = "<=")]
    Le,
    /// Strictly greater than.
    #[serde(rename = ">")]
    Gt,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    Ge,
    /// Inequality.
    #[serde(rename = "!=")]
    Ne,
}

impl FilterOperator {
    /// Returns the SQL token for this operator.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Ne => "!=",
        }
    }
}

/// Logical connector joining a predicate to its successor.
///
/// # Invariants
/// - `None` is only meaningful on the final predicate; the builder forces
///   it there regardless of caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connector {
    /// Logical AND.
    #[serde(rename = "AND")]
    And,
    /// Logical OR.
    #[serde(rename = "OR")]
    Or,
    /// No connector (final predicate).
    #[default]
    #[serde(rename = "")]
    None,
}

/// One tenant-supplied filter predicate.
///
/// # Invariants
/// - `field` and `value` must be non-empty; validation enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    /// Column the predicate compares.
    pub field: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Literal value compared against.
    pub value: String,
    /// Connector to the next predicate.
    #[serde(default)]
    pub connector: Connector,
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Validates predicates and renders a filtered `SELECT`.
///
/// # Errors
///
/// Returns [`QueryError`] when the list is empty or oversized, when any
/// predicate has an empty field or value, or when a non-final predicate
/// has no connector.
pub fn build_filtered_select(
    table: &str,
    predicates: &[FilterPredicate],
) -> Result<String, QueryError> {
    if predicates.is_empty() {
        return Err(QueryError::NoPredicates);
    }
    if predicates.len() > MAX_FILTER_PREDICATES {
        return Err(QueryError::TooManyPredicates {
            count: predicates.len(),
            max: MAX_FILTER_PREDICATES,
        });
    }
    for (index, predicate) in predicates.iter().enumerate() {
        if predicate.field.is_empty() {
            return Err(QueryError::EmptyField { index });
        }
        if predicate.value.is_empty() {
            return Err(QueryError::EmptyValue { index });
        }
        let is_last = index == predicates.len() - 1;
        if !is_last && predicate.connector == Connector::None {
            return Err(QueryError::MissingConnector { index });
        }
    }

    let mut sql = format!("SELECT * FROM {} WHERE", quote_identifier(table)?);
    for (index, predicate) in predicates.iter().enumerate() {
        sql.push(' ');
        sql.push_str(&quote_identifier(&predicate.field)?);
        sql.push(' ');
        sql.push_str(predicate.operator.as_sql());
        sql.push(' ');
        sql.push_str(&quote_literal(&predicate.value));
        let is_last = index == predicates.len() - 1;
        // The final connector is forced empty regardless of caller input.
        if !is_last {
            match predicate.connector {
                Connector::And => sql.push_str(" AND"),
                Connector::Or => sql.push_str(" OR"),
                Connector::None => {}
            }
        }
    }
    Ok(sql)
}

/// Renders a paginated full-table read.
///
/// # Errors
///
/// Returns [`QueryError::InvalidPage`] when `page` is zero or `limit` is
/// zero or above [`MAX_PAGE_SIZE`].
pub fn build_paginated_select(table: &str, page: u32, limit: u32) -> Result<String, QueryError> {
    if page == 0 || limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(QueryError::InvalidPage { page, limit });
    }
    let offset = u64::from(page - 1) * u64::from(limit);
    Ok(format!(
        "SELECT * FROM {} ORDER BY 1 LIMIT {limit} OFFSET {offset}",
        quote_identifier(table)?,
    ))
}
