// crates/tidepool-querygen/src/update.rs
// ============================================================================
// Module: Bulk Update Builder
// Description: Set-based multi-row update rendered from per-row column maps.
// Purpose: Update arbitrary row counts in one round trip with safe quoting.
// Dependencies: crate::quote, serde
// ============================================================================

//! ## Overview
//! A bulk update names a table, a primary-key column, and per-row maps of
//! column to new value. The builder computes the union of mentioned
//! columns, renders one `VALUES` list joined against the target table by
//! primary key, and falls back to the existing value through `COALESCE`
//! for columns a row omits, so omission never nulls a cell. Columns whose
//! names carry a temporal hint coerce numeric-looking values as
//! epoch-millisecond timestamps and anything else as literal timestamp
//! text, accepting both client date strings and raw epoch values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::QueryError;
use crate::quote::quote_identifier;
use crate::quote::quote_literal;

// ============================================================================
// SECTION: Request Shape
// ============================================================================

/// One bulk update request.
///
/// # Invariants
/// - Outer map keys are primary-key values; inner maps hold only the
///   columns each row actually changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUpdate {
    /// Target table.
    pub table: String,
    /// Primary-key column joining the `VALUES` list to the table.
    pub primary_key: String,
    /// Per-row column updates, keyed by primary-key value.
    pub rows: BTreeMap<String, BTreeMap<String, String>>,
}

// ============================================================================
// SECTION: Temporal Coercion
// ============================================================================

/// Returns whether a column name hints at a temporal type.
fn is_temporal_column(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    name.ends_with("At") || lower.ends_with("_at") || lower.contains("time") || lower.contains("date")
}

/// Renders one cell value, coercing temporal columns.
///
/// Numeric-looking values on temporal columns are epoch milliseconds;
/// everything else on those columns is literal timestamp text.
fn render_value(column: &str, value: &str) -> String {
    if is_temporal_column(column) {
        if let Ok(millis) = value.parse::<i64>() {
            return format!("to_timestamp({millis} / 1000.0)");
        }
        return format!("{}::timestamp", quote_literal(value));
    }
    quote_literal(value)
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Validates a bulk update and renders a single set-based statement.
///
/// # Errors
///
/// Returns [`QueryError`] when no rows or columns are named or when an
/// identifier is invalid.
pub fn build_bulk_update(request: &BulkUpdate) -> Result<String, QueryError> {
    if request.rows.is_empty() {
        return Err(QueryError::NoRows);
    }
    let columns: BTreeSet<&str> = request
        .rows
        .values()
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    if columns.is_empty() {
        return Err(QueryError::NoColumns);
    }

    let quoted_pk = quote_identifier(&request.primary_key)?;
    let quoted_table = quote_identifier(&request.table)?;
    let quoted_columns = columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Result<Vec<_>, _>>()?;

    let mut header_columns = vec![quoted_pk.clone()];
    header_columns.extend(quoted_columns.iter().cloned());

    let mut value_rows = Vec::with_capacity(request.rows.len());
    for (pk_value, row) in &request.rows {
        let mut cells = vec![quote_literal(pk_value)];
        for column in &columns {
            // Omitted columns render NULL; COALESCE in the SET clause
            // falls back to the row's existing value.
            match row.get(*column) {
                Some(value) => cells.push(render_value(column, value)),
                None => cells.push("NULL".to_string()),
            }
        }
        value_rows.push(format!("({})", cells.join(", ")));
    }

    let assignments = quoted_columns
        .iter()
        .map(|column| format!("{column} = COALESCE(u.{column}, t.{column})"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "WITH updated_data ({header}) AS (VALUES {values}) \
         UPDATE {table} AS t SET {assignments} \
         FROM updated_data AS u WHERE t.{pk} = u.{pk}",
        header = header_columns.join(", "),
        values = value_rows.join(", "),
        table = quoted_table,
        pk = quoted_pk,
    ))
}
