// crates/tidepool-querygen/tests/update_unit.rs
// ============================================================================
// Module: Bulk Update Builder Tests
// Description: Column union, COALESCE fallback, and temporal coercion tests.
// Purpose: Pin the set-based update contract for partial per-row columns.
// Dependencies: tidepool-querygen
// ============================================================================

//! ## Overview
//! Exercises [`tidepool_querygen::build_bulk_update`]: rows omitting a
//! column must leave it unchanged, and temporal columns must accept both
//! epoch milliseconds and date text.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use tidepool_querygen::BulkUpdate;
use tidepool_querygen::QueryError;
use tidepool_querygen::build_bulk_update;

fn row(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(column, value)| ((*column).to_string(), (*value).to_string()))
        .collect()
}

#[test]
fn updates_all_rows_in_one_statement() {
    let request = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: [
            ("1".to_string(), row(&[("name", "Ada")])),
            ("2".to_string(), row(&[("name", "Grace")])),
        ]
        .into_iter()
        .collect(),
    };
    let sql = build_bulk_update(&request).expect("build");
    assert!(sql.starts_with("WITH updated_data (\"id\", \"name\") AS (VALUES"), "got: {sql}");
    assert!(sql.contains("('1', 'Ada')"));
    assert!(sql.contains("('2', 'Grace')"));
    assert!(sql.contains("UPDATE \"contacts\" AS t SET \"name\" = COALESCE(u.\"name\", t.\"name\")"));
    assert!(sql.ends_with("WHERE t.\"id\" = u.\"id\""));
}

#[test]
fn omitted_columns_fall_back_to_existing_values() {
    // Three rows touch {name, updatedAt}; row 2 omits updatedAt. Its cell
    // must render NULL so COALESCE keeps the stored value.
    let request = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: [
            ("1".to_string(), row(&[("name", "Ada"), ("updatedAt", "1700000000000")])),
            ("2".to_string(), row(&[("name", "Grace")])),
            ("3".to_string(), row(&[("name", "Edsger"), ("updatedAt", "1700000300000")])),
        ]
        .into_iter()
        .collect(),
    };
    let sql = build_bulk_update(&request).expect("build");
    assert!(sql.contains("('2', 'Grace', NULL)"), "got: {sql}");
    assert!(sql.contains("\"updatedAt\" = COALESCE(u.\"updatedAt\", t.\"updatedAt\")"));
    assert!(sql.contains("\"name\" = COALESCE(u.\"name\", t.\"name\")"));
}

#[test]
fn temporal_columns_accept_epoch_millis() {
    let request = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: [("1".to_string(), row(&[("updatedAt", "1700000000000")]))]
            .into_iter()
            .collect(),
    };
    let sql = build_bulk_update(&request).expect("build");
    assert!(sql.contains("to_timestamp(1700000000000 / 1000.0)"), "got: {sql}");
}

#[test]
fn temporal_columns_accept_date_text() {
    let request = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: [("1".to_string(), row(&[("created_at", "2026-01-02 03:04:05")]))]
            .into_iter()
            .collect(),
    };
    let sql = build_bulk_update(&request).expect("build");
    assert!(sql.contains("'2026-01-02 03:04:05'::timestamp"), "got: {sql}");
}

#[test]
fn non_temporal_numeric_values_stay_literals() {
    let request = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: [("1".to_string(), row(&[("age", "41")]))].into_iter().collect(),
    };
    let sql = build_bulk_update(&request).expect("build");
    assert!(sql.contains("('1', '41')"), "got: {sql}");
}

#[test]
fn rejects_empty_requests() {
    let no_rows = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: BTreeMap::new(),
    };
    assert_eq!(build_bulk_update(&no_rows), Err(QueryError::NoRows));

    let no_columns = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: [("1".to_string(), BTreeMap::new())].into_iter().collect(),
    };
    assert_eq!(build_bulk_update(&no_columns), Err(QueryError::NoColumns));
}

#[test]
fn hostile_primary_key_values_are_quoted() {
    let request = BulkUpdate {
        table: "contacts".to_string(),
        primary_key: "id".to_string(),
        rows: [("1'; --".to_string(), row(&[("name", "Ada")]))].into_iter().collect(),
    };
    let sql = build_bulk_update(&request).expect("build");
    assert!(sql.contains("('1''; --', 'Ada')"), "got: {sql}");
}
