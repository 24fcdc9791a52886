// crates/tidepool-querygen/tests/proptest_quote.rs
// ============================================================================
// Module: Quoting Property Tests
// Description: Property tests for identifier/literal quoting and filters.
// Purpose: Ensure no tenant input can escape its quoted position.
// Dependencies: tidepool-querygen, proptest
// ============================================================================

//! ## Overview
//! Property suites over [`tidepool_querygen::quote_literal`],
//! [`tidepool_querygen::quote_identifier`], and the filter builder's
//! forced-empty final connector.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only panic-based assertions are permitted."
)]

use proptest::prelude::proptest;
use tidepool_querygen::Connector;
use tidepool_querygen::FilterOperator;
use tidepool_querygen::FilterPredicate;
use tidepool_querygen::build_filtered_select;
use tidepool_querygen::quote_identifier;
use tidepool_querygen::quote_literal;

/// Reverses literal quoting: strips the wrapper and undoubles quotes.
fn unquote_literal(quoted: &str) -> String {
    let body = quoted
        .strip_prefix('E')
        .unwrap_or(quoted)
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .expect("wrapped in single quotes");
    let undoubled = body.replace("''", "'");
    if quoted.starts_with('E') { undoubled.replace("\\\\", "\\") } else { undoubled }
}

proptest! {
    #[test]
    fn literal_quoting_round_trips(value in ".*") {
        let quoted = quote_literal(&value);
        assert_eq!(unquote_literal(&quoted), value);
    }

    #[test]
    fn quoted_literals_never_leave_a_lone_quote(value in ".*") {
        let quoted = quote_literal(&value);
        let body = &quoted[quoted.find('\'').expect("open quote") + 1 .. quoted.len() - 1];
        // Every quote inside the body must be part of a doubled pair.
        let mut chars = body.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                assert_eq!(chars.next(), Some('\''), "unescaped quote in {quoted:?}");
            }
        }
    }

    #[test]
    fn identifier_quoting_round_trips(name in "[^\u{0}]+") {
        let quoted = quote_identifier(&name).expect("quote");
        let body = quoted
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .expect("wrapped in double quotes");
        assert_eq!(body.replace("\"\"", "\""), name);
    }

    #[test]
    fn final_connector_never_renders(connector in proptest::sample::select(vec![
        Connector::And,
        Connector::Or,
        Connector::None,
    ])) {
        let predicates = vec![FilterPredicate {
            field: "status".to_string(),
            operator: FilterOperator::Eq,
            value: "open".to_string(),
            connector,
        }];
        let sql = build_filtered_select("events", &predicates).expect("build");
        assert!(sql.ends_with("'open'"), "trailing connector leaked: {sql}");
    }
}
