// crates/tidepool-core/tests/allowlist.rs
// ============================================================================
// Module: Allow-List Normalization Tests
// Description: CIDR validation and normalization unit + property tests.
// Purpose: Ensure tenant-supplied sources are normalized or rejected.
// Dependencies: tidepool-core, proptest
// ============================================================================

//! ## Overview
//! Exercises [`tidepool_core::CidrRule::parse`] normalization rules: bare
//! IPv4 gains `/32`, `0.0.0.0` becomes the open CIDR, and malformed input
//! is rejected.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use proptest::prelude::proptest;
use tidepool_core::CidrRule;

#[test]
fn bare_ipv4_normalizes_to_slash_32() {
    let rule = CidrRule::parse("203.0.113.9").expect("parse");
    assert_eq!(rule.as_str(), "203.0.113.9/32");
}

#[test]
fn unspecified_address_normalizes_to_open_cidr() {
    let rule = CidrRule::parse("0.0.0.0").expect("parse");
    assert_eq!(rule.as_str(), "0.0.0.0/0");
}

#[test]
fn explicit_cidr_is_preserved() {
    let rule = CidrRule::parse("10.1.0.0/16").expect("parse");
    assert_eq!(rule.as_str(), "10.1.0.0/16");
}

#[test]
fn surrounding_whitespace_is_trimmed() {
    let rule = CidrRule::parse("  192.168.1.1 ").expect("parse");
    assert_eq!(rule.as_str(), "192.168.1.1/32");
}

#[test]
fn rejects_ipv6_addresses() {
    assert!(CidrRule::parse("::1").is_err());
    assert!(CidrRule::parse("2001:db8::/32").is_err());
}

#[test]
fn rejects_malformed_prefixes() {
    assert!(CidrRule::parse("10.0.0.0/33").is_err());
    assert!(CidrRule::parse("10.0.0.0/").is_err());
    assert!(CidrRule::parse("10.0.0.0/abc").is_err());
    assert!(CidrRule::parse("10.0.0.0/+1").is_err());
    assert!(CidrRule::parse("10.0.0.0/012").is_err());
}

#[test]
fn rejects_non_addresses() {
    assert!(CidrRule::parse("").is_err());
    assert!(CidrRule::parse("example.com").is_err());
    assert!(CidrRule::parse("300.1.1.1").is_err());
    assert!(CidrRule::parse("10.0.0").is_err());
}

proptest! {
    #[test]
    fn any_valid_ipv4_parses_with_slash_32_or_open(a: u8, b: u8, c: u8, d: u8) {
        let text = format!("{a}.{b}.{c}.{d}");
        let rule = CidrRule::parse(&text).expect("valid ipv4 must parse");
        if (a, b, c, d) == (0, 0, 0, 0) {
            assert_eq!(rule.as_str(), "0.0.0.0/0");
        } else {
            assert_eq!(rule.as_str(), format!("{text}/32"));
        }
    }

    #[test]
    fn any_valid_prefix_round_trips(a: u8, b: u8, c: u8, d: u8, bits in 0u8..=32) {
        let text = format!("{a}.{b}.{c}.{d}/{bits}");
        let rule = CidrRule::parse(&text).expect("valid cidr must parse");
        assert_eq!(rule.as_str(), text);
    }

    #[test]
    fn out_of_range_prefixes_are_rejected(bits in 33u8..=99) {
        assert!(CidrRule::parse(&format!("10.0.0.0/{bits}")).is_err());
    }
}
