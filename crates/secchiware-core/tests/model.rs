//! Data model integration tests for secchiware-core.
// crates/secchiware-core/tests/model.rs
// =============================================================================
// Module: Core Model Tests
// Description: Validate identifiers, selectors, timestamps, and wire forms.
// Purpose: Ensure the shared model serializes identically on both services.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use secchiware_core::CanonicalName;
use secchiware_core::ExecutionSelector;
use secchiware_core::ModuleInfo;
use secchiware_core::PackageInfo;
use secchiware_core::SelectorError;
use secchiware_core::TestInfo;
use secchiware_core::TestReport;
use secchiware_core::TestSetInfo;
use secchiware_core::Timestamp;
use secchiware_core::collect_test_names;
use secchiware_core::is_identifier;
use secchiware_core::parse_query_pairs;

// =============================================================================
// SECTION: Identifiers
// =============================================================================

#[test]
fn canonical_names_validate_segments() {
    assert!(CanonicalName::parse("p1.m.S.a").is_ok());
    assert!(CanonicalName::parse("_private.mod_2").is_ok());
    for bad in ["", "p1..m", "p1.-x", "1pkg", "p1.m x", "p1.m.S."] {
        assert!(CanonicalName::parse(bad).is_err(), "accepted: {bad}");
    }
    assert!(is_identifier("snake_case_2"));
    assert!(!is_identifier("kebab-case"));
}

#[test]
fn canonical_name_traversal_helpers() {
    let name = CanonicalName::parse("p1.m.S").expect("name");
    assert_eq!(name.depth(), 3);
    assert_eq!(name.segments().collect::<Vec<&str>>(), vec!["p1", "m", "S"]);
    assert_eq!(name.child("a").as_str(), "p1.m.S.a");
}

// =============================================================================
// SECTION: Selectors
// =============================================================================

#[test]
fn selector_parses_and_reemits_lists() {
    let pairs = parse_query_pairs("packages=p1,p2&tests=p1.m.S.a");
    let selector = ExecutionSelector::from_query_pairs(&pairs).expect("selector");
    assert!(selector.is_constrained());
    assert_eq!(selector.packages().len(), 2);
    assert_eq!(selector.tests().len(), 1);
    assert_eq!(
        selector.to_query_string().expect("query"),
        "packages=p1,p2&tests=p1.m.S.a"
    );
}

#[test]
fn selector_rejects_foreign_parameters_and_bad_names() {
    let unknown = ExecutionSelector::from_query_pairs(&[(
        "suites".to_string(),
        "p1".to_string(),
    )]);
    assert!(matches!(unknown, Err(SelectorError::UnknownParameter(_))));

    let invalid = ExecutionSelector::from_query_pairs(&[(
        "packages".to_string(),
        "p1,bad-name".to_string(),
    )]);
    assert!(matches!(invalid, Err(SelectorError::InvalidName(_))));
}

#[test]
fn unconstrained_selector_has_no_query_string() {
    let selector = ExecutionSelector::unconstrained();
    assert!(!selector.is_constrained());
    assert!(selector.to_query_string().is_none());

    let empty = ExecutionSelector::from_query_pairs(&[(
        "packages".to_string(),
        String::new(),
    )])
    .expect("selector");
    assert!(empty.is_constrained());
    assert_eq!(empty.to_query_string().expect("query"), "tests=");
}

// =============================================================================
// SECTION: Timestamps
// =============================================================================

#[test]
fn timestamps_emit_fixed_width_utc() {
    let stamp = Timestamp::parse("2024-01-01T00:00:00Z").expect("parse");
    assert_eq!(stamp.to_rfc3339().expect("format"), "2024-01-01T00:00:00.000000Z");
    let offset = Timestamp::parse("2024-01-01T01:30:00+01:30").expect("parse");
    assert_eq!(offset.to_rfc3339().expect("format"), "2024-01-01T00:00:00.000000Z");
    assert_eq!(stamp, offset);
}

#[test]
fn timestamp_text_ordering_matches_instant_ordering() {
    let earlier = Timestamp::parse("2024-01-01T00:00:00.5Z").expect("parse");
    let later = Timestamp::parse("2024-01-01T00:00:01Z").expect("parse");
    assert!(earlier < later);
    assert!(earlier.to_rfc3339().expect("format") < later.to_rfc3339().expect("format"));
}

// =============================================================================
// SECTION: Wire Forms
// =============================================================================

#[test]
fn report_serde_skips_absent_additional_info() {
    let report = TestReport {
        test_name: "p1.m.S.a".to_string(),
        test_description: "detects the proxy".to_string(),
        result_code: 1,
        timestamp_start: Timestamp::parse("2024-01-01T00:00:00Z").expect("parse"),
        timestamp_end: Timestamp::parse("2024-01-01T00:00:01Z").expect("parse"),
        additional_info: None,
    };
    let value = serde_json::to_value(&report).expect("serialize");
    assert!(value.get("additional_info").is_none());
    let decoded: TestReport = serde_json::from_value(value).expect("deserialize");
    assert_eq!(decoded, report);

    let with_info = TestReport {
        additional_info: Some(TestReport::error_info("setup failed")),
        ..report
    };
    let value = serde_json::to_value(&with_info).expect("serialize");
    assert_eq!(value["additional_info"]["error"], "setup failed");
}

#[test]
fn test_names_enumerate_depth_first() {
    let tree = vec![PackageInfo {
        name: "p1".to_string(),
        subpackages: vec![PackageInfo {
            name: "sub".to_string(),
            subpackages: Vec::new(),
            modules: vec![ModuleInfo {
                name: "inner".to_string(),
                test_sets: vec![TestSetInfo {
                    name: "S".to_string(),
                    description: "set".to_string(),
                    tests: vec![TestInfo {
                        name: "a".to_string(),
                        description: "set".to_string(),
                    }],
                }],
            }],
        }],
        modules: vec![ModuleInfo {
            name: "m".to_string(),
            test_sets: vec![TestSetInfo {
                name: "T".to_string(),
                description: "set".to_string(),
                tests: vec![TestInfo {
                    name: "b".to_string(),
                    description: "set".to_string(),
                }],
            }],
        }],
    }];
    assert_eq!(collect_test_names(&tree), vec!["p1.sub.inner.S.a", "p1.m.T.b"]);
}
