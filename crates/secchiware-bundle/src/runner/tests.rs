// crates/secchiware-bundle/src/runner/tests.rs
// ============================================================================
// Module: Runner Unit Tests
// Description: Unit tests for planning, selection, and probe execution.
// Purpose: Validate selector semantics and report generation.
// Dependencies: secchiware-bundle
// ============================================================================

//! ## Overview
//! Exercises selector resolution (union, unknown names, zero matches),
//! canonical ordering, setup/teardown failure handling, and report
//! timestamp invariants.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use secchiware_core::ExecutionSelector;
use secchiware_core::RESULT_FAILED;
use secchiware_core::RESULT_INCONCLUSIVE;
use secchiware_core::RESULT_PASSED;
use secchiware_core::SelectorError;

use super::execute;
use super::plan;
use crate::definition::EnvVarExpect;
use crate::definition::ProbeDefinition;
use crate::definition::TestDefinition;
use crate::definition::TestSetDefinition;
use crate::discovery::LoadedModule;
use crate::discovery::Snapshot;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Environment variable that no harness is expected to define.
const UNLIKELY_VAR: &str = "SECCHIWARE_TEST_VARIABLE_THAT_DOES_NOT_EXIST";

fn absent_env_probe() -> ProbeDefinition {
    ProbeDefinition::EnvVar {
        name: UNLIKELY_VAR.to_string(),
        expect: EnvVarExpect::Absent,
        value: None,
    }
}

fn failing_command_probe() -> ProbeDefinition {
    ProbeDefinition::Command {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "exit 1".to_string()],
        timeout_ms: Some(5_000),
    }
}

fn test(probe: ProbeDefinition) -> TestDefinition {
    TestDefinition {
        description: None,
        probe,
    }
}

fn set_of(tests: Vec<(&str, TestDefinition)>) -> TestSetDefinition {
    TestSetDefinition {
        description: "fixture set".to_string(),
        setup: None,
        teardown: None,
        tests: tests.into_iter().map(|(name, test)| (name.to_string(), test)).collect(),
    }
}

/// Snapshot with tests `p1.m.S.a`, `p1.m.S.b`, and `p2.m.T.c`.
fn two_package_snapshot() -> Snapshot {
    let mut modules = BTreeMap::new();
    modules.insert(
        "p1.m".to_string(),
        LoadedModule {
            sets: BTreeMap::from([(
                "S".to_string(),
                set_of(vec![
                    ("a", test(absent_env_probe())),
                    ("b", test(absent_env_probe())),
                ]),
            )]),
        },
    );
    modules.insert(
        "p2.m".to_string(),
        LoadedModule {
            sets: BTreeMap::from([("T".to_string(), set_of(vec![("c", test(absent_env_probe()))]))]),
        },
    );
    Snapshot {
        tree: Vec::new(),
        packages: BTreeSet::from(["p1".to_string(), "p2".to_string()]),
        modules,
    }
}

fn selector(pairs: &[(&str, &str)]) -> ExecutionSelector {
    let pairs: Vec<(String, String)> =
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    ExecutionSelector::from_query_pairs(&pairs).expect("selector")
}

// ============================================================================
// SECTION: Planning
// ============================================================================

#[test]
fn unconstrained_selector_plans_every_test_in_order() {
    let snapshot = two_package_snapshot();
    let plan = plan(&snapshot, &ExecutionSelector::unconstrained()).expect("plan");
    let names: Vec<&str> =
        plan.sets.iter().flat_map(|set| set.tests.iter().map(|test| test.name.as_str())).collect();
    assert_eq!(names, vec!["p1.m.S.a", "p1.m.S.b", "p2.m.T.c"]);
}

#[test]
fn test_set_selector_picks_exactly_its_tests() {
    let snapshot = two_package_snapshot();
    let plan = plan(&snapshot, &selector(&[("test_sets", "p1.m.S")])).expect("plan");
    let reports = execute(&plan);
    let names: Vec<&str> = reports.iter().map(|report| report.test_name.as_str()).collect();
    assert_eq!(names, vec!["p1.m.S.a", "p1.m.S.b"]);
}

#[test]
fn selectors_union_across_lists() {
    let snapshot = two_package_snapshot();
    let plan =
        plan(&snapshot, &selector(&[("tests", "p1.m.S.a"), ("packages", "p2")])).expect("plan");
    let names: Vec<&str> =
        plan.sets.iter().flat_map(|set| set.tests.iter().map(|test| test.name.as_str())).collect();
    assert_eq!(names, vec!["p1.m.S.a", "p2.m.T.c"]);
}

#[test]
fn unknown_name_fails_the_whole_request() {
    let snapshot = two_package_snapshot();
    for pairs in [
        [("packages", "p3")],
        [("modules", "p1.n")],
        [("test_sets", "p1.m.X")],
        [("tests", "p1.m.S.z")],
        [("tests", "orphan")],
    ] {
        let result = plan(&snapshot, &selector(&pairs));
        assert!(matches!(result, Err(SelectorError::UnknownName(_))), "pairs: {pairs:?}");
    }
}

#[test]
fn empty_selection_yields_empty_plan() {
    let snapshot = two_package_snapshot();
    let plan = plan(&snapshot, &selector(&[("packages", "")])).expect("plan");
    assert_eq!(plan.test_count(), 0);
    assert!(execute(&plan).is_empty());
}

// ============================================================================
// SECTION: Execution
// ============================================================================

#[test]
fn reports_carry_ordered_timestamps() {
    let snapshot = two_package_snapshot();
    let plan = plan(&snapshot, &ExecutionSelector::unconstrained()).expect("plan");
    let reports = execute(&plan);
    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert!(report.timestamp_end >= report.timestamp_start);
        assert_eq!(report.result_code, RESULT_PASSED);
    }
}

#[test]
fn failed_probe_reports_negative_code() {
    let mut modules = BTreeMap::new();
    modules.insert(
        "p.m".to_string(),
        LoadedModule {
            sets: BTreeMap::from([(
                "S".to_string(),
                set_of(vec![("fails", test(failing_command_probe()))]),
            )]),
        },
    );
    let snapshot = Snapshot {
        tree: Vec::new(),
        packages: BTreeSet::from(["p".to_string()]),
        modules,
    };
    let reports = execute(&plan(&snapshot, &ExecutionSelector::unconstrained()).expect("plan"));
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result_code, RESULT_FAILED);
}

#[test]
fn broken_probe_reports_inconclusive_with_error() {
    let broken = ProbeDefinition::Command {
        program: "secchiware-no-such-binary".to_string(),
        args: Vec::new(),
        timeout_ms: Some(1_000),
    };
    let mut modules = BTreeMap::new();
    modules.insert(
        "p.m".to_string(),
        LoadedModule {
            sets: BTreeMap::from([("S".to_string(), set_of(vec![("broken", test(broken))]))]),
        },
    );
    let snapshot = Snapshot {
        tree: Vec::new(),
        packages: BTreeSet::from(["p".to_string()]),
        modules,
    };
    let reports = execute(&plan(&snapshot, &ExecutionSelector::unconstrained()).expect("plan"));
    assert_eq!(reports[0].result_code, RESULT_INCONCLUSIVE);
    let info = reports[0].additional_info.as_ref().expect("info");
    assert!(info.contains_key("error"));
}

#[test]
fn setup_failure_marks_tests_inconclusive() {
    let mut set = set_of(vec![("a", test(absent_env_probe())), ("b", test(absent_env_probe()))]);
    set.setup = Some(failing_command_probe());
    let mut modules = BTreeMap::new();
    modules.insert(
        "p.m".to_string(),
        LoadedModule {
            sets: BTreeMap::from([("S".to_string(), set)]),
        },
    );
    let snapshot = Snapshot {
        tree: Vec::new(),
        packages: BTreeSet::from(["p".to_string()]),
        modules,
    };
    let reports = execute(&plan(&snapshot, &ExecutionSelector::unconstrained()).expect("plan"));
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.result_code, RESULT_INCONCLUSIVE);
        let info = report.additional_info.as_ref().expect("info");
        let message = info.get("error").and_then(|value| value.as_str()).expect("error entry");
        assert!(message.contains("setup failed"));
    }
}

#[test]
fn teardown_failure_overrides_results() {
    let mut set = set_of(vec![("a", test(absent_env_probe()))]);
    set.teardown = Some(failing_command_probe());
    let mut modules = BTreeMap::new();
    modules.insert(
        "p.m".to_string(),
        LoadedModule {
            sets: BTreeMap::from([("S".to_string(), set)]),
        },
    );
    let snapshot = Snapshot {
        tree: Vec::new(),
        packages: BTreeSet::from(["p".to_string()]),
        modules,
    };
    let reports = execute(&plan(&snapshot, &ExecutionSelector::unconstrained()).expect("plan"));
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result_code, RESULT_INCONCLUSIVE);
    let info = reports[0].additional_info.as_ref().expect("info");
    let message = info.get("error").and_then(|value| value.as_str()).expect("error entry");
    assert!(message.contains("teardown failed"));
}
