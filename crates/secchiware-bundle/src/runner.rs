// crates/secchiware-bundle/src/runner.rs
// ============================================================================
// Module: Test Runner
// Description: Selector resolution, execution planning, and probe evaluation.
// Purpose: Run selected tests sequentially and emit evidence reports.
// Dependencies: secchiware-core, serde_json, std::process
// ============================================================================

//! ## Overview
//! Planning resolves a selector against a snapshot before anything runs:
//! every unknown canonical name fails the whole request with no partial
//! execution. The resulting plan lists test sets in canonical order; the
//! runner then executes set setup, each test probe with timestamps captured
//! around the call, and set teardown. Setup or teardown failures mark the
//! set's selected tests inconclusive with an `additional_info.error` entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use secchiware_core::ExecutionSelector;
use secchiware_core::RESULT_FAILED;
use secchiware_core::RESULT_INCONCLUSIVE;
use secchiware_core::RESULT_PASSED;
use secchiware_core::SelectorError;
use secchiware_core::TestReport;
use secchiware_core::Timestamp;
use serde_json::Value;

use crate::definition::EnvVarExpect;
use crate::definition::ProbeDefinition;
use crate::discovery::Snapshot;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default command probe timeout in milliseconds.
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;
/// Poll interval while waiting on a command probe.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// SECTION: Execution Plan
// ============================================================================

/// One test scheduled for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTest {
    /// Canonical test path.
    pub name: String,
    /// Effective description (own or inherited from the set).
    pub description: String,
    /// Probe to evaluate.
    pub probe: ProbeDefinition,
}

/// One test set scheduled for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSet {
    /// Canonical set path.
    pub path: String,
    /// Set description.
    pub description: String,
    /// Probe run before the first selected test.
    pub setup: Option<ProbeDefinition>,
    /// Probe run after the last selected test.
    pub teardown: Option<ProbeDefinition>,
    /// Selected tests in canonical order.
    pub tests: Vec<PlannedTest>,
}

/// Ordered execution plan produced by selector resolution.
///
/// # Invariants
/// - Sets and their tests appear in canonical-name order.
/// - Every set contains at least one selected test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPlan {
    /// Test sets scheduled for execution.
    pub sets: Vec<PlannedSet>,
}

impl ExecutionPlan {
    /// Returns the number of scheduled tests.
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.sets.iter().map(|set| set.tests.len()).sum()
    }
}

// ============================================================================
// SECTION: Planning
// ============================================================================

/// Resolves a selector against a snapshot into an execution plan.
///
/// # Errors
///
/// Returns [`SelectorError::UnknownName`] when any selector entry names
/// nothing in the snapshot; no test runs in that case.
pub fn plan(snapshot: &Snapshot, selector: &ExecutionSelector) -> Result<ExecutionPlan, SelectorError> {
    let selected = if selector.is_constrained() {
        Some(resolve_selection(snapshot, selector)?)
    } else {
        None
    };
    let mut sets = Vec::new();
    for (module_path, module) in &snapshot.modules {
        for (set_name, set) in &module.sets {
            let set_path = format!("{module_path}.{set_name}");
            let mut tests = Vec::new();
            for (test_name, test) in &set.tests {
                let full = format!("{set_path}.{test_name}");
                let wanted = selected.as_ref().is_none_or(|names| names.contains(&full));
                if wanted {
                    tests.push(PlannedTest {
                        name: full,
                        description: test
                            .description
                            .clone()
                            .unwrap_or_else(|| set.description.clone()),
                        probe: test.probe.clone(),
                    });
                }
            }
            if !tests.is_empty() {
                sets.push(PlannedSet {
                    path: set_path,
                    description: set.description.clone(),
                    setup: set.setup.clone(),
                    teardown: set.teardown.clone(),
                    tests,
                });
            }
        }
    }
    Ok(ExecutionPlan {
        sets,
    })
}

/// Resolves every selector entry into the union of selected test names.
fn resolve_selection(
    snapshot: &Snapshot,
    selector: &ExecutionSelector,
) -> Result<BTreeSet<String>, SelectorError> {
    let mut selected = BTreeSet::new();
    for name in selector.packages() {
        if !snapshot.packages.contains(name.as_str()) {
            return Err(SelectorError::UnknownName(name.to_string()));
        }
        let prefix = format!("{name}.");
        for (module_path, module) in &snapshot.modules {
            if module_path.starts_with(&prefix) {
                collect_module_tests(module_path, module, &mut selected);
            }
        }
    }
    for name in selector.modules() {
        let module = snapshot
            .modules
            .get(name.as_str())
            .ok_or_else(|| SelectorError::UnknownName(name.to_string()))?;
        collect_module_tests(name.as_str(), module, &mut selected);
    }
    for name in selector.test_sets() {
        let Some((module_path, set_name)) = name.as_str().rsplit_once('.') else {
            return Err(SelectorError::UnknownName(name.to_string()));
        };
        let set = snapshot
            .modules
            .get(module_path)
            .and_then(|module| module.sets.get(set_name))
            .ok_or_else(|| SelectorError::UnknownName(name.to_string()))?;
        for test_name in set.tests.keys() {
            selected.insert(format!("{name}.{test_name}"));
        }
    }
    for name in selector.tests() {
        let Some((set_path, test_name)) = name.as_str().rsplit_once('.') else {
            return Err(SelectorError::UnknownName(name.to_string()));
        };
        let Some((module_path, set_name)) = set_path.rsplit_once('.') else {
            return Err(SelectorError::UnknownName(name.to_string()));
        };
        let known = snapshot
            .modules
            .get(module_path)
            .and_then(|module| module.sets.get(set_name))
            .is_some_and(|set| set.tests.contains_key(test_name));
        if !known {
            return Err(SelectorError::UnknownName(name.to_string()));
        }
        selected.insert(name.to_string());
    }
    Ok(selected)
}

/// Adds every test of a module to the selection.
fn collect_module_tests(
    module_path: &str,
    module: &crate::discovery::LoadedModule,
    selected: &mut BTreeSet<String>,
) {
    for (set_name, set) in &module.sets {
        for test_name in set.tests.keys() {
            selected.insert(format!("{module_path}.{set_name}.{test_name}"));
        }
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes a plan sequentially and returns one report per scheduled test.
#[must_use]
pub fn execute(plan: &ExecutionPlan) -> Vec<TestReport> {
    let mut reports = Vec::with_capacity(plan.test_count());
    for set in &plan.sets {
        if let Some(setup) = &set.setup
            && let Err(message) = run_step(setup)
        {
            let cause = format!("test set setup failed: {message}");
            for test in &set.tests {
                let stamp = Timestamp::now();
                reports.push(TestReport {
                    test_name: test.name.clone(),
                    test_description: test.description.clone(),
                    result_code: RESULT_INCONCLUSIVE,
                    timestamp_start: stamp,
                    timestamp_end: stamp,
                    additional_info: Some(TestReport::error_info(cause.clone())),
                });
            }
            continue;
        }
        let first_index = reports.len();
        for test in &set.tests {
            reports.push(run_test(test));
        }
        if let Some(teardown) = &set.teardown
            && let Err(message) = run_step(teardown)
        {
            let cause = format!("test set teardown failed: {message}");
            for report in reports.iter_mut().skip(first_index) {
                report.result_code = RESULT_INCONCLUSIVE;
                report
                    .additional_info
                    .get_or_insert_with(BTreeMap::new)
                    .insert("error".to_string(), Value::String(cause.clone()));
            }
        }
    }
    reports
}

/// Runs one test probe with timestamps captured around the call.
fn run_test(test: &PlannedTest) -> TestReport {
    let timestamp_start = Timestamp::now();
    let outcome = evaluate(&test.probe);
    let timestamp_end = Timestamp::now();
    let (result_code, additional_info) = match outcome {
        Ok(true) => (RESULT_PASSED, None),
        Ok(false) => (RESULT_FAILED, None),
        Err(message) => (RESULT_INCONCLUSIVE, Some(TestReport::error_info(message))),
    };
    TestReport {
        test_name: test.name.clone(),
        test_description: test.description.clone(),
        result_code,
        timestamp_start,
        timestamp_end,
        additional_info,
    }
}

/// Runs a setup/teardown probe; the step succeeds iff the probe condition holds.
fn run_step(probe: &ProbeDefinition) -> Result<(), String> {
    match evaluate(probe) {
        Ok(true) => Ok(()),
        Ok(false) => Err("probe condition not met".to_string()),
        Err(message) => Err(message),
    }
}

// ============================================================================
// SECTION: Probe Evaluation
// ============================================================================

/// Evaluates one probe; `Ok(met)` reports whether the condition holds.
fn evaluate(probe: &ProbeDefinition) -> Result<bool, String> {
    match probe {
        ProbeDefinition::EnvVar {
            name,
            expect,
            value,
        } => {
            let current = std::env::var_os(name);
            match expect {
                EnvVarExpect::Present => Ok(current.is_some()),
                EnvVarExpect::Absent => Ok(current.is_none()),
                EnvVarExpect::Equals => {
                    let expected = value
                        .as_deref()
                        .ok_or_else(|| "env_var equals probe missing value".to_string())?;
                    Ok(current.is_some_and(|actual| actual.to_string_lossy() == expected))
                }
            }
        }
        ProbeDefinition::FileExists {
            path,
        } => Ok(Path::new(path).exists()),
        ProbeDefinition::FileAbsent {
            path,
        } => Ok(!Path::new(path).exists()),
        ProbeDefinition::Command {
            program,
            args,
            timeout_ms,
        } => run_command(program, args, *timeout_ms),
        ProbeDefinition::CpuCountAtLeast {
            count,
        } => {
            let available = thread::available_parallelism()
                .map_err(|err| format!("cpu count unavailable: {err}"))?;
            let minimum = usize::try_from(*count)
                .map_err(|err| format!("cpu bound out of range: {err}"))?;
            Ok(available.get() >= minimum)
        }
        ProbeDefinition::UptimeAtLeast {
            seconds,
        } => {
            let uptime = host_uptime_secs()?;
            Ok(uptime >= *seconds)
        }
    }
}

/// Runs a command probe under its timeout.
fn run_command(program: &str, args: &[String], timeout_ms: Option<u64>) -> Result<bool, String> {
    let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| format!("command spawn failed: {err}"))?;
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.success()),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err("command timed out".to_string());
                }
                thread::sleep(COMMAND_POLL_INTERVAL);
            }
            Err(err) => return Err(format!("command wait failed: {err}")),
        }
    }
}

/// Reads host uptime in whole seconds (Linux `/proc/uptime`).
fn host_uptime_secs() -> Result<u64, String> {
    let raw = std::fs::read_to_string("/proc/uptime")
        .map_err(|err| format!("uptime unavailable: {err}"))?;
    let first = raw
        .split_whitespace()
        .next()
        .ok_or_else(|| "uptime unavailable: empty /proc/uptime".to_string())?;
    let seconds: f64 =
        first.parse().map_err(|_| "uptime unavailable: unparseable /proc/uptime".to_string())?;
    if seconds.is_sign_negative() {
        return Ok(0);
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Uptime fits u64 for any realistic host and negatives are handled above."
    )]
    let floored = seconds.floor() as u64;
    Ok(floored)
}

#[cfg(test)]
mod tests;
