// crates/secchiware-core/src/core/report.rs
// ============================================================================
// Module: Secchiware Test Reports
// Description: Evidence record emitted by one test run.
// Purpose: Carry test outcomes from Node to C2 and into durable history.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`TestReport`] is the evidence record produced by running one test:
//! canonical test name, description, a signed result code, start/end
//! timestamps captured around the probe call, and optional free-form
//! additional information. Result code conventions: positive means the test
//! passed (the detection fired), zero means inconclusive, negative means the
//! detection did not fire.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Result Codes
// ============================================================================

/// Result code recorded when a test passed.
pub const RESULT_PASSED: i64 = 1;
/// Result code recorded when a test was inconclusive.
pub const RESULT_INCONCLUSIVE: i64 = 0;
/// Result code recorded when a test failed.
pub const RESULT_FAILED: i64 = -1;

// ============================================================================
// SECTION: Test Report
// ============================================================================

/// Evidence record from one test execution.
///
/// # Invariants
/// - `timestamp_end >= timestamp_start`.
/// - `test_name` is the canonical dotted path of the executed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Canonical dotted path of the executed test.
    pub test_name: String,
    /// Human description of the test.
    pub test_description: String,
    /// Signed result code (>0 passed, =0 inconclusive, <0 failed).
    pub result_code: i64,
    /// Instant immediately before the probe ran.
    pub timestamp_start: Timestamp,
    /// Instant immediately after the probe returned.
    pub timestamp_end: Timestamp,
    /// Optional free-form structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<BTreeMap<String, Value>>,
}

impl TestReport {
    /// Returns true when the result code records a pass.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.result_code > 0
    }

    /// Returns true when the result code records an inconclusive outcome.
    #[must_use]
    pub const fn inconclusive(&self) -> bool {
        self.result_code == 0
    }

    /// Returns an `additional_info` mapping containing a single error entry.
    #[must_use]
    pub fn error_info(message: impl Into<String>) -> BTreeMap<String, Value> {
        let mut info = BTreeMap::new();
        info.insert("error".to_string(), Value::String(message.into()));
        info
    }
}
