// crates/secchiware-core/src/core/selector.rs
// ============================================================================
// Module: Secchiware Execution Selector
// Description: Query language selecting which installed tests to run.
// Purpose: Parse and re-emit the four selector lists with strict validation.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! `GET /reports` accepts four optional comma-separated lists of canonical
//! names: `packages`, `modules`, `test_sets`, and `tests`. The selected tests
//! are the union of everything matched by any list; with no selector present,
//! every installed test runs. Unknown parameters and malformed names fail the
//! whole request. Resolution against an installed tree happens in the loader;
//! this module owns parsing and the wire form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::CanonicalName;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced when parsing or resolving execution selectors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Query contained a parameter outside the selector language.
    #[error("unknown query parameter: {0}")]
    UnknownParameter(String),
    /// A selector entry was not a valid canonical name.
    #[error("invalid canonical name: {0}")]
    InvalidName(String),
    /// A selector entry named nothing in the installed tree.
    #[error("unknown canonical name: {0}")]
    UnknownName(String),
}

// ============================================================================
// SECTION: Query Splitting
// ============================================================================

/// Splits a raw query string into key/value pairs.
///
/// Values are carried verbatim; canonical names never require encoding. A
/// parameter without `=` yields an empty value.
#[must_use]
pub fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

// ============================================================================
// SECTION: Selector
// ============================================================================

/// Parsed execution selector.
///
/// # Invariants
/// - All contained names are valid canonical names.
/// - `is_constrained()` is true iff any selector parameter was present,
///   even with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSelector {
    /// Selected package paths.
    packages: Vec<CanonicalName>,
    /// Selected module paths.
    modules: Vec<CanonicalName>,
    /// Selected test-set paths.
    test_sets: Vec<CanonicalName>,
    /// Selected test paths.
    tests: Vec<CanonicalName>,
    /// True when any selector parameter was present in the query.
    constrained: bool,
}

impl ExecutionSelector {
    /// Returns the selector matching every installed test.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// Parses a selector from decoded query pairs.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::UnknownParameter`] for parameters outside the
    /// selector language and [`SelectorError::InvalidName`] for malformed
    /// canonical names.
    pub fn from_query_pairs(pairs: &[(String, String)]) -> Result<Self, SelectorError> {
        let mut selector = Self::default();
        for (key, value) in pairs {
            let target = match key.as_str() {
                "packages" => &mut selector.packages,
                "modules" => &mut selector.modules,
                "test_sets" => &mut selector.test_sets,
                "tests" => &mut selector.tests,
                other => return Err(SelectorError::UnknownParameter(other.to_string())),
            };
            selector.constrained = true;
            for item in value.split(',') {
                if item.is_empty() {
                    continue;
                }
                let name = CanonicalName::parse(item)
                    .map_err(|_| SelectorError::InvalidName(item.to_string()))?;
                target.push(name);
            }
        }
        Ok(selector)
    }

    /// Returns the selected package paths.
    #[must_use]
    pub fn packages(&self) -> &[CanonicalName] {
        &self.packages
    }

    /// Returns the selected module paths.
    #[must_use]
    pub fn modules(&self) -> &[CanonicalName] {
        &self.modules
    }

    /// Returns the selected test-set paths.
    #[must_use]
    pub fn test_sets(&self) -> &[CanonicalName] {
        &self.test_sets
    }

    /// Returns the selected test paths.
    #[must_use]
    pub fn tests(&self) -> &[CanonicalName] {
        &self.tests
    }

    /// Returns true when any selector parameter was present.
    #[must_use]
    pub const fn is_constrained(&self) -> bool {
        self.constrained
    }

    /// Re-emits the selector as a query string for forwarding.
    ///
    /// Returns `None` for the unconstrained selector. A constrained selector
    /// with no names re-emits as an empty `tests=` list so the receiver also
    /// selects zero tests.
    #[must_use]
    pub fn to_query_string(&self) -> Option<String> {
        if !self.constrained {
            return None;
        }
        let mut parts = Vec::new();
        for (key, names) in [
            ("packages", &self.packages),
            ("modules", &self.modules),
            ("test_sets", &self.test_sets),
            ("tests", &self.tests),
        ] {
            if names.is_empty() {
                continue;
            }
            let joined =
                names.iter().map(CanonicalName::as_str).collect::<Vec<&str>>().join(",");
            parts.push(format!("{key}={joined}"));
        }
        if parts.is_empty() {
            return Some("tests=".to_string());
        }
        Some(parts.join("&"))
    }
}
