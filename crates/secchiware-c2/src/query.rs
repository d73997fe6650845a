// crates/secchiware-c2/src/query.rs
// ============================================================================
// Module: Query Parameter Validation
// Description: Strict parsers for the searchable endpoint parameters.
// Purpose: Reject unknown or malformed filter parameters with 400.
// Dependencies: secchiware-core
// ============================================================================

//! ## Overview
//! The searchable endpoints validate every query parameter strictly: unknown
//! names, unparseable values, unknown `order_by` columns, and bad `arrange`
//! directions all fail the request with 400. These helpers parse the shared
//! primitive shapes; each endpoint assembles its own typed query.

// ============================================================================
// SECTION: Imports
// ============================================================================

use secchiware_core::Arrange;
use secchiware_core::Timestamp;

use crate::server::ApiError;

// ============================================================================
// SECTION: Parsers
// ============================================================================

/// Parses a comma-separated list of integers.
///
/// # Errors
///
/// Returns a 400 [`ApiError`] naming the parameter on any unparseable item.
pub(crate) fn parse_i64_list(name: &str, value: &str) -> Result<Vec<i64>, ApiError> {
    value
        .split(',')
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<i64>()
                .map_err(|_| ApiError::validation(format!("{name} must list integers, got {item}")))
        })
        .collect()
}

/// Parses a comma-separated list of ports.
///
/// # Errors
///
/// Returns a 400 [`ApiError`] naming the parameter on any unparseable item.
pub(crate) fn parse_port_list(name: &str, value: &str) -> Result<Vec<u16>, ApiError> {
    value
        .split(',')
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<u16>()
                .map_err(|_| ApiError::validation(format!("{name} must list ports, got {item}")))
        })
        .collect()
}

/// Parses a comma-separated list of strings.
#[must_use]
pub(crate) fn parse_string_list(value: &str) -> Vec<String> {
    value.split(',').filter(|item| !item.is_empty()).map(str::to_string).collect()
}

/// Parses an RFC 3339 timestamp parameter.
///
/// # Errors
///
/// Returns a 400 [`ApiError`] naming the parameter on parse failure.
pub(crate) fn parse_timestamp(name: &str, value: &str) -> Result<Timestamp, ApiError> {
    Timestamp::parse(value)
        .map_err(|_| ApiError::validation(format!("{name} must be an rfc 3339 timestamp")))
}

/// Parses a non-negative integer parameter (`limit`, `offset`).
///
/// # Errors
///
/// Returns a 400 [`ApiError`] naming the parameter for negatives or garbage.
pub(crate) fn parse_u64(name: &str, value: &str) -> Result<u64, ApiError> {
    value
        .parse::<u64>()
        .map_err(|_| ApiError::validation(format!("{name} must be a non-negative integer")))
}

/// Parses the `arrange` direction.
///
/// # Errors
///
/// Returns a 400 [`ApiError`] for anything other than `asc` or `desc`.
pub(crate) fn parse_arrange(value: &str) -> Result<Arrange, ApiError> {
    Arrange::parse(value)
        .ok_or_else(|| ApiError::validation(format!("arrange must be asc or desc, got {value}")))
}
