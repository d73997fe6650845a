// crates/secchiware-core/src/core/time.rs
// ============================================================================
// Module: Secchiware Time Model
// Description: RFC 3339 UTC timestamps for reports, sessions, and signatures.
// Purpose: Provide a single timestamp representation with a stable wire form.
// Dependencies: serde, time, thiserror
// ============================================================================

//! ## Overview
//! Every timestamp crossing a Secchiware wire — report start/end times,
//! session lifecycle markers, and signed freshness headers — is an RFC 3339
//! UTC value with sub-second precision. [`Timestamp`] wraps
//! [`time::OffsetDateTime`]. Emission always uses six fractional digits so
//! the textual form sorts chronologically; parsing accepts any RFC 3339
//! input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed-width RFC 3339 emission format (UTC, six fractional digits).
const WIRE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced when parsing or formatting timestamps.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// Timestamp string failed to parse as RFC 3339.
    #[error("invalid rfc 3339 timestamp: {0}")]
    Parse(String),
    /// Timestamp value failed to format as RFC 3339.
    #[error("timestamp formatting failed: {0}")]
    Format(String),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// RFC 3339 UTC timestamp with sub-second precision.
///
/// # Invariants
/// - Values are always expressed in UTC on the wire.
/// - Ordering follows the underlying instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Returns the current UTC wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Wraps an existing instant.
    #[must_use]
    pub const fn from_odt(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Returns the wrapped instant.
    #[must_use]
    pub const fn as_odt(&self) -> OffsetDateTime {
        self.0
    }

    /// Parses an RFC 3339 timestamp string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the string is not valid RFC 3339.
    pub fn parse(raw: &str) -> Result<Self, TimeError> {
        OffsetDateTime::parse(raw, &Rfc3339)
            .map(|value| Self(value.to_offset(time::UtcOffset::UTC)))
            .map_err(|err| TimeError::Parse(err.to_string()))
    }

    /// Formats the timestamp as a fixed-width RFC 3339 string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Format`] when the instant cannot be expressed in
    /// RFC 3339 (out-of-range years).
    pub fn to_rfc3339(&self) -> Result<String, TimeError> {
        self.0
            .to_offset(time::UtcOffset::UTC)
            .format(WIRE_FORMAT)
            .map_err(|err| TimeError::Format(err.to_string()))
    }

    /// Returns the absolute distance between two timestamps.
    #[must_use]
    pub fn abs_difference(&self, other: &Self) -> Duration {
        (self.0 - other.0).abs()
    }

    /// Returns the unix timestamp in whole seconds.
    #[must_use]
    pub const fn unix_timestamp(&self) -> i64 {
        self.0.unix_timestamp()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(value) => f.write_str(&value),
            Err(_) => f.write_str("<invalid timestamp>"),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let value = self.to_rfc3339().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&value)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
