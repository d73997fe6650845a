// crates/secchiware-core/src/core/identifiers.rs
// ============================================================================
// Module: Secchiware Identifiers
// Description: Canonical dotted names, key identifiers, and endpoint keys.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout Secchiware. A
//! [`CanonicalName`] is the dotted path addressing a package, module, test
//! set, or test (`pkg.sub.mod.set.test`). A [`KeyId`] names a signing
//! principal. An [`EnvironmentEndpoint`] is the `(ip, port)` tuple keying the
//! active-node table and the session history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced when parsing canonical names.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Canonical name was empty.
    #[error("canonical name is empty")]
    Empty,
    /// A path segment was not a valid identifier.
    #[error("invalid canonical name segment: {0}")]
    InvalidSegment(String),
}

// ============================================================================
// SECTION: Canonical Names
// ============================================================================

/// Returns true when the string is a valid path segment identifier.
///
/// Identifiers match `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Dotted path identifying a package, module, test set, or test.
///
/// # Invariants
/// - Every dot-separated segment is a valid identifier.
/// - The path has at least one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CanonicalName(String);

impl CanonicalName {
    /// Parses a canonical name, validating every segment.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] when the name is empty or a segment is not an
    /// identifier.
    pub fn parse(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        for segment in name.split('.') {
            if !is_identifier(segment) {
                return Err(NameError::InvalidSegment(segment.to_string()));
            }
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the dot-separated path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Returns the number of path segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }

    /// Returns a child name with the segment appended.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}.{segment}", self.0))
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for CanonicalName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Key Identifiers
// ============================================================================

/// Identifier of a signing principal (`Client`, `C2`, or a per-node id).
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Creates a new key identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for KeyId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Environment Endpoints
// ============================================================================

/// `(ip, port)` tuple identifying one analysis environment.
///
/// # Invariants
/// - `ip` is stored as received; no canonicalization of address forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentEndpoint {
    /// Environment IP address as reported at registration.
    pub ip: String,
    /// Environment listener port.
    pub port: u16,
}

impl EnvironmentEndpoint {
    /// Creates a new endpoint key.
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for EnvironmentEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
