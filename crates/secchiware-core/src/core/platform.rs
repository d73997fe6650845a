// crates/secchiware-core/src/core/platform.rs
// ============================================================================
// Module: Secchiware Platform Fingerprint
// Description: Environment platform description gathered at node startup.
// Purpose: Identify the analysis environment a node is running inside.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The platform fingerprint is gathered once at node startup and carried in
//! the registration request, the active-node table, and the denormalized
//! session row. Field values are best-effort: unavailable facts are reported
//! as `"unknown"` rather than failing registration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder reported when a platform fact cannot be read.
const UNKNOWN: &str = "unknown";

// ============================================================================
// SECTION: Fingerprint Types
// ============================================================================

/// Operating system identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    /// OS family name (`linux`, `macos`, `windows`, ...).
    pub system: String,
    /// Kernel release string.
    pub release: String,
    /// Kernel version string.
    pub version: String,
}

/// Runtime identification for the node binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Build label of the running node software.
    pub build: String,
    /// Compiler that produced the binary.
    pub compiler: String,
    /// Runtime implementation name.
    pub implementation: String,
    /// Runtime version string.
    pub version: String,
}

/// Full platform fingerprint of an analysis environment.
///
/// # Invariants
/// - Every field is populated; unavailable facts use the `unknown` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Operating system identification.
    pub os: OsInfo,
    /// Machine hardware name.
    pub machine: String,
    /// Processor description.
    pub processor: String,
    /// Runtime identification.
    pub runtime: RuntimeInfo,
}

impl PlatformInfo {
    /// Gathers the fingerprint of the current host.
    #[must_use]
    pub fn gather() -> Self {
        Self {
            os: OsInfo {
                system: std::env::consts::OS.to_string(),
                release: read_kernel_fact("/proc/sys/kernel/osrelease"),
                version: read_kernel_fact("/proc/sys/kernel/version"),
            },
            machine: std::env::consts::ARCH.to_string(),
            processor: std::env::consts::ARCH.to_string(),
            runtime: RuntimeInfo {
                build: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
                compiler: "rustc".to_string(),
                implementation: "rust".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a single-line kernel fact, falling back to the unknown placeholder.
fn read_kernel_fact(path: &str) -> String {
    fs::read_to_string(path).map_or_else(|_| UNKNOWN.to_string(), |raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() { UNKNOWN.to_string() } else { trimmed.to_string() }
    })
}
