// crates/secchiware-config/src/lib.rs
// ============================================================================
// Module: Secchiware Config Library
// Description: TOML configuration for the Node and C2 services.
// Purpose: Load and validate deployment settings fail-closed at startup.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Both services take a single configuration file path argument. This crate
//! defines the mirrored serde structs, the TOML loaders, and `validate()`
//! methods that reject unusable settings before any socket is bound. A node
//! that fails validation exits with status 1 (startup misconfiguration).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default node listener port.
pub const DEFAULT_NODE_PORT: u16 = 4900;
/// Default C2 listener port.
pub const DEFAULT_C2_PORT: u16 = 5000;
/// Default outbound HTTP timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Default signature freshness window in seconds (±).
const DEFAULT_SKEW_SECS: u64 = 300;
/// Default C2 signing identity.
const DEFAULT_C2_KEY_ID: &str = "C2";
/// Default client signing identity.
const DEFAULT_CLIENT_KEY_ID: &str = "Client";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never echo secret values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("config io failure: {0}")]
    Io(String),
    /// Configuration file failed to parse.
    #[error("config parse failure: {0}")]
    Parse(String),
    /// Configuration contained unusable settings.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default node listener port.
const fn default_node_port() -> u16 {
    DEFAULT_NODE_PORT
}

/// Returns the default C2 listener port.
const fn default_c2_port() -> u16 {
    DEFAULT_C2_PORT
}

/// Returns the default outbound timeout.
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Returns the default freshness window.
const fn default_skew_secs() -> u64 {
    DEFAULT_SKEW_SECS
}

/// Returns the default C2 signing identity.
fn default_c2_key_id() -> String {
    DEFAULT_C2_KEY_ID.to_string()
}

/// Returns the default client signing identity.
fn default_client_key_id() -> String {
    DEFAULT_CLIENT_KEY_ID.to_string()
}

/// Returns the default listen address.
fn default_listen_ip() -> String {
    "0.0.0.0".to_string()
}

/// Returns the default liveness probe interval.
const fn default_liveness_interval_secs() -> u64 {
    30
}

/// Returns the default liveness probe attempts.
const fn default_liveness_attempts() -> u32 {
    3
}

/// Returns the default liveness probe timeout.
const fn default_liveness_timeout_ms() -> u64 {
    2_000
}

/// Returns the default broker mutex lease.
const fn default_lock_ttl_secs() -> u64 {
    30
}

/// Returns the default broker mutex wait budget.
const fn default_lock_wait_ms() -> u64 {
    5_000
}

// ============================================================================
// SECTION: Node Config
// ============================================================================

/// Node service configuration.
///
/// # Invariants
/// - `validate()` has accepted the settings before any service starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// C2 host to register with.
    pub c2_host: String,
    /// C2 port to register with.
    #[serde(default = "default_c2_port")]
    pub c2_port: u16,
    /// Address the node listener binds.
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    /// Port the node listener binds.
    #[serde(default = "default_node_port")]
    pub listen_port: u16,
    /// Node signing identity.
    #[serde(alias = "keyId")]
    pub key_id: String,
    /// Shared secret for node-signed requests.
    pub secret: String,
    /// C2 signing identity accepted on inbound requests.
    #[serde(default = "default_c2_key_id", alias = "c2_public_keyId")]
    pub c2_key_id: String,
    /// Shared secret for C2-signed inbound requests.
    pub c2_secret: String,
    /// Directory holding installed test packages.
    pub test_root: PathBuf,
    /// Outbound HTTP timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Signature freshness window in seconds.
    #[serde(default = "default_skew_secs")]
    pub skew_secs: u64,
}

impl NodeConfig {
    /// Loads and validates a node configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, unparseable, or
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        let config: Self = toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the settings fail-closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first rejected setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("c2_host", &self.c2_host)?;
        require_port("c2_port", self.c2_port)?;
        require_non_empty("listen_ip", &self.listen_ip)?;
        require_port("listen_port", self.listen_port)?;
        require_non_empty("key_id", &self.key_id)?;
        require_non_empty("secret", &self.secret)?;
        require_non_empty("c2_key_id", &self.c2_key_id)?;
        require_non_empty("c2_secret", &self.c2_secret)?;
        if self.test_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("test_root must be non-empty".to_string()));
        }
        require_positive("timeout_ms", self.timeout_ms)?;
        require_positive("skew_secs", self.skew_secs)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: C2 Config
// ============================================================================

/// Liveness sweeper settings.
///
/// # Invariants
/// - `attempts >= 1`; backoff between attempts is handled by the sweeper.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LivenessConfig {
    /// Seconds between sweep rounds.
    #[serde(default = "default_liveness_interval_secs")]
    pub interval_secs: u64,
    /// Probe attempts before a node is declared dead.
    #[serde(default = "default_liveness_attempts")]
    pub attempts: u32,
    /// Per-probe timeout in milliseconds.
    #[serde(default = "default_liveness_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_liveness_interval_secs(),
            attempts: default_liveness_attempts(),
            timeout_ms: default_liveness_timeout_ms(),
        }
    }
}

/// C2 service configuration.
///
/// # Invariants
/// - `validate()` has accepted the settings before any service starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct C2Config {
    /// Address the C2 listener binds.
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    /// Port the C2 listener binds.
    #[serde(default = "default_c2_port")]
    pub listen_port: u16,
    /// SQLite database file path.
    pub database_path: PathBuf,
    /// Master test repository directory.
    pub repository_root: PathBuf,
    /// Client signing identity.
    #[serde(default = "default_client_key_id")]
    pub client_key_id: String,
    /// Shared secret for client-signed requests.
    pub client_secret: String,
    /// Identity the C2 signs outbound node requests with.
    #[serde(default = "default_c2_key_id")]
    pub c2_key_id: String,
    /// Shared secrets for node-signed requests, keyed by node identity.
    pub node_secrets: BTreeMap<String, String>,
    /// Origins allowed in `Access-Control-Allow-Origin`.
    pub allowed_origins: Vec<String>,
    /// Outbound HTTP timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Signature freshness window in seconds.
    #[serde(default = "default_skew_secs")]
    pub skew_secs: u64,
    /// Broker mutex lease in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Broker mutex wait budget in milliseconds.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,
    /// Liveness sweeper settings.
    #[serde(default)]
    pub liveness: LivenessConfig,
}

impl C2Config {
    /// Loads and validates a C2 configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, unparseable, or
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        let config: Self = toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the settings fail-closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first rejected setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("listen_ip", &self.listen_ip)?;
        require_port("listen_port", self.listen_port)?;
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path must be non-empty".to_string()));
        }
        if self.repository_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("repository_root must be non-empty".to_string()));
        }
        require_non_empty("client_key_id", &self.client_key_id)?;
        require_non_empty("client_secret", &self.client_secret)?;
        require_non_empty("c2_key_id", &self.c2_key_id)?;
        if self.node_secrets.is_empty() {
            return Err(ConfigError::Invalid("node_secrets must list at least one node".to_string()));
        }
        for (key_id, secret) in &self.node_secrets {
            if key_id.trim().is_empty() || secret.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "node_secrets entries must have non-empty ids and secrets".to_string(),
                ));
            }
        }
        if self.allowed_origins.is_empty() {
            return Err(ConfigError::Invalid(
                "allowed_origins must list at least one origin".to_string(),
            ));
        }
        if self.allowed_origins.iter().any(|origin| origin.trim().is_empty()) {
            return Err(ConfigError::Invalid("allowed_origins entries must be non-empty".to_string()));
        }
        require_positive("timeout_ms", self.timeout_ms)?;
        require_positive("skew_secs", self.skew_secs)?;
        require_positive("lock_ttl_secs", self.lock_ttl_secs)?;
        require_positive("lock_wait_ms", self.lock_wait_ms)?;
        require_positive("liveness.interval_secs", self.liveness.interval_secs)?;
        if self.liveness.attempts == 0 {
            return Err(ConfigError::Invalid("liveness.attempts must be >= 1".to_string()));
        }
        require_positive("liveness.timeout_ms", self.liveness.timeout_ms)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Rejects empty or whitespace-only string settings.
fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    Ok(())
}

/// Rejects the unusable zero port.
fn require_port(field: &str, value: u16) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be non-zero")));
    }
    Ok(())
}

/// Rejects zero durations.
fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
    }
    Ok(())
}
