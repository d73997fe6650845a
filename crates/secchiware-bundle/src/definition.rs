// crates/secchiware-bundle/src/definition.rs
// ============================================================================
// Module: Test Module Definitions
// Description: Declarative probe DSL parsed from module TOML files.
// Purpose: Describe detection tests as data interpreted by the runner.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! A module is a TOML file declaring test sets; each set carries a
//! description, optional setup/teardown probes, and named tests. A test binds
//! a probe to an expectation: the probe inspecting the environment for an
//! analysis artifact. Tests are data, not code — installing a bundle never
//! loads executable content into the node process.
//!
//! ```toml
//! [set.network_artifacts]
//! description = "Network fingerprints left by analysis sandboxes"
//!
//! [set.network_artifacts.tests.proxy_env_present]
//! description = "Sandboxes often force an interception proxy"
//! probe = "env_var"
//! name = "HTTP_PROXY"
//! expect = "present"
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use secchiware_core::is_identifier;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced when parsing or validating module definitions.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Module TOML failed to parse.
    #[error("module parse failure: {0}")]
    Parse(String),
    /// A set or test name was not a valid identifier.
    #[error("invalid definition name: {0}")]
    InvalidName(String),
    /// A probe declaration was internally inconsistent.
    #[error("invalid probe: {0}")]
    InvalidProbe(String),
}

// ============================================================================
// SECTION: Probe DSL
// ============================================================================

/// Expectation applied to an environment variable probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvVarExpect {
    /// The variable must be present.
    Present,
    /// The variable must be absent.
    Absent,
    /// The variable must equal the declared value.
    Equals,
}

/// One declarative probe.
///
/// # Invariants
/// - `EnvVar` with `Equals` carries a `value`.
/// - `Command` timeouts are milliseconds; absent means the runner default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum ProbeDefinition {
    /// Inspect an environment variable.
    EnvVar {
        /// Variable name.
        name: String,
        /// Expectation applied to the variable.
        expect: EnvVarExpect,
        /// Comparison value for [`EnvVarExpect::Equals`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Require a filesystem path to exist.
    FileExists {
        /// Absolute or node-relative path.
        path: String,
    },
    /// Require a filesystem path to be absent.
    FileAbsent {
        /// Absolute or node-relative path.
        path: String,
    },
    /// Run a program; exit status zero means the detection fired.
    Command {
        /// Program to execute.
        program: String,
        /// Program arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Timeout in milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Require at least this many logical CPUs.
    CpuCountAtLeast {
        /// Minimum CPU count.
        count: u32,
    },
    /// Require at least this many seconds of host uptime.
    UptimeAtLeast {
        /// Minimum uptime in seconds.
        seconds: u64,
    },
}

impl ProbeDefinition {
    /// Validates internal consistency of the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidProbe`] on inconsistent fields.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        match self {
            Self::EnvVar {
                name,
                expect,
                value,
            } => {
                if name.is_empty() {
                    return Err(DefinitionError::InvalidProbe(
                        "env_var probe requires a variable name".to_string(),
                    ));
                }
                if matches!(expect, EnvVarExpect::Equals) && value.is_none() {
                    return Err(DefinitionError::InvalidProbe(
                        "env_var equals expectation requires a value".to_string(),
                    ));
                }
                Ok(())
            }
            Self::FileExists {
                path,
            }
            | Self::FileAbsent {
                path,
            } => {
                if path.is_empty() {
                    return Err(DefinitionError::InvalidProbe(
                        "file probe requires a path".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Command {
                program, ..
            } => {
                if program.is_empty() {
                    return Err(DefinitionError::InvalidProbe(
                        "command probe requires a program".to_string(),
                    ));
                }
                Ok(())
            }
            Self::CpuCountAtLeast {
                count,
            } => {
                if *count == 0 {
                    return Err(DefinitionError::InvalidProbe(
                        "cpu_count_at_least requires count >= 1".to_string(),
                    ));
                }
                Ok(())
            }
            Self::UptimeAtLeast {
                ..
            } => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Module Layout
// ============================================================================

/// One declared test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Human description; inherits the set description when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Probe bound to the test.
    #[serde(flatten)]
    pub probe: ProbeDefinition,
}

/// One declared test set.
///
/// # Invariants
/// - `tests` keys are valid identifiers after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSetDefinition {
    /// Human description inherited by tests without one.
    pub description: String,
    /// Probe run before the first selected test of the set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<ProbeDefinition>,
    /// Probe run after the last selected test of the set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<ProbeDefinition>,
    /// Tests keyed by name.
    #[serde(default)]
    pub tests: BTreeMap<String, TestDefinition>,
}

/// A parsed module file.
///
/// # Invariants
/// - `set` keys are valid identifiers after validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Test sets keyed by name.
    #[serde(default)]
    pub set: BTreeMap<String, TestSetDefinition>,
}

impl ModuleDefinition {
    /// Parses and validates a module TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] on parse failures, invalid names, or
    /// inconsistent probes.
    pub fn parse(raw: &str) -> Result<Self, DefinitionError> {
        let module: Self =
            toml::from_str(raw).map_err(|err| DefinitionError::Parse(err.to_string()))?;
        module.validate()?;
        Ok(module)
    }

    /// Validates set and test names plus every probe declaration.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] on the first violation.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        for (set_name, set) in &self.set {
            if !is_identifier(set_name) {
                return Err(DefinitionError::InvalidName(set_name.clone()));
            }
            if let Some(setup) = &set.setup {
                setup.validate()?;
            }
            if let Some(teardown) = &set.teardown {
                teardown.validate()?;
            }
            for (test_name, test) in &set.tests {
                if !is_identifier(test_name) {
                    return Err(DefinitionError::InvalidName(test_name.clone()));
                }
                test.probe.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
