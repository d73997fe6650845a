// crates/secchiware-node/src/standalone.rs
// ============================================================================
// Module: Stand-Alone Mode
// Description: Registration-free fallback execution path.
// Purpose: Keep nodes usable when the C2 is unreachable at startup.
// Dependencies: secchiware-bundle, secchiware-core, serde_json
// ============================================================================

//! ## Overview
//! When registration fails, the node runs every installed test once and
//! writes the JSON report array to standard output, then exits. This is the
//! contract that keeps a node useful inside an air-gapped or misconfigured
//! analysis environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;

use secchiware_bundle::RegistryError;
use secchiware_bundle::TestRegistry;
use secchiware_bundle::runner;
use secchiware_core::ExecutionSelector;
use secchiware_core::SelectorError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by the stand-alone fallback.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StandaloneError {
    /// Registry snapshot could not be read.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Selector resolution failed.
    #[error(transparent)]
    Selector(#[from] SelectorError),
    /// Report emission failed.
    #[error("report emission failed: {0}")]
    Emit(String),
}

// ============================================================================
// SECTION: Fallback Execution
// ============================================================================

/// Runs every installed test once and writes the reports to stdout.
///
/// # Errors
///
/// Returns [`StandaloneError`] when the snapshot cannot be read or the
/// report array cannot be written.
pub fn run_standalone(registry: &TestRegistry) -> Result<(), StandaloneError> {
    let snapshot = registry.snapshot()?;
    let plan = runner::plan(&snapshot, &ExecutionSelector::unconstrained())?;
    let reports = runner::execute(&plan);
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, &reports)
        .map_err(|err| StandaloneError::Emit(err.to_string()))?;
    handle.write_all(b"\n").map_err(|err| StandaloneError::Emit(err.to_string()))?;
    Ok(())
}
