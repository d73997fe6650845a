// crates/secchiware-bundle/src/discovery.rs
// ============================================================================
// Module: Test Root Discovery
// Description: Deterministic walk of the test root into a registry snapshot.
// Purpose: Build the package tree and module index installed tests live in.
// Dependencies: secchiware-core, std::fs
// ============================================================================

//! ## Overview
//! Discovery walks the test root: every identifier-named directory is a
//! package, nested directories are subpackages, and every `*.toml` file with
//! an identifier stem is a module. Enumeration is alphabetical at every level
//! so two discoveries of the same tree produce identical listings. Dotfiles
//! are ignored; any other non-identifier directory name fails discovery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use secchiware_core::ModuleInfo;
use secchiware_core::PackageInfo;
use secchiware_core::TestInfo;
use secchiware_core::TestSetInfo;
use secchiware_core::is_identifier;
use thiserror::Error;

use crate::definition::ModuleDefinition;
use crate::definition::TestSetDefinition;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while walking the test root.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Filesystem access failed.
    #[error("discovery io failure: {0}")]
    Io(String),
    /// A directory or module name was not a valid identifier.
    #[error("invalid package entry name: {0}")]
    InvalidName(String),
    /// A module file failed to parse or validate.
    #[error("module {path} rejected: {message}")]
    Module {
        /// Path of the offending module file.
        path: String,
        /// Parse or validation failure message.
        message: String,
    },
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// A module loaded into a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoadedModule {
    /// Test sets keyed by name.
    pub(crate) sets: BTreeMap<String, TestSetDefinition>,
}

/// Immutable view of the installed test tree.
///
/// # Invariants
/// - `tree` enumeration matches the module index exactly.
/// - All canonical paths in the index are valid dotted names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Root packages in alphabetical order.
    pub(crate) tree: Vec<PackageInfo>,
    /// Canonical paths of every package, at every depth.
    pub(crate) packages: BTreeSet<String>,
    /// Modules keyed by canonical module path.
    pub(crate) modules: BTreeMap<String, LoadedModule>,
}

impl Snapshot {
    /// Returns the recursive package tree.
    #[must_use]
    pub fn tree(&self) -> &[PackageInfo] {
        &self.tree
    }

    /// Returns true when a root package with the given name is installed.
    #[must_use]
    pub fn has_root_package(&self, name: &str) -> bool {
        self.tree.iter().any(|package| package.name == name)
    }

    /// Returns the number of installed tests.
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.modules
            .values()
            .map(|module| module.sets.values().map(|set| set.tests.len()).sum::<usize>())
            .sum()
    }
}

// ============================================================================
// SECTION: Discovery
// ============================================================================

/// Walks the test root and builds a snapshot.
///
/// # Errors
///
/// Returns [`DiscoveryError`] on filesystem failures, invalid names, or
/// malformed module files; the caller keeps its previous snapshot.
pub fn discover(root: &Path) -> Result<Snapshot, DiscoveryError> {
    let mut snapshot = Snapshot::default();
    for name in sorted_directory_names(root)? {
        let package = scan_package(&root.join(&name), &name, &mut snapshot)?;
        snapshot.tree.push(package);
    }
    Ok(snapshot)
}

/// Recursively scans one package directory.
fn scan_package(
    dir: &Path,
    canonical: &str,
    snapshot: &mut Snapshot,
) -> Result<PackageInfo, DiscoveryError> {
    snapshot.packages.insert(canonical.to_string());
    let mut subpackages = Vec::new();
    for name in sorted_directory_names(dir)? {
        let child = format!("{canonical}.{name}");
        subpackages.push(scan_package(&dir.join(&name), &child, snapshot)?);
    }
    let mut modules = Vec::new();
    for stem in sorted_module_stems(dir)? {
        let path = dir.join(format!("{stem}.toml"));
        let raw = fs::read_to_string(&path)
            .map_err(|err| DiscoveryError::Io(format!("{}: {err}", path.display())))?;
        let definition = ModuleDefinition::parse(&raw).map_err(|err| DiscoveryError::Module {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        modules.push(build_module_info(&stem, &definition));
        snapshot.modules.insert(
            format!("{canonical}.{stem}"),
            LoadedModule {
                sets: definition.set,
            },
        );
    }
    let leaf = canonical.rsplit('.').next().unwrap_or(canonical);
    Ok(PackageInfo {
        name: leaf.to_string(),
        subpackages,
        modules,
    })
}

/// Builds the wire view of one module with description inheritance applied.
fn build_module_info(name: &str, definition: &ModuleDefinition) -> ModuleInfo {
    let mut test_sets = Vec::new();
    for (set_name, set) in &definition.set {
        let mut tests = Vec::new();
        for (test_name, test) in &set.tests {
            tests.push(TestInfo {
                name: test_name.clone(),
                description: test
                    .description
                    .clone()
                    .unwrap_or_else(|| set.description.clone()),
            });
        }
        test_sets.push(TestSetInfo {
            name: set_name.clone(),
            description: set.description.clone(),
            tests,
        });
    }
    ModuleInfo {
        name: name.to_string(),
        test_sets,
    }
}

// ============================================================================
// SECTION: Directory Helpers
// ============================================================================

/// Lists identifier-named subdirectories in alphabetical order.
///
/// Dotfiles are skipped; any other non-identifier directory fails discovery.
fn sorted_directory_names(dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    let mut names = Vec::new();
    let entries =
        fs::read_dir(dir).map_err(|err| DiscoveryError::Io(format!("{}: {err}", dir.display())))?;
    for entry in entries {
        let entry =
            entry.map_err(|err| DiscoveryError::Io(format!("{}: {err}", dir.display())))?;
        let file_type = entry
            .file_type()
            .map_err(|err| DiscoveryError::Io(format!("{}: {err}", dir.display())))?;
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if !is_identifier(&name) {
            return Err(DiscoveryError::InvalidName(name));
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Lists identifier module stems (`*.toml` files) in alphabetical order.
fn sorted_module_stems(dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    let mut stems = Vec::new();
    let entries =
        fs::read_dir(dir).map_err(|err| DiscoveryError::Io(format!("{}: {err}", dir.display())))?;
    for entry in entries {
        let entry =
            entry.map_err(|err| DiscoveryError::Io(format!("{}: {err}", dir.display())))?;
        let file_type = entry
            .file_type()
            .map_err(|err| DiscoveryError::Io(format!("{}: {err}", dir.display())))?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let Some(stem) = name.strip_suffix(".toml") else {
            continue;
        };
        if !is_identifier(stem) {
            return Err(DiscoveryError::InvalidName(name));
        }
        stems.push(stem.to_string());
    }
    stems.sort();
    Ok(stems)
}
