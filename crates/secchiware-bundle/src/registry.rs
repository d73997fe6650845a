// crates/secchiware-bundle/src/registry.rs
// ============================================================================
// Module: Test Registry
// Description: Atomic in-memory snapshot of the installed test tree.
// Purpose: Serve listings and plans while bundles install and uninstall.
// Dependencies: secchiware-core, std::sync
// ============================================================================

//! ## Overview
//! The registry owns the test root and an `Arc`-swapped snapshot of its
//! discovered content. Install and remove mutate the filesystem and then
//! rebuild the snapshot; a rebuild failure of any kind leaves the previous
//! snapshot in place, so readers never observe a half-loaded tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use secchiware_core::is_identifier;
use thiserror::Error;

use crate::archive;
use crate::archive::ArchiveError;
use crate::discovery;
use crate::discovery::DiscoveryError;
use crate::discovery::Snapshot;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by registry operations.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Discovery of the test root failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// Bundle packing or extraction failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// The named top-level package is not installed.
    #[error("unknown package: {0}")]
    UnknownPackage(String),
    /// Filesystem mutation failed.
    #[error("registry io failure: {0}")]
    Io(String),
    /// Snapshot lock was poisoned.
    #[error("registry lock poisoned")]
    Lock,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of installed tests rooted at one directory.
///
/// # Invariants
/// - `snapshot` always reflects a complete, validated discovery pass.
/// - Failed reloads keep the previous snapshot.
pub struct TestRegistry {
    /// Test root directory.
    root: PathBuf,
    /// Current snapshot, swapped atomically on successful reload.
    snapshot: RwLock<Arc<Snapshot>>,
}

impl TestRegistry {
    /// Opens a registry, running the initial discovery pass.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the root cannot be discovered.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        let snapshot = discovery::discover(&root)?;
        Ok(Self {
            root,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Returns the test root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Lock`] when the snapshot lock is poisoned.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>, RegistryError> {
        self.snapshot.read().map(|guard| Arc::clone(&guard)).map_err(|_| RegistryError::Lock)
    }

    /// Rebuilds the snapshot from disk, swapping only on success.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when discovery fails; the previous snapshot
    /// stays in place.
    pub fn reload(&self) -> Result<(), RegistryError> {
        let fresh = discovery::discover(&self.root)?;
        let mut guard = self.snapshot.write().map_err(|_| RegistryError::Lock)?;
        *guard = Arc::new(fresh);
        Ok(())
    }

    /// Installs a bundle with merge semantics and reloads the snapshot.
    ///
    /// Returns the replaced top-level package names.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when extraction or the subsequent reload
    /// fails; a failed reload keeps the previous snapshot.
    pub fn install_bundle(&self, bytes: &[u8]) -> Result<Vec<String>, RegistryError> {
        let replaced = archive::unpack(&self.root, bytes)?;
        self.reload()?;
        Ok(replaced)
    }

    /// Removes one top-level package and reloads the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownPackage`] when the package is not
    /// installed.
    pub fn remove_package(&self, name: &str) -> Result<(), RegistryError> {
        if !is_identifier(name) {
            return Err(RegistryError::UnknownPackage(name.to_string()));
        }
        let target = self.root.join(name);
        if !target.is_dir() {
            return Err(RegistryError::UnknownPackage(name.to_string()));
        }
        fs::remove_dir_all(&target)
            .map_err(|err| RegistryError::Io(format!("{}: {err}", target.display())))?;
        self.reload()
    }

    /// Packs the named top-level packages into a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownPackage`] when any named package is
    /// not installed.
    pub fn pack_packages(&self, names: &[String]) -> Result<Vec<u8>, RegistryError> {
        for name in names {
            if !is_identifier(name) || !self.root.join(name).is_dir() {
                return Err(RegistryError::UnknownPackage(name.clone()));
            }
        }
        Ok(archive::pack(&self.root, names)?)
    }
}

#[cfg(test)]
mod tests;
