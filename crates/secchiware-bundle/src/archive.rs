// crates/secchiware-bundle/src/archive.rs
// ============================================================================
// Module: Bundle Archives
// Description: Deterministic tar-gz packing and safe merge extraction.
// Purpose: Move top-level packages between repositories and nodes.
// Dependencies: tar, flate2
// ============================================================================

//! ## Overview
//! Bundles are gzipped tar archives of top-level package directories. Packing
//! walks the selected packages alphabetically and writes normalized headers
//! so the same tree always produces the same bytes. Extraction is two-phase:
//! every entry is validated before the filesystem is touched, then the
//! bundle's top-level packages replace their installed versions
//! (delete-then-extract) while unrelated packages are left intact.
//! Invariants:
//! - No extracted path escapes the test root: absolute paths, `..`
//!   components, and link entries are rejected outright.
//! - A rejected bundle leaves the test root unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use secchiware_core::is_identifier;
use tar::Archive;
use tar::Builder;
use tar::EntryType;
use tar::Header;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted bundle size in bytes.
pub const MAX_BUNDLE_BYTES: usize = 64 * 1024 * 1024;
/// Mode written for packed directories.
const DIR_MODE: u32 = 0o755;
/// Mode written for packed files.
const FILE_MODE: u32 = 0o644;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while packing or unpacking bundles.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem or stream I/O failed.
    #[error("archive io failure: {0}")]
    Io(String),
    /// Archive structure failed to parse.
    #[error("malformed archive: {0}")]
    Malformed(String),
    /// An entry path would escape the extraction root.
    #[error("unsafe archive path: {0}")]
    UnsafePath(String),
    /// An entry type other than directory or regular file was present.
    #[error("unsupported archive entry: {0}")]
    UnsupportedEntry(String),
    /// The bundle exceeds the accepted size.
    #[error("bundle too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum accepted bytes.
        max_bytes: usize,
        /// Received bundle size in bytes.
        actual_bytes: usize,
    },
}

// ============================================================================
// SECTION: Packing
// ============================================================================

/// Packs the named top-level packages into a gzipped tar bundle.
///
/// Packages are emitted in sorted order with normalized headers, so packing
/// the same tree twice yields identical bytes.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] when a package directory cannot be read.
pub fn pack(root: &Path, packages: &[String]) -> Result<Vec<u8>, ArchiveError> {
    let mut names: Vec<&String> = packages.iter().collect();
    names.sort();
    names.dedup();
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    for name in names {
        append_directory(&mut builder, root, Path::new(name))?;
    }
    let encoder =
        builder.into_inner().map_err(|err| ArchiveError::Io(err.to_string()))?;
    encoder.finish().map_err(|err| ArchiveError::Io(err.to_string()))
}

/// Recursively appends one directory with sorted children.
fn append_directory(
    builder: &mut Builder<GzEncoder<Vec<u8>>>,
    root: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    let absolute = root.join(relative);
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_mode(DIR_MODE);
    header.set_mtime(0);
    header.set_size(0);
    builder
        .append_data(&mut header, relative, std::io::empty())
        .map_err(|err| ArchiveError::Io(err.to_string()))?;

    let mut children: Vec<(bool, String)> = Vec::new();
    let entries = fs::read_dir(&absolute)
        .map_err(|err| ArchiveError::Io(format!("{}: {err}", absolute.display())))?;
    for entry in entries {
        let entry = entry
            .map_err(|err| ArchiveError::Io(format!("{}: {err}", absolute.display())))?;
        let file_type = entry
            .file_type()
            .map_err(|err| ArchiveError::Io(format!("{}: {err}", absolute.display())))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        children.push((file_type.is_dir(), name));
    }
    children.sort_by(|a, b| a.1.cmp(&b.1));

    for (is_dir, name) in children {
        let child = relative.join(&name);
        if is_dir {
            append_directory(builder, root, &child)?;
        } else {
            append_file(builder, root, &child)?;
        }
    }
    Ok(())
}

/// Appends one regular file with normalized header fields.
fn append_file(
    builder: &mut Builder<GzEncoder<Vec<u8>>>,
    root: &Path,
    relative: &Path,
) -> Result<(), ArchiveError> {
    let absolute = root.join(relative);
    let bytes = fs::read(&absolute)
        .map_err(|err| ArchiveError::Io(format!("{}: {err}", absolute.display())))?;
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(FILE_MODE);
    header.set_mtime(0);
    let size = u64::try_from(bytes.len()).map_err(|err| ArchiveError::Io(err.to_string()))?;
    header.set_size(size);
    builder
        .append_data(&mut header, relative, bytes.as_slice())
        .map_err(|err| ArchiveError::Io(err.to_string()))
}

// ============================================================================
// SECTION: Unpacking
// ============================================================================

/// Validated relative entry path and the top-level package it belongs to.
struct ValidatedPath {
    /// Path relative to the extraction root.
    relative: PathBuf,
    /// First path component (the top-level package name).
    top_level: String,
}

/// Validates every bundle entry and returns the top-level package names.
///
/// This is the read-only half of [`unpack`]; the C2 uses it to take
/// per-package locks before installing into its repository.
///
/// # Errors
///
/// Returns [`ArchiveError`] when the bundle is oversized, malformed, or
/// carries unsafe paths or link entries.
pub fn bundle_roots(bytes: &[u8]) -> Result<Vec<String>, ArchiveError> {
    Ok(validate_bundle(bytes)?.into_iter().collect())
}

/// Shared pass-1 validation over every entry of a bundle.
fn validate_bundle(bytes: &[u8]) -> Result<BTreeSet<String>, ArchiveError> {
    if bytes.len() > MAX_BUNDLE_BYTES {
        return Err(ArchiveError::TooLarge {
            max_bytes: MAX_BUNDLE_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let mut top_levels = BTreeSet::new();
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive.entries().map_err(|err| ArchiveError::Malformed(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| ArchiveError::Malformed(err.to_string()))?;
        let validated = validate_entry_path(&entry)?;
        match entry.header().entry_type() {
            EntryType::Directory | EntryType::Regular => {}
            other => {
                return Err(ArchiveError::UnsupportedEntry(format!(
                    "{}: {other:?}",
                    validated.relative.display()
                )));
            }
        }
        top_levels.insert(validated.top_level);
    }
    Ok(top_levels)
}

/// Unpacks a bundle into the test root with merge semantics.
///
/// Top-level packages present in the bundle replace their installed versions;
/// other installed packages are untouched. Returns the replaced package
/// names in sorted order.
///
/// # Errors
///
/// Returns [`ArchiveError`] when the bundle is oversized, malformed, carries
/// unsafe paths or link entries, or extraction I/O fails. Validation happens
/// before any filesystem mutation.
pub fn unpack(root: &Path, bytes: &[u8]) -> Result<Vec<String>, ArchiveError> {
    let top_levels = validate_bundle(bytes)?;

    // Pass 2: replace the bundled top-level packages.
    for name in &top_levels {
        let target = root.join(name);
        if target.exists() {
            fs::remove_dir_all(&target)
                .map_err(|err| ArchiveError::Io(format!("{}: {err}", target.display())))?;
        }
    }

    // Pass 3: extract directories and files.
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive.entries().map_err(|err| ArchiveError::Malformed(err.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| ArchiveError::Malformed(err.to_string()))?;
        let validated = validate_entry_path(&entry)?;
        let target = root.join(&validated.relative);
        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)
                    .map_err(|err| ArchiveError::Io(format!("{}: {err}", target.display())))?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| ArchiveError::Io(format!("{}: {err}", parent.display())))?;
                }
                let mut contents = Vec::new();
                entry
                    .read_to_end(&mut contents)
                    .map_err(|err| ArchiveError::Io(err.to_string()))?;
                fs::write(&target, contents)
                    .map_err(|err| ArchiveError::Io(format!("{}: {err}", target.display())))?;
            }
            _ => {}
        }
    }

    Ok(top_levels.into_iter().collect())
}

/// Validates one entry path: relative, no parent components, identifier root.
fn validate_entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> Result<ValidatedPath, ArchiveError> {
    let path = entry.path().map_err(|err| ArchiveError::Malformed(err.to_string()))?;
    let mut relative = PathBuf::new();
    let mut top_level: Option<String> = None;
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_string_lossy().to_string();
                if top_level.is_none() {
                    if !is_identifier(&segment) {
                        return Err(ArchiveError::UnsafePath(format!(
                            "top-level entry is not an identifier: {segment}"
                        )));
                    }
                    top_level = Some(segment.clone());
                }
                relative.push(segment);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath(path.display().to_string()));
            }
        }
    }
    let top_level = top_level
        .ok_or_else(|| ArchiveError::UnsafePath("empty entry path".to_string()))?;
    Ok(ValidatedPath {
        relative,
        top_level,
    })
}
