//! Cheap structural validation of checksum files before any hashing happens.
//!
//! A checksum file that is missing, empty, whitespace-only or unreadable can
//! never verify, so there is no point hashing its data file. This pass finds
//! those cases with metadata-sized I/O, purges the broken companions so they
//! are redownloaded, and never touches the data file itself.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use super::store::{checksum_path, remove_if_exists, verified_marker_path};

/// A data file whose checksum file passed structural pre-validation.
///
/// Only [`partition`] constructs this type, so holding one is proof that the
/// checksum companion was present and carried a digest token at check time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedFile(PathBuf);

impl ValidatedFile {
    /// Returns the data file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Consumes the token and returns the data file path.
    #[must_use]
    pub fn into_path(self) -> PathBuf {
        self.0
    }
}

/// Why a checksum file failed pre-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumDefect {
    /// No checksum file on disk.
    Missing,
    /// Zero-byte checksum file.
    Empty,
    /// Non-empty but contains no digest token.
    NoToken,
    /// Reading failed (encoding, permissions, vanished mid-check).
    Unreadable,
}

impl ChecksumDefect {
    /// Returns a short label for logs and tracker records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing checksum file",
            Self::Empty => "empty checksum file",
            Self::NoToken => "unparsable checksum file",
            Self::Unreadable => "unreadable checksum file",
        }
    }
}

/// Outcome of pre-validating a set of data files.
#[derive(Debug, Default)]
pub struct PreValidation {
    /// Files safe to hand to the verifier.
    pub validated: Vec<ValidatedFile>,
    /// Files whose checksum companion is structurally broken (already purged).
    pub invalid: Vec<PathBuf>,
}

/// Splits `data_files` into structurally valid and invalid checksum sets.
///
/// For every invalid entry the checksum file and verified marker are deleted
/// (missing-ok). The data file is left untouched.
#[instrument(skip(data_files), fields(count = data_files.len()))]
pub fn partition(data_files: &[PathBuf]) -> PreValidation {
    let mut result = PreValidation::default();

    for data_file in data_files {
        match inspect(data_file) {
            None => result.validated.push(ValidatedFile(data_file.clone())),
            Some(defect) => {
                cleanup_companions(data_file, defect);
                result.invalid.push(data_file.clone());
            }
        }
    }

    if !result.invalid.is_empty() {
        warn!(
            invalid = result.invalid.len(),
            validated = result.validated.len(),
            "pre-validation found invalid checksum files, companions purged for redownload"
        );
    }

    result
}

/// Returns the subset of `data_files` whose checksum files are invalid.
///
/// Convenience wrapper over [`partition`] with identical side effects.
#[must_use]
pub fn validate_and_cleanup(data_files: &[PathBuf]) -> Vec<PathBuf> {
    partition(data_files).invalid
}

fn inspect(data_file: &Path) -> Option<ChecksumDefect> {
    let checksum_file = checksum_path(data_file);

    let metadata = match fs::metadata(&checksum_file) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Some(ChecksumDefect::Missing),
        Err(e) => {
            debug!(path = %checksum_file.display(), error = %e, "checksum metadata unreadable");
            return Some(ChecksumDefect::Unreadable);
        }
    };

    if metadata.len() == 0 {
        return Some(ChecksumDefect::Empty);
    }

    match fs::read_to_string(&checksum_file) {
        Ok(text) if text.split_whitespace().next().is_none() => Some(ChecksumDefect::NoToken),
        Ok(_) => None,
        Err(e) => {
            debug!(path = %checksum_file.display(), error = %e, "checksum content unreadable");
            Some(ChecksumDefect::Unreadable)
        }
    }
}

fn cleanup_companions(data_file: &Path, defect: ChecksumDefect) {
    let checksum_file = checksum_path(data_file);
    warn!(
        path = %checksum_file.display(),
        defect = defect.as_str(),
        "invalid checksum file, marking for checksum redownload"
    );

    if defect != ChecksumDefect::Missing {
        remove_if_exists(&checksum_file);
    }
    remove_if_exists(&verified_marker_path(data_file));
}
