//! Naming conventions and digest primitives for data files and their companions.
//!
//! Every data file `x.zip` has two companions in the same directory:
//! - `x.zip.CHECKSUM`, the vendor-supplied digest (`<hex>  x.zip`)
//! - `x.zip.verified`, a zero-byte marker written after a successful comparison

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::ChecksumError;

/// Suffix appended to a data file name to locate its checksum file.
pub const CHECKSUM_SUFFIX: &str = ".CHECKSUM";

/// Suffix appended to a data file name to locate its verified marker.
pub const VERIFIED_SUFFIX: &str = ".verified";

fn with_suffix(data_file: &Path, suffix: &str) -> PathBuf {
    let mut name = data_file
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(suffix);
    data_file.with_file_name(name)
}

/// Returns the checksum file path for a data file.
#[must_use]
pub fn checksum_path(data_file: &Path) -> PathBuf {
    with_suffix(data_file, CHECKSUM_SUFFIX)
}

/// Returns the verified marker path for a data file.
#[must_use]
pub fn verified_marker_path(data_file: &Path) -> PathBuf {
    with_suffix(data_file, VERIFIED_SUFFIX)
}

/// Returns true if `path` names a checksum or verified-marker companion.
#[must_use]
pub fn is_companion(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(CHECKSUM_SUFFIX) || name.ends_with(VERIFIED_SUFFIX))
}

/// Calculates the SHA-256 digest of a data file.
///
/// The whole file is read into memory; archives are expected to be small
/// enough for that.
///
/// # Returns
///
/// The lowercase hexadecimal SHA-256 hash of the file contents.
///
/// # Errors
///
/// Returns [`ChecksumError::Io`] if the file cannot be read.
pub fn compute_digest(data_file: &Path) -> Result<String, ChecksumError> {
    let data = fs::read(data_file).map_err(|e| ChecksumError::io(data_file, e))?;
    Ok(format!("{:x}", Sha256::digest(&data)))
}

/// Reads the expected digest from a checksum file.
///
/// Accepts both a bare digest and the `digest  filename` form; the first
/// whitespace-delimited token of the trimmed content is returned.
///
/// # Errors
///
/// - [`ChecksumError::NotFound`] if the checksum file does not exist
/// - [`ChecksumError::Invalid`] if it is empty, not UTF-8, unreadable, or has no token
pub fn read_digest(checksum_file: &Path) -> Result<String, ChecksumError> {
    if !checksum_file.exists() {
        return Err(ChecksumError::not_found(checksum_file));
    }

    let text = fs::read_to_string(checksum_file)
        .map_err(|e| ChecksumError::invalid(checksum_file, e.to_string()))?;

    text.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ChecksumError::invalid(checksum_file, "empty checksum file"))
}

/// Best-effort delete that treats an already-missing file as success.
pub(crate) fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
    }
}

/// Deletes a data file together with its checksum file and verified marker.
pub fn purge_with_companions(data_file: &Path) {
    remove_if_exists(data_file);
    remove_if_exists(&verified_marker_path(data_file));
    remove_if_exists(&checksum_path(data_file));
}
