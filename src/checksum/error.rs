//! Error types for checksum file handling.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading checksum files or hashing data files.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// The checksum file does not exist.
    #[error("checksum file {path} does not exist")]
    NotFound {
        /// Path of the missing checksum file.
        path: PathBuf,
    },

    /// The checksum file exists but carries no usable digest.
    #[error("invalid checksum file {path}: {reason}")]
    Invalid {
        /// Path of the invalid checksum file.
        path: PathBuf,
        /// What is wrong with the content.
        reason: String,
    },

    /// Filesystem error while reading a data or checksum file.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ChecksumError {
    /// Creates a not-found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates an invalid-content error.
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the checksum file itself is missing or malformed.
    ///
    /// Data file read failures are not structural checksum problems.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Invalid { .. })
    }
}
