//! Error types for tracker persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while persisting the failed-file tracker.
///
/// Loading never fails; see [`FailedFileTracker::open`](super::FailedFileTracker::open).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Filesystem error while writing the tracker document.
    #[error("IO error writing tracker {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The in-memory map could not be serialized.
    #[error("failed to serialize tracker: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl TrackerError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
