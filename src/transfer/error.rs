//! Error types for the transfer mechanism.

use thiserror::Error;

/// Errors that abort a transfer invocation.
///
/// A batch that merely fails to fetch some files is not an error; the
/// mechanism reports that through its exit status.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The external downloader binary is not installed.
    #[error("required binary '{name}' not found on PATH")]
    BinaryNotFound {
        /// Binary name that was searched for.
        name: String,
    },

    /// Local IO failed while preparing or running the batch.
    #[error("IO error while {context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Creates a missing-binary error.
    pub fn binary_not_found(name: impl Into<String>) -> Self {
        Self::BinaryNotFound { name: name.into() }
    }

    /// Creates an IO error with a short description of the failed step.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
