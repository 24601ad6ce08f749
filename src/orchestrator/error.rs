//! Error type for orchestration runs.

use thiserror::Error;

use crate::tracker::TrackerError;
use crate::transfer::TransferError;

/// Conditions that abort an orchestration run.
///
/// Transfer batches that exit non-zero, checksum defects and content
/// mismatches are not errors; they are retried or recorded in the tracker.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The failed-file tracker could not be persisted.
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// A transfer batch could not be attempted at all.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}
