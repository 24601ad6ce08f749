//! Batch transfer contract and gap detection.
//!
//! The orchestrator never talks to the network itself. It hands batches of
//! [`DownloadRequest`]s to a [`Transfer`] implementation and then re-checks
//! the filesystem to learn what actually arrived; the status returned by a
//! transfer is advisory only.

mod aria2;
mod error;

use std::path::PathBuf;

use async_trait::async_trait;

pub use aria2::{
    ARIA2_BINARY, Aria2Transfer, TRANSFER_CONTROL_SUFFIX, find_on_path, is_transfer_control,
    render_input,
};
pub use error::TransferError;

/// One remote locator paired with its local destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadRequest {
    /// Remote URL.
    pub url: String,
    /// Local destination path.
    pub destination: PathBuf,
}

impl DownloadRequest {
    /// Creates a request.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// Returns true if the destination already exists on disk.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.destination.exists()
    }
}

/// An external batch downloader.
///
/// Implementations fetch each request to its destination, creating parent
/// directories as needed, and return a single status for the whole batch
/// (`0` when the mechanism finished without a fatal error).
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetches one batch.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] only when the batch could not be attempted
    /// at all (binary missing, local IO failure).
    async fn transfer(
        &self,
        batch: &[DownloadRequest],
        proxy: Option<&str>,
    ) -> Result<i32, TransferError>;
}

/// Returns the requests whose destination does not exist yet, in input order.
///
/// Presence is an existence check only; validity is decided by verification.
#[must_use]
pub fn find_missing(requests: &[DownloadRequest]) -> Vec<DownloadRequest> {
    requests
        .iter()
        .filter(|request| !request.is_present())
        .cloned()
        .collect()
}

/// Splits requests into contiguous batches of at most `size` entries.
///
/// A `size` of zero is treated as one.
pub fn batches(
    requests: &[DownloadRequest],
    size: usize,
) -> impl Iterator<Item = &[DownloadRequest]> {
    requests.chunks(size.max(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn requests_in(temp: &TempDir, count: usize) -> Vec<DownloadRequest> {
        (0..count)
            .map(|i| {
                DownloadRequest::new(
                    format!("https://host/data/f{i}.zip"),
                    temp.path().join(format!("f{i}.zip")),
                )
            })
            .collect()
    }

    #[test]
    fn test_find_missing_skips_present_files() {
        let temp = TempDir::new().unwrap();
        let requests = requests_in(&temp, 4);
        fs::write(&requests[1].destination, b"x").unwrap();
        fs::write(&requests[3].destination, b"x").unwrap();

        let missing = find_missing(&requests);

        assert_eq!(missing, vec![requests[0].clone(), requests[2].clone()]);
    }

    #[test]
    fn test_batches_respect_size() {
        let temp = TempDir::new().unwrap();
        let requests = requests_in(&temp, 7);

        let sizes: Vec<usize> = batches(&requests, 3).map(<[DownloadRequest]>::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_batches_zero_size_is_one() {
        let temp = TempDir::new().unwrap();
        let requests = requests_in(&temp, 2);
        assert_eq!(batches(&requests, 0).count(), 2);
    }

    #[test]
    fn test_batches_empty_input() {
        assert_eq!(batches(&[], 4096).count(), 0);
    }
}
