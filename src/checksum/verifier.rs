//! Parallel content verification of data files against their checksum files.
//!
//! Hashing is CPU-bound and dominates the cost of the whole pipeline, so
//! [`ChecksumVerifier::verify_many`] fans files out over Tokio's blocking
//! thread pool, bounded by a semaphore sized to the worker count.
//!
//! # Precondition
//!
//! Every file handed to the verifier must have passed
//! [`partition`](super::partition). A missing or malformed checksum file
//! reaching this stage is a plumbing defect, not data corruption: it is
//! logged at error level, reported as
//! [`VerifyFailure::ChecksumPrecondition`], and the data file is kept.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use super::store::{
    checksum_path, compute_digest, purge_with_companions, read_digest, verified_marker_path,
};

/// Number of cores left free for the rest of the system.
const WORKER_RESERVE: usize = 2;

/// Callback invoked as files finish: `(done, total)`.
pub type VerifyProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Why a single file did not verify.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyFailure {
    /// Digest of the data file differs from the checksum file.
    #[error("checksum mismatch")]
    Mismatch,

    /// The checksum file was missing or malformed at verification time.
    #[error("checksum precondition violated: {0}")]
    ChecksumPrecondition(String),

    /// The data file could not be read.
    #[error("read error: {0}")]
    Io(String),

    /// The verification task itself failed (panicked or was cancelled).
    #[error("verification worker failed: {0}")]
    Worker(String),
}

impl VerifyFailure {
    /// Returns true for genuine content corruption.
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch)
    }

    /// Returns true when a structurally invalid checksum slipped past pre-validation.
    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::ChecksumPrecondition(_))
    }
}

/// Aggregated result of [`ChecksumVerifier::verify_many`].
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Number of files that verified.
    pub success_count: usize,
    /// Number of files that did not verify.
    pub failed_count: usize,
    /// Files that verified, in submission order.
    pub verified: Vec<PathBuf>,
    /// Per-file failure reasons.
    pub errors: HashMap<PathBuf, VerifyFailure>,
}

impl VerifyReport {
    /// Total number of files processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }

    /// Returns the failures that are genuine content mismatches.
    pub fn mismatches(&self) -> impl Iterator<Item = &PathBuf> {
        self.errors
            .iter()
            .filter(|(_, failure)| failure.is_mismatch())
            .map(|(path, _)| path)
    }

    fn record_success(&mut self, path: PathBuf) {
        self.success_count += 1;
        self.verified.push(path);
    }

    fn record_failure(&mut self, path: PathBuf, failure: VerifyFailure) {
        self.failed_count += 1;
        self.errors.insert(path, failure);
    }
}

/// Returns the default worker count: available cores minus a reserve, at least one.
#[must_use]
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .saturating_sub(WORKER_RESERVE)
        .max(1)
}

/// Verifies data files against their checksum files.
#[derive(Debug, Clone)]
pub struct ChecksumVerifier {
    /// Delete data file and companions when the digest does not match.
    delete_on_mismatch: bool,
    /// Maximum number of files hashed at once.
    worker_count: usize,
}

impl Default for ChecksumVerifier {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ChecksumVerifier {
    /// Creates a verifier with the default worker count.
    #[must_use]
    pub fn new(delete_on_mismatch: bool) -> Self {
        Self {
            delete_on_mismatch,
            worker_count: default_worker_count(),
        }
    }

    /// Overrides the worker count (clamped to at least one).
    #[must_use]
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    /// Returns whether mismatching files are deleted.
    #[must_use]
    pub fn delete_on_mismatch(&self) -> bool {
        self.delete_on_mismatch
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Verifies a single data file.
    ///
    /// Returns `Ok(true)` and writes the verified marker when digests match,
    /// `Ok(false)` on mismatch (after purging the file and its companions if
    /// `delete_on_mismatch` is set).
    ///
    /// # Errors
    ///
    /// - [`VerifyFailure::ChecksumPrecondition`] if the checksum file is missing or malformed
    /// - [`VerifyFailure::Io`] if the data file cannot be read or the marker cannot be written
    pub fn verify_one(&self, data_file: &Path) -> Result<bool, VerifyFailure> {
        let expected = read_digest(&checksum_path(data_file)).map_err(|e| {
            error!(
                path = %data_file.display(),
                error = %e,
                "checksum file reached verifier without passing pre-validation"
            );
            VerifyFailure::ChecksumPrecondition(e.to_string())
        })?;

        let actual = compute_digest(data_file).map_err(|e| VerifyFailure::Io(e.to_string()))?;

        if actual != expected {
            debug!(
                path = %data_file.display(),
                %expected,
                %actual,
                "checksum mismatch"
            );
            if self.delete_on_mismatch {
                purge_with_companions(data_file);
                debug!(path = %data_file.display(), "deleted corrupted file and companions");
            }
            return Ok(false);
        }

        let marker = verified_marker_path(data_file);
        fs::write(&marker, b"").map_err(|e| {
            VerifyFailure::Io(format!("writing marker {}: {e}", marker.display()))
        })?;
        Ok(true)
    }

    /// Verifies many files in parallel.
    ///
    /// One file's failure never aborts or skips another; every outcome is
    /// folded into the returned [`VerifyReport`].
    pub async fn verify_many(&self, files: Vec<PathBuf>) -> VerifyReport {
        self.verify_many_with_progress(files, None).await
    }

    /// Same as [`verify_many`](Self::verify_many) with a progress callback.
    #[instrument(skip(self, files, on_progress), fields(count = files.len(), workers = self.worker_count))]
    pub async fn verify_many_with_progress(
        &self,
        files: Vec<PathBuf>,
        on_progress: Option<VerifyProgressCallback>,
    ) -> VerifyReport {
        let mut report = VerifyReport::default();
        if files.is_empty() {
            return report;
        }

        let total = files.len();
        let done = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut handles = Vec::with_capacity(total);

        for path in files {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    report.record_failure(path, VerifyFailure::Worker(e.to_string()));
                    continue;
                }
            };

            let verifier = self.clone();
            let done = Arc::clone(&done);
            let on_progress = on_progress.clone();
            let task_path = path.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let outcome = verifier.verify_one(&task_path);
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(callback) = on_progress {
                    callback(finished, total);
                }
                outcome
            });
            handles.push((path, handle));
        }

        for (path, handle) in handles {
            match handle.await {
                Ok(Ok(true)) => report.record_success(path),
                Ok(Ok(false)) => report.record_failure(path, VerifyFailure::Mismatch),
                Ok(Err(failure)) => report.record_failure(path, failure),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "verification task panicked");
                    report.record_failure(path, VerifyFailure::Worker(e.to_string()));
                }
            }
        }

        info!(
            success = report.success_count,
            failed = report.failed_count,
            "verification complete"
        );
        report
    }
}
