//! Download, verify and retry control loop.
//!
//! One invocation moves through `Idle → Downloading → Verifying` and ends
//! in [`RunPhase::Converged`] when the tracker is empty afterwards, or
//! [`RunPhase::PartiallyFailed`] otherwise. A partial failure is a normal
//! outcome: everything that still fails is in the tracker and the next
//! invocation starts by re-fetching it.
//!
//! Cancellation is coarse. The interrupt flag is checked between transfer
//! batches and before verification starts; a running batch or hash pass
//! is never cut short.

mod error;
mod stats;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::checksum::store::remove_if_exists;
use crate::checksum::{
    CHECKSUM_SUFFIX, ChecksumVerifier, PreValidation, ValidatedFile, VerifyProgressCallback,
    VerifyReport, default_worker_count, is_companion, partition, verified_marker_path,
};
use crate::layout::ArchiveLayout;
use crate::tracker::FailedFileTracker;
use crate::transfer::{DownloadRequest, Transfer, batches, find_missing};

pub use error::OrchestratorError;
pub use stats::DownloadStats;

/// Default number of gap-detection passes per invocation.
pub const DEFAULT_MAX_TRIES: usize = 3;

/// Default number of requests per transfer batch.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// Tracker error for files whose checksum companion is structurally broken.
pub const INVALID_CHECKSUM_ERROR: &str = "invalid/empty checksum file";

/// Tracker error for files whose digest does not match.
pub const MISMATCH_ERROR: &str = "checksum mismatch";

/// Leading text of the tracker error for files that never arrived.
pub const MISSING_ERROR_PREFIX: &str = "missing after";

fn missing_error(max_tries: usize) -> String {
    format!("{MISSING_ERROR_PREFIX} {max_tries} download attempts")
}

/// Tunables for one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Fetch checksum companions and verify data files.
    pub verify: bool,
    /// Delete data files (and companions) whose digest does not match.
    pub delete_on_mismatch: bool,
    /// Maximum gap-detection passes.
    pub max_tries: usize,
    /// Requests per transfer batch.
    pub batch_size: usize,
    /// Hashing worker count.
    pub workers: usize,
    /// Proxy forwarded to the transfer mechanism.
    pub proxy: Option<String>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            verify: false,
            delete_on_mismatch: false,
            max_tries: DEFAULT_MAX_TRIES,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: default_worker_count(),
            proxy: None,
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Nothing started yet.
    Idle,
    /// Re-fetching tracked files or filling gaps.
    Downloading,
    /// Pre-validating and hashing.
    Verifying,
    /// Every requested file is present and nothing is tracked.
    Converged,
    /// Something is still tracked or missing.
    PartiallyFailed,
}

impl RunPhase {
    /// Returns true for `Converged` and `PartiallyFailed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::PartiallyFailed)
    }

    /// Lowercase label for logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Converged => "converged",
            Self::PartiallyFailed => "partially-failed",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the verification stage did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifySummary {
    /// Files whose checksum companion failed pre-validation.
    pub invalid_checksums: Vec<PathBuf>,
    /// Files hashed and matched in this run.
    pub verified: usize,
    /// Files skipped because a verified marker already existed.
    pub already_verified: usize,
    /// Files whose digest did not match.
    pub mismatches: usize,
    /// Files whose checksum was broken at hash time despite pre-validation.
    pub precondition_violations: usize,
    /// Read errors and failed workers.
    pub other_failures: usize,
}

impl VerifySummary {
    /// Number of files that failed in any way.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.invalid_checksums.len()
            + self.mismatches
            + self.precondition_violations
            + self.other_failures
    }
}

/// Result of [`RetryOrchestrator::run`] or [`RetryOrchestrator::run_retry_only`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Terminal phase.
    pub phase: RunPhase,
    /// Requests planned (data files plus companions).
    pub requested: usize,
    /// Destinations still absent after the download passes.
    pub still_missing: Vec<PathBuf>,
    /// Verification details, when verification ran.
    pub verification: Option<VerifySummary>,
    /// Tracker records left after the run.
    pub pending: usize,
    /// True when the interrupt flag stopped the run early.
    pub interrupted: bool,
}

impl RunOutcome {
    /// Returns true when the run converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.phase == RunPhase::Converged
    }
}

/// Removes the verified markers of the data files about to be fetched, so
/// the new content is hashed again.
fn drop_markers(requests: &[DownloadRequest]) {
    for request in requests.iter().filter(|r| !is_companion(&r.destination)) {
        remove_if_exists(&verified_marker_path(&request.destination));
    }
}

/// Drives the download → verify → record cycle for one data directory.
pub struct RetryOrchestrator {
    layout: ArchiveLayout,
    transfer: Arc<dyn Transfer>,
    tracker: FailedFileTracker,
    verifier: ChecksumVerifier,
    options: RetryOptions,
    phase: RunPhase,
    stats: DownloadStats,
    interrupted: Arc<AtomicBool>,
    verify_progress: Option<VerifyProgressCallback>,
}

impl fmt::Debug for RetryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("layout", &self.layout)
            .field("transfer", &self.transfer.name())
            .field("tracker", &self.tracker)
            .field("options", &self.options)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl RetryOrchestrator {
    /// Creates an orchestrator. `max_tries` and `batch_size` are raised to at least one.
    #[must_use]
    pub fn new(
        layout: ArchiveLayout,
        transfer: Arc<dyn Transfer>,
        tracker: FailedFileTracker,
        mut options: RetryOptions,
    ) -> Self {
        options.max_tries = options.max_tries.max(1);
        options.batch_size = options.batch_size.max(1);
        let verifier =
            ChecksumVerifier::new(options.delete_on_mismatch).with_workers(options.workers);
        Self {
            layout,
            transfer,
            tracker,
            verifier,
            options,
            phase: RunPhase::Idle,
            stats: DownloadStats::new(),
            interrupted: Arc::new(AtomicBool::new(false)),
            verify_progress: None,
        }
    }

    /// Shares an interrupt flag (typically set by a Ctrl-C handler).
    #[must_use]
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Installs a `(done, total)` callback for the hash pass.
    #[must_use]
    pub fn with_verify_progress(mut self, callback: VerifyProgressCallback) -> Self {
        self.verify_progress = Some(callback);
        self
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Transfer counters.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Effective options.
    #[must_use]
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// The failed-file tracker.
    #[must_use]
    pub fn tracker(&self) -> &FailedFileTracker {
        &self.tracker
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Submits requests batch by batch. Returns false if interrupted.
    async fn submit(&mut self, requests: &[DownloadRequest]) -> Result<bool, OrchestratorError> {
        for batch in batches(requests, self.options.batch_size) {
            if self.is_interrupted() {
                warn!("interrupted between transfer batches");
                return Ok(false);
            }
            let status = self
                .transfer
                .transfer(batch, self.options.proxy.as_deref())
                .await?;
            self.stats.record_batch(batch.len(), status);
            if status != 0 {
                warn!(
                    transfer = self.transfer.name(),
                    status,
                    requests = batch.len(),
                    "transfer batch reported failures, relying on gap detection"
                );
            }
        }
        Ok(true)
    }

    /// Re-fetches every tracked URL (data and checksum companions).
    ///
    /// Verified markers of re-fetched data files are dropped so the new
    /// content is hashed again. Returns the number of requests submitted.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Transfer`] if a batch cannot be attempted.
    #[instrument(skip(self), fields(pending = self.tracker.count()))]
    pub async fn retry_tracked(&mut self) -> Result<usize, OrchestratorError> {
        if !self.tracker.has_pending() {
            return Ok(0);
        }
        self.phase = RunPhase::Downloading;

        let requests = self.layout.requests_from_urls(&self.tracker.retry_targets());
        info!(
            records = self.tracker.count(),
            requests = requests.len(),
            "re-fetching tracked files"
        );
        drop_markers(&requests);
        self.submit(&requests).await?;
        Ok(requests.len())
    }

    /// Fetches whatever is missing, up to `max_tries` passes.
    ///
    /// Each pass re-checks the filesystem, so a batch that exited non-zero
    /// is simply retried on the next pass. A marker left next to a missing
    /// data file is dropped before fetching it. Returns the requests whose
    /// destination is still absent.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Transfer`] if a batch cannot be attempted.
    #[instrument(skip(self, requests), fields(requests = requests.len(), max_tries = self.options.max_tries))]
    pub async fn download(
        &mut self,
        requests: &[DownloadRequest],
    ) -> Result<Vec<DownloadRequest>, OrchestratorError> {
        self.phase = RunPhase::Downloading;

        for attempt in 1..=self.options.max_tries {
            let missing = find_missing(requests);
            if missing.is_empty() {
                debug!(attempt, "nothing missing");
                return Ok(missing);
            }
            info!(attempt, missing = missing.len(), "fetching missing files");
            drop_markers(&missing);
            if !self.submit(&missing).await? {
                break;
            }
        }

        let still_missing = find_missing(requests);
        if !still_missing.is_empty() {
            warn!(
                missing = still_missing.len(),
                max_tries = self.options.max_tries,
                "files still missing after download passes"
            );
        }
        Ok(still_missing)
    }

    fn urls_for(&self, data_file: &Path) -> (String, Option<String>) {
        let url = self
            .layout
            .url_for(data_file)
            .or_else(|| self.tracker.get(data_file).map(|record| record.url.clone()))
            .unwrap_or_else(|| data_file.display().to_string());
        let checksum_url = self.layout.checksum_url_for(data_file).or_else(|| {
            self.tracker
                .get(data_file)
                .and_then(|record| record.checksum_url.clone())
        });
        (url, checksum_url)
    }

    fn record_missing(&mut self, missing: &[DownloadRequest]) -> Result<(), OrchestratorError> {
        let error = missing_error(self.options.max_tries);
        for request in missing.iter().filter(|r| !is_companion(&r.destination)) {
            let checksum_url = self
                .options
                .verify
                .then(|| format!("{}{CHECKSUM_SUFFIX}", request.url));
            self.tracker.record_failure(
                &request.destination,
                &error,
                &request.url,
                checksum_url.as_deref(),
            )?;
        }
        Ok(())
    }

    /// Pre-validates and verifies the present data files among `data_files`.
    ///
    /// Files that already carry a verified marker are skipped and cleared
    /// from the tracker. Broken checksum companions are recorded as
    /// [`INVALID_CHECKSUM_ERROR`] and never hashed; mismatches are recorded
    /// as [`MISMATCH_ERROR`]; files that verify are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Tracker`] if the tracker cannot be persisted.
    #[instrument(skip(self, data_files), fields(candidates = data_files.len()))]
    pub async fn verify(
        &mut self,
        data_files: &[PathBuf],
    ) -> Result<VerifySummary, OrchestratorError> {
        self.phase = RunPhase::Verifying;
        let mut summary = VerifySummary::default();

        let (already, candidates): (Vec<PathBuf>, Vec<PathBuf>) = data_files
            .iter()
            .filter(|path| path.exists())
            .cloned()
            .partition(|path| verified_marker_path(path).exists());
        summary.already_verified = already.len();
        self.tracker.clear_resolved(&already)?;

        if candidates.is_empty() {
            debug!(already_verified = summary.already_verified, "nothing to verify");
            return Ok(summary);
        }
        if self.is_interrupted() {
            warn!("interrupted before verification");
            return Ok(summary);
        }

        let PreValidation { validated, invalid } = partition(&candidates);
        for path in &invalid {
            let (url, checksum_url) = self.urls_for(path);
            self.tracker.record_failure(
                path,
                INVALID_CHECKSUM_ERROR,
                &url,
                checksum_url.as_deref(),
            )?;
        }
        summary.invalid_checksums = invalid;

        let files: Vec<PathBuf> = validated.into_iter().map(ValidatedFile::into_path).collect();
        let report = self
            .verifier
            .verify_many_with_progress(files, self.verify_progress.clone())
            .await;

        self.apply_report(&report, &mut summary)?;

        info!(
            verified = summary.verified,
            already_verified = summary.already_verified,
            invalid_checksums = summary.invalid_checksums.len(),
            mismatches = summary.mismatches,
            precondition_violations = summary.precondition_violations,
            other_failures = summary.other_failures,
            "verification finished"
        );
        Ok(summary)
    }

    /// Folds a verifier report into the tracker: failures are recorded
    /// (mismatches as [`MISMATCH_ERROR`], anything else with its own
    /// message) and verified files are cleared.
    fn apply_report(
        &mut self,
        report: &VerifyReport,
        summary: &mut VerifySummary,
    ) -> Result<(), OrchestratorError> {
        let mut failures: Vec<_> = report.errors.iter().collect();
        failures.sort_by(|a, b| a.0.cmp(b.0));
        for (path, failure) in failures {
            let error = if failure.is_mismatch() {
                summary.mismatches += 1;
                MISMATCH_ERROR.to_string()
            } else {
                if failure.is_precondition_violation() {
                    summary.precondition_violations += 1;
                } else {
                    summary.other_failures += 1;
                }
                failure.to_string()
            };
            let (url, checksum_url) = self.urls_for(path);
            self.tracker
                .record_failure(path, &error, &url, checksum_url.as_deref())?;
        }

        self.tracker.clear_resolved(&report.verified)?;
        summary.verified = report.success_count;
        Ok(())
    }

    /// Without verification, presence only resolves records of files that
    /// never arrived; integrity failures stay tracked until they verify.
    fn clear_arrived(&mut self, targets: Vec<PathBuf>) -> Result<(), OrchestratorError> {
        let arrived: Vec<PathBuf> = targets
            .into_iter()
            .filter(|path| path.exists())
            .filter(|path| {
                self.tracker
                    .get(path)
                    .is_some_and(|record| record.error.starts_with(MISSING_ERROR_PREFIX))
            })
            .collect();
        self.tracker.clear_resolved(&arrived)?;
        Ok(())
    }

    async fn finish(
        &mut self,
        requested: usize,
        data_files: Vec<PathBuf>,
        still_missing: Vec<DownloadRequest>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let interrupted = self.is_interrupted();

        let verification = if interrupted {
            None
        } else {
            self.record_missing(&still_missing)?;

            let targets: Vec<PathBuf> = data_files
                .into_iter()
                .chain(self.tracker.tracked_paths())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            if self.options.verify {
                Some(self.verify(&targets).await?)
            } else {
                self.clear_arrived(targets)?;
                None
            }
        };

        self.phase = if interrupted || self.tracker.has_pending() || !still_missing.is_empty() {
            RunPhase::PartiallyFailed
        } else {
            RunPhase::Converged
        };

        let outcome = RunOutcome {
            phase: self.phase,
            requested,
            still_missing: still_missing
                .into_iter()
                .map(|request| request.destination)
                .collect(),
            verification,
            pending: self.tracker.count(),
            interrupted,
        };
        info!(
            phase = %outcome.phase,
            requested = outcome.requested,
            missing = outcome.still_missing.len(),
            pending = outcome.pending,
            batches = self.stats.batches(),
            "run finished"
        );
        Ok(outcome)
    }

    /// Full invocation for a desired set of keys.
    ///
    /// Re-fetches tracked failures first, fills gaps in the desired set,
    /// records files that never arrived, then verifies. With verification
    /// off, only records of files that were missing and have now arrived
    /// are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] if a transfer cannot be attempted or the
    /// tracker cannot be persisted.
    #[instrument(skip(self, keys), fields(keys = keys.len(), verify = self.options.verify))]
    pub async fn run(&mut self, keys: &[String]) -> Result<RunOutcome, OrchestratorError> {
        let requests = self.layout.plan(keys, self.options.verify);
        let data_files = self.layout.data_files(keys);

        self.retry_tracked().await?;
        let still_missing = self.download(&requests).await?;
        self.finish(requests.len(), data_files, still_missing).await
    }

    /// Retry-only invocation: re-fetch and re-check tracked files without a
    /// desired set.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    #[instrument(skip(self), fields(pending = self.tracker.count()))]
    pub async fn run_retry_only(&mut self) -> Result<RunOutcome, OrchestratorError> {
        if !self.tracker.has_pending() {
            info!("no tracked failures to retry");
            self.phase = RunPhase::Converged;
            return Ok(RunOutcome {
                phase: self.phase,
                requested: 0,
                still_missing: Vec::new(),
                verification: None,
                pending: 0,
                interrupted: false,
            });
        }

        let requests = self.layout.requests_from_urls(&self.tracker.retry_targets());
        let data_files = self.tracker.tracked_paths();

        self.retry_tracked().await?;
        let still_missing = self.download(&requests).await?;
        self.finish(requests.len(), data_files, still_missing).await
    }
}
