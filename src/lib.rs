//! Archive Fetch Core Library
//!
//! Integrity verification and failure recovery for bulk archive downloads.
//! Files are fetched by an external batch downloader, checked against their
//! vendor-supplied `.CHECKSUM` companions, and anything that fails is kept
//! in a persistent tracker so the next run can heal it.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`checksum`] - Companion naming, pre-validation and parallel verification
//! - [`tracker`] - Persistent record of failed files
//! - [`transfer`] - Batch transfer contract and the `aria2c` backend
//! - [`layout`] - Remote key / URL / local path mapping
//! - [`scan`] - Local inventory of unverified files
//! - [`orchestrator`] - The download → verify → retry loop

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checksum;
pub mod layout;
pub mod orchestrator;
pub mod scan;
pub mod tracker;
pub mod transfer;

// Re-export commonly used types
pub use checksum::{
    ChecksumError, ChecksumVerifier, PreValidation, VerifyFailure, VerifyReport,
    validate_and_cleanup,
};
pub use layout::{ArchiveLayout, LayoutError};
pub use orchestrator::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_TRIES, DownloadStats, OrchestratorError, RetryOptions,
    RetryOrchestrator, RunOutcome, RunPhase, VerifySummary,
};
pub use tracker::{FailedFileRecord, FailedFileTracker, FailureInfo, TRACKER_FILE_NAME, TrackerError};
pub use transfer::{Aria2Transfer, DownloadRequest, Transfer, TransferError};
