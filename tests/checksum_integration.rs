//! Integration tests for checksum pre-validation and verification.

mod support;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use archive_fetch_core::checksum::{checksum_path, partition, verified_marker_path};
use archive_fetch_core::orchestrator::{INVALID_CHECKSUM_ERROR, MISMATCH_ERROR};
use archive_fetch_core::{
    ArchiveLayout, ChecksumVerifier, FailedFileTracker, RetryOptions, RetryOrchestrator,
    VerifyFailure, validate_and_cleanup,
};
use tempfile::TempDir;

use support::{HELLO, RecordingTransfer, write_archive, write_archive_with_digest};

const WRONG_DIGEST: &str = "0000000000000000000000000000000000000000000000000000000000000000";

fn orchestrator(temp: &TempDir, delete_on_mismatch: bool) -> RetryOrchestrator {
    let layout = ArchiveLayout::new("https://host/data", temp.path()).expect("valid layout");
    let tracker = FailedFileTracker::open_in(temp.path());
    let options = RetryOptions {
        verify: true,
        delete_on_mismatch,
        workers: 2,
        ..RetryOptions::default()
    };
    RetryOrchestrator::new(layout, RecordingTransfer::failing(), tracker, options)
}

#[tokio::test]
async fn test_matching_digest_writes_marker() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("a.zip");
    write_archive(&data, HELLO);

    let report = ChecksumVerifier::new(false)
        .with_workers(2)
        .verify_many(vec![data.clone()])
        .await;

    assert_eq!(report.success_count, 1);
    assert_eq!(report.failed_count, 0);
    assert_eq!(report.verified, vec![data.clone()]);
    assert!(verified_marker_path(&data).exists());
}

#[test]
fn test_empty_checksum_is_invalid_and_purged() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("a.zip");
    fs::write(&data, HELLO).unwrap();
    fs::write(checksum_path(&data), b"").unwrap();
    fs::write(verified_marker_path(&data), b"").unwrap();

    let invalid = validate_and_cleanup(std::slice::from_ref(&data));

    assert_eq!(invalid, vec![data.clone()]);
    assert!(!checksum_path(&data).exists());
    assert!(!verified_marker_path(&data).exists());
    assert!(data.exists(), "data file must survive pre-validation");
}

#[test]
fn test_whitespace_and_missing_checksums_are_invalid() {
    let temp = TempDir::new().unwrap();
    let blank = temp.path().join("blank.zip");
    let missing = temp.path().join("missing.zip");
    let good = temp.path().join("good.zip");
    fs::write(&blank, HELLO).unwrap();
    fs::write(checksum_path(&blank), b"  \n\t\n").unwrap();
    fs::write(&missing, HELLO).unwrap();
    write_archive(&good, HELLO);

    let result = partition(&[blank.clone(), missing.clone(), good.clone()]);

    assert_eq!(result.invalid, vec![blank.clone(), missing]);
    let validated: Vec<PathBuf> = result
        .validated
        .iter()
        .map(|file| file.path().to_path_buf())
        .collect();
    assert_eq!(validated, vec![good]);
    assert!(!checksum_path(&blank).exists());
}

#[tokio::test]
async fn test_mismatch_with_delete_purges_and_tracks() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("a.zip");
    write_archive_with_digest(&data, HELLO, WRONG_DIGEST);

    let mut orch = orchestrator(&temp, true);
    let summary = orch.verify(std::slice::from_ref(&data)).await.unwrap();

    assert_eq!(summary.mismatches, 1);
    assert_eq!(summary.verified, 0);
    assert!(!data.exists());
    assert!(!checksum_path(&data).exists());
    assert!(!verified_marker_path(&data).exists());

    let tracker = FailedFileTracker::open_in(temp.path());
    let record = tracker.get(&data).expect("mismatch must be tracked");
    assert_eq!(record.error, MISMATCH_ERROR);
    assert_eq!(record.url, "https://host/data/a.zip");
    assert_eq!(
        record.checksum_url.as_deref(),
        Some("https://host/data/a.zip.CHECKSUM")
    );
}

#[tokio::test]
async fn test_mismatch_without_delete_keeps_files() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("a.zip");
    write_archive_with_digest(&data, HELLO, WRONG_DIGEST);

    let verifier = ChecksumVerifier::new(false);
    assert_eq!(verifier.verify_one(&data), Ok(false));
    assert!(data.exists());
    assert!(checksum_path(&data).exists());
    assert!(!verified_marker_path(&data).exists());
}

#[tokio::test]
async fn test_invalid_checksum_is_tracked_and_never_hashed() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("a.zip");
    fs::write(&data, HELLO).unwrap();
    fs::write(checksum_path(&data), b"").unwrap();

    let mut orch = orchestrator(&temp, true);
    let summary = orch.verify(std::slice::from_ref(&data)).await.unwrap();

    assert_eq!(summary.invalid_checksums, vec![data.clone()]);
    assert_eq!(summary.mismatches, 0);
    assert_eq!(summary.precondition_violations, 0);
    assert!(data.exists());
    assert_eq!(orch.tracker().get(&data).unwrap().error, INVALID_CHECKSUM_ERROR);
}

#[test]
fn test_verifier_reports_precondition_violation_and_keeps_data() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("a.zip");
    fs::write(&data, HELLO).unwrap();

    let result = ChecksumVerifier::new(true).verify_one(&data);

    assert!(matches!(result, Err(VerifyFailure::ChecksumPrecondition(_))));
    assert!(data.exists(), "precondition violations never delete data");
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("a.zip");
    write_archive(&data, HELLO);
    let verifier = ChecksumVerifier::new(false);

    assert_eq!(verifier.verify_one(&data), Ok(true));
    assert_eq!(verifier.verify_one(&data), Ok(true));
    assert!(verified_marker_path(&data).exists());

    let mut orch = orchestrator(&temp, false);
    let summary = orch.verify(std::slice::from_ref(&data)).await.unwrap();
    assert_eq!(summary.already_verified, 1);
    assert_eq!(summary.verified, 0);
}

#[tokio::test]
async fn test_one_failure_does_not_affect_others() {
    let temp = TempDir::new().unwrap();
    let mut files = Vec::new();
    for i in 0..20 {
        let data = temp.path().join(format!("f{i:02}.zip"));
        if i % 2 == 0 {
            write_archive(&data, HELLO);
        } else {
            write_archive_with_digest(&data, HELLO, WRONG_DIGEST);
        }
        files.push(data);
    }

    let progress = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = Arc::clone(&progress);
    let report = ChecksumVerifier::new(false)
        .with_workers(3)
        .verify_many_with_progress(
            files.clone(),
            Some(Arc::new(move |done, total| {
                assert!(done <= total);
                seen.fetch_max(done, std::sync::atomic::Ordering::SeqCst);
            })),
        )
        .await;

    assert_eq!(report.total(), 20);
    assert_eq!(report.success_count, 10);
    assert_eq!(report.failed_count, 10);
    assert_eq!(report.mismatches().count(), 10);
    assert_eq!(progress.load(std::sync::atomic::Ordering::SeqCst), 20);
    for (i, data) in files.iter().enumerate() {
        assert_eq!(verified_marker_path(data).exists(), i % 2 == 0);
    }
}
