//! Durable record of files that failed download or verification.
//!
//! The tracker is a single JSON document mapping a data file path to its
//! latest failure. It is loaded once at construction and rewritten in full
//! after every mutation (temp file + rename), so a crash between mutations
//! always leaves a complete, parseable document behind.
//!
//! The backing file is owned by one process at a time; no locking is done.
//!
//! # Persisted format
//!
//! ```json
//! {
//!   "/data/spot/a.zip": {
//!     "data_file": "/data/spot/a.zip",
//!     "error": "checksum mismatch",
//!     "url": "https://host/data/spot/a.zip",
//!     "checksum_url": "https://host/data/spot/a.zip.CHECKSUM",
//!     "attempts": 2
//!   }
//! }
//! ```

mod error;

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub use error::TrackerError;

/// File name of the tracker document inside the data directory.
pub const TRACKER_FILE_NAME: &str = ".failed_files.json";

/// One tracked failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFileRecord {
    /// Local data file path (same as the map key).
    #[serde(default)]
    pub data_file: String,
    /// Latest error message.
    pub error: String,
    /// Remote URL of the data file.
    pub url: String,
    /// Remote URL of the checksum companion, when known.
    #[serde(default)]
    pub checksum_url: Option<String>,
    /// Number of failures recorded for this path.
    #[serde(default)]
    pub attempts: u32,
}

/// Failure details supplied by callers of [`FailedFileTracker::record_failures_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureInfo {
    /// Error message.
    pub error: String,
    /// Remote URL of the data file.
    pub url: String,
    /// Remote URL of the checksum companion.
    pub checksum_url: Option<String>,
}

impl FailureInfo {
    /// Creates failure details.
    pub fn new(error: impl Into<String>, url: impl Into<String>, checksum_url: Option<String>) -> Self {
        Self {
            error: error.into(),
            url: url.into(),
            checksum_url,
        }
    }
}

/// Persistent tracker of failed files, keyed by data file path.
#[derive(Debug)]
pub struct FailedFileTracker {
    path: PathBuf,
    records: BTreeMap<String, FailedFileRecord>,
}

fn key_for(data_file: &Path) -> String {
    data_file.to_string_lossy().into_owned()
}

impl FailedFileTracker {
    /// Opens the tracker stored at `path`.
    ///
    /// A missing, unreadable or malformed document yields an empty tracker;
    /// losing retry history is recoverable, so this never fails.
    #[must_use]
    #[instrument(fields(path = %path.as_ref().display()), skip(path))]
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = Self::load(&path);
        debug!(records = records.len(), "failed-file tracker loaded");
        Self { path, records }
    }

    /// Opens the tracker at its conventional location inside `data_dir`.
    #[must_use]
    pub fn open_in(data_dir: &Path) -> Self {
        Self::open(data_dir.join(TRACKER_FILE_NAME))
    }

    fn load(path: &Path) -> BTreeMap<String, FailedFileRecord> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "tracker unreadable, starting empty");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "tracker corrupted, starting empty");
                BTreeMap::new()
            }
        }
    }

    fn save(&self) -> Result<(), TrackerError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| TrackerError::io(&parent, e))?;

        let body = serde_json::to_vec_pretty(&self.records)?;
        let mut temp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|e| TrackerError::io(&parent, e))?;
        temp.write_all(&body)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| TrackerError::io(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| TrackerError::io(&self.path, e.error))?;
        Ok(())
    }

    /// Returns the backing document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records a failure for `data_file`, incrementing its attempt count.
    ///
    /// `error`, `url` and `checksum_url` replace any previous values.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] if the document cannot be persisted. The
    /// in-memory record is updated regardless.
    pub fn record_failure(
        &mut self,
        data_file: &Path,
        error: &str,
        url: &str,
        checksum_url: Option<&str>,
    ) -> Result<(), TrackerError> {
        let key = key_for(data_file);
        let attempts = self.records.get(&key).map_or(0, |r| r.attempts) + 1;
        warn!(
            path = %key,
            %error,
            attempts,
            "recording failed file"
        );
        self.records.insert(
            key.clone(),
            FailedFileRecord {
                data_file: key,
                error: error.to_string(),
                url: url.to_string(),
                checksum_url: checksum_url.map(str::to_string),
                attempts,
            },
        );
        self.save()
    }

    /// Records many failures. Each entry is persisted as it is applied.
    ///
    /// # Errors
    ///
    /// Stops at the first persistence failure.
    pub fn record_failures_batch<I>(&mut self, failures: I) -> Result<(), TrackerError>
    where
        I: IntoIterator<Item = (PathBuf, FailureInfo)>,
    {
        for (data_file, info) in failures {
            self.record_failure(
                &data_file,
                &info.error,
                &info.url,
                info.checksum_url.as_deref(),
            )?;
        }
        Ok(())
    }

    /// Returns every URL that should be fetched again: each data URL and,
    /// when recorded, its checksum URL.
    #[must_use]
    pub fn retry_targets(&self) -> Vec<String> {
        self.records
            .values()
            .flat_map(|record| {
                std::iter::once(record.url.clone()).chain(record.checksum_url.clone())
            })
            .collect()
    }

    /// Removes the records for `paths` that are present.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] if the document cannot be persisted.
    pub fn clear_resolved<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, TrackerError> {
        let removed = paths
            .iter()
            .filter(|path| self.records.remove(&key_for(path.as_ref())).is_some())
            .count();
        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "cleared resolved files");
            self.save()?;
        }
        Ok(removed)
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError`] if the document cannot be persisted.
    pub fn clear_all(&mut self) -> Result<(), TrackerError> {
        self.records.clear();
        self.save()
    }

    /// Returns the record for `data_file`, if tracked.
    #[must_use]
    pub fn get(&self, data_file: &Path) -> Option<&FailedFileRecord> {
        self.records.get(&key_for(data_file))
    }

    /// Returns all tracked records keyed by path.
    #[must_use]
    pub fn records(&self) -> &BTreeMap<String, FailedFileRecord> {
        &self.records
    }

    /// Returns the tracked data file paths.
    #[must_use]
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.records.keys().map(PathBuf::from).collect()
    }

    /// Number of tracked records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Returns true if anything is tracked.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.records.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker_in(temp: &TempDir) -> FailedFileTracker {
        FailedFileTracker::open(temp.path().join("state").join(TRACKER_FILE_NAME))
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let tracker = tracker_in(&temp);
        assert_eq!(tracker.count(), 0);
        assert!(!tracker.has_pending());
    }

    #[test]
    fn test_record_failure_creates_then_increments() {
        let temp = TempDir::new().unwrap();
        let mut tracker = tracker_in(&temp);
        let file = Path::new("/data/a.zip");

        tracker
            .record_failure(file, "first", "https://h/a.zip", None)
            .unwrap();
        tracker
            .record_failure(file, "checksum mismatch", "https://h/a2.zip", Some("https://h/a2.zip.CHECKSUM"))
            .unwrap();

        let record = tracker.get(file).unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.error, "checksum mismatch");
        assert_eq!(record.url, "https://h/a2.zip");
        assert_eq!(record.checksum_url.as_deref(), Some("https://h/a2.zip.CHECKSUM"));
        assert_eq!(record.data_file, "/data/a.zip");
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let mut tracker = tracker_in(&temp);
        tracker
            .record_failure(Path::new("/data/a.zip"), "boom", "https://h/a.zip", None)
            .unwrap();
        let path = tracker.path().to_path_buf();
        drop(tracker);

        let reopened = FailedFileTracker::open(&path);
        assert_eq!(reopened.count(), 1);
        assert_eq!(reopened.get(Path::new("/data/a.zip")).unwrap().attempts, 1);
    }

    #[test]
    fn test_corrupted_document_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(TRACKER_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let mut tracker = FailedFileTracker::open(&path);
        assert_eq!(tracker.count(), 0);

        tracker
            .record_failure(Path::new("/data/a.zip"), "boom", "https://h/a.zip", None)
            .unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed.get("/data/a.zip").is_some());
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(TRACKER_FILE_NAME);
        fs::write(
            &path,
            r#"{"/data/a.zip": {"data_file": "/data/a.zip", "error": "e", "url": "u",
                "checksum_url": null, "attempts": 4, "first_seen": "2024-01-01"}}"#,
        )
        .unwrap();

        let tracker = FailedFileTracker::open(&path);
        assert_eq!(tracker.get(Path::new("/data/a.zip")).unwrap().attempts, 4);
    }

    #[test]
    fn test_retry_targets_include_checksum_urls() {
        let temp = TempDir::new().unwrap();
        let mut tracker = tracker_in(&temp);
        tracker
            .record_failure(Path::new("/d/a.zip"), "e", "https://h/a.zip", Some("https://h/a.zip.CHECKSUM"))
            .unwrap();
        tracker
            .record_failure(Path::new("/d/b.zip"), "e", "https://h/b.zip", None)
            .unwrap();

        let mut targets = tracker.retry_targets();
        targets.sort();
        assert_eq!(
            targets,
            vec!["https://h/a.zip", "https://h/a.zip.CHECKSUM", "https://h/b.zip"]
        );
    }

    #[test]
    fn test_batch_then_clear_resolved_leaves_difference() {
        let temp = TempDir::new().unwrap();
        let mut tracker = tracker_in(&temp);

        let failures: Vec<(PathBuf, FailureInfo)> = (0..5)
            .map(|i| {
                (
                    PathBuf::from(format!("/d/{i}.zip")),
                    FailureInfo::new("checksum mismatch", format!("https://h/{i}.zip"), None),
                )
            })
            .collect();
        tracker.record_failures_batch(failures).unwrap();
        assert_eq!(tracker.count(), 5);

        let removed = tracker
            .clear_resolved(&[PathBuf::from("/d/1.zip"), PathBuf::from("/d/3.zip"), PathBuf::from("/d/9.zip")])
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(tracker.count(), 3);

        let reopened = FailedFileTracker::open(tracker.path());
        assert_eq!(reopened.count(), 3);
    }

    #[test]
    fn test_clear_all_persists_empty_document() {
        let temp = TempDir::new().unwrap();
        let mut tracker = tracker_in(&temp);
        tracker
            .record_failure(Path::new("/d/a.zip"), "e", "u", None)
            .unwrap();

        tracker.clear_all().unwrap();

        assert!(!tracker.has_pending());
        assert_eq!(fs::read_to_string(tracker.path()).unwrap().trim(), "{}");
    }
}
