//! Local inventory of data files awaiting verification.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::checksum::{is_companion, verified_marker_path};
use crate::transfer::is_transfer_control;

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Returns every data file under `root` that has no verified marker, sorted.
///
/// Checksum companions, verified markers, aria2 control files of unfinished
/// downloads and hidden files (including the failed-file tracker) are skipped. A missing root yields an empty list.
#[must_use]
pub fn unverified_data_files(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .is_none_or(|name| !is_hidden(name))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry during scan");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| !is_companion(path) && !is_transfer_control(path))
        .filter(|path| !verified_marker_path(path).exists())
        .collect();

    files.sort();
    debug!(root = %root.display(), count = files.len(), "scanned for unverified files");
    files
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_skips_companions_and_verified() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("spot").join("daily");
        fs::create_dir_all(&nested).unwrap();

        fs::write(nested.join("a.zip"), b"a").unwrap();
        fs::write(nested.join("a.zip.CHECKSUM"), b"x").unwrap();
        fs::write(nested.join("b.zip"), b"b").unwrap();
        fs::write(nested.join("b.zip.verified"), b"").unwrap();
        fs::write(temp.path().join("c.zip"), b"c").unwrap();
        fs::write(temp.path().join(".failed_files.json"), b"{}").unwrap();

        let files = unverified_data_files(temp.path());

        assert_eq!(files, vec![nested.join("a.zip"), temp.path().join("c.zip")]);
    }

    #[test]
    fn test_scan_skips_hidden_directories() {
        let temp = TempDir::new().unwrap();
        let hidden = temp.path().join(".cache");
        fs::create_dir_all(&hidden).unwrap();
        fs::write(hidden.join("x.zip"), b"x").unwrap();

        assert!(unverified_data_files(temp.path()).is_empty());
    }

    #[test]
    fn test_scan_skips_transfer_control_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.zip"), b"a").unwrap();
        fs::write(temp.path().join("a.zip.aria2"), b"ctl").unwrap();

        let files = unverified_data_files(temp.path());

        assert_eq!(files, vec![temp.path().join("a.zip")]);
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(unverified_data_files(&temp.path().join("absent")).is_empty());
    }
}
