//! Shared fixtures for integration tests: a scripted transfer backend and
//! helpers for laying out archive files with checksum companions.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use archive_fetch_core::checksum::{CHECKSUM_SUFFIX, checksum_path};
use archive_fetch_core::{DownloadRequest, Transfer, TransferError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Contents every healthy fixture archive carries.
pub const HELLO: &[u8] = b"hello";

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Writes `content` to `data_file` plus a matching checksum file.
pub fn write_archive(data_file: &Path, content: &[u8]) {
    write_archive_with_digest(data_file, content, &sha256_hex(content));
}

/// Writes `content` to `data_file` plus a checksum file carrying `digest`
/// in `digest  name` form.
pub fn write_archive_with_digest(data_file: &Path, content: &[u8], digest: &str) {
    fs::create_dir_all(data_file.parent().expect("data file has a parent"))
        .expect("Failed to create parent dir");
    fs::write(data_file, content).expect("Failed to write data file");
    let name = data_file
        .file_name()
        .expect("data file has a name")
        .to_string_lossy();
    fs::write(checksum_path(data_file), format!("{digest}  {name}\n"))
        .expect("Failed to write checksum file");
}

/// What the scripted transfer writes for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Leave the destination absent.
    Skip,
    /// Write these bytes to the destination.
    Bytes(Vec<u8>),
}

/// Serves `content` for data files and a matching digest for checksum files.
pub fn healthy(request: &DownloadRequest, content: &[u8]) -> Delivery {
    let name = request
        .destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(CHECKSUM_SUFFIX) {
        Some(data_name) => {
            Delivery::Bytes(format!("{}  {data_name}\n", sha256_hex(content)).into_bytes())
        }
        None => Delivery::Bytes(content.to_vec()),
    }
}

type Script = Box<dyn Fn(&DownloadRequest) -> Delivery + Send + Sync>;

/// Transfer backend that records every batch and writes files per a script.
pub struct RecordingTransfer {
    script: Mutex<Script>,
    batches: Mutex<Vec<Vec<PathBuf>>>,
    status: i32,
}

impl RecordingTransfer {
    /// Creates a backend that answers each request with `script`.
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&DownloadRequest) -> Delivery + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Mutex::new(Box::new(script)),
            batches: Mutex::new(Vec::new()),
            status: 0,
        })
    }

    /// Backend that serves [`HELLO`] archives with valid checksums.
    pub fn serving_hello() -> Arc<Self> {
        Self::new(|request| healthy(request, HELLO))
    }

    /// Backend that never writes anything and exits non-zero.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Box::new(|_| Delivery::Skip)),
            batches: Mutex::new(Vec::new()),
            status: 1,
        })
    }

    /// Replaces the script for subsequent batches.
    pub fn set_script<F>(&self, script: F)
    where
        F: Fn(&DownloadRequest) -> Delivery + Send + Sync + 'static,
    {
        *self.script.lock().expect("script lock poisoned") = Box::new(script);
    }

    /// Destinations of every batch submitted so far.
    pub fn batches(&self) -> Vec<Vec<PathBuf>> {
        self.batches.lock().expect("batches lock poisoned").clone()
    }

    /// Every destination submitted so far, across batches.
    pub fn requested(&self) -> Vec<PathBuf> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl Transfer for RecordingTransfer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn transfer(
        &self,
        batch: &[DownloadRequest],
        _proxy: Option<&str>,
    ) -> Result<i32, TransferError> {
        self.batches
            .lock()
            .expect("batches lock poisoned")
            .push(batch.iter().map(|r| r.destination.clone()).collect());

        let script = self.script.lock().expect("script lock poisoned");
        for request in batch {
            if let Delivery::Bytes(bytes) = script(request) {
                if let Some(parent) = request.destination.parent() {
                    fs::create_dir_all(parent).expect("Failed to create destination dir");
                }
                fs::write(&request.destination, bytes).expect("Failed to write destination");
            }
        }
        Ok(self.status)
    }
}
