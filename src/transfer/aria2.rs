//! `aria2c` subprocess backend.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{DownloadRequest, Transfer, TransferError};

/// Name of the downloader binary looked up on `PATH`.
pub const ARIA2_BINARY: &str = "aria2c";

/// Suffix of the control file aria2 keeps next to an unfinished download.
pub const TRANSFER_CONTROL_SUFFIX: &str = ".aria2";

const DEFAULT_MAX_CONCURRENT: usize = 32;
const DEFAULT_CONNECTIONS_PER_SERVER: usize = 4;

/// Searches each directory of a `PATH`-style value for an executable file.
#[must_use]
pub fn find_on_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Returns true if `path` is an aria2 control file rather than a download.
#[must_use]
pub fn is_transfer_control(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TRANSFER_CONTROL_SUFFIX))
}

/// Renders the aria2 input file for a batch.
///
/// Each entry is the URL followed by indented `dir=` and `out=` options so
/// the file lands at exactly the requested destination.
#[must_use]
pub fn render_input(batch: &[DownloadRequest]) -> String {
    let mut out = String::new();
    for request in batch {
        let dir = request
            .destination
            .parent()
            .map_or_else(|| ".".to_string(), |p| p.display().to_string());
        let _ = writeln!(out, "{}", request.url);
        let _ = writeln!(out, "  dir={dir}");
        if let Some(name) = request.destination.file_name() {
            let _ = writeln!(out, "  out={}", name.to_string_lossy());
        }
    }
    out
}

/// Runs batches through the `aria2c` command-line downloader.
///
/// `aria2c` manages its own connection pool; one process is spawned per
/// batch and its exit code returned as the batch status.
#[derive(Debug, Clone)]
pub struct Aria2Transfer {
    binary: PathBuf,
    quiet: bool,
    max_concurrent: usize,
    connections_per_server: usize,
}

impl Aria2Transfer {
    /// Locates `aria2c` on the current `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::BinaryNotFound`] if it is not installed.
    pub fn locate() -> Result<Self, TransferError> {
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        find_on_path(ARIA2_BINARY, &path_var)
            .map(Self::with_binary)
            .ok_or_else(|| TransferError::binary_not_found(ARIA2_BINARY))
    }

    /// Uses an explicit binary path.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            quiet: false,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            connections_per_server: DEFAULT_CONNECTIONS_PER_SERVER,
        }
    }

    /// Suppresses aria2's console output.
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Returns the resolved binary path.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, input: &Path, proxy: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env_clear()
            .arg("-i")
            .arg(input)
            .arg(format!("-j{}", self.max_concurrent))
            .arg(format!("-x{}", self.connections_per_server))
            .arg("--allow-overwrite=true")
            .arg("--auto-file-renaming=false")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.quiet {
            cmd.arg("-q");
        }
        if let Some(proxy) = proxy {
            cmd.arg(format!("--https-proxy={proxy}"));
        }
        cmd
    }
}

#[async_trait]
impl Transfer for Aria2Transfer {
    fn name(&self) -> &str {
        ARIA2_BINARY
    }

    #[instrument(skip(self, batch, proxy), fields(requests = batch.len(), proxied = proxy.is_some()))]
    async fn transfer(
        &self,
        batch: &[DownloadRequest],
        proxy: Option<&str>,
    ) -> Result<i32, TransferError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let parents: BTreeSet<&Path> = batch
            .iter()
            .filter_map(|request| request.destination.parent())
            .filter(|parent| !parent.as_os_str().is_empty())
            .collect();
        for parent in parents {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TransferError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }

        let mut input = NamedTempFile::new()
            .map_err(|e| TransferError::io("creating aria2 input file", e))?;
        input
            .write_all(render_input(batch).as_bytes())
            .and_then(|()| input.flush())
            .map_err(|e| TransferError::io("writing aria2 input file", e))?;

        debug!(binary = %self.binary.display(), input = %input.path().display(), "spawning aria2c");
        let status = self
            .command(input.path(), proxy)
            .status()
            .await
            .map_err(|e| TransferError::io("running aria2c", e))?;

        let code = status.code().unwrap_or(-1);
        if code == 0 {
            info!(requests = batch.len(), "aria2c batch finished");
        } else {
            warn!(requests = batch.len(), code, "aria2c batch exited with failures");
        }
        Ok(code)
    }
}
