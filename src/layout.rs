//! Mapping between remote archive keys, URLs and local paths.
//!
//! A key is the path of an archive below the remote base URL, for example
//! `spot/daily/klines/BTCUSDT/1m/BTCUSDT-1m-2024-01-01.zip`. The same key is
//! used below the local data directory, so the remote tree is mirrored.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::checksum::CHECKSUM_SUFFIX;
use crate::transfer::DownloadRequest;

/// Errors raised when constructing a layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// The base URL does not parse or is not HTTP(S).
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// Offending value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Remote base URL plus local data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    base_url: String,
    data_dir: PathBuf,
}

impl ArchiveLayout {
    /// Creates a layout after validating the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidBaseUrl`] if `base_url` is not an
    /// absolute `http`/`https` URL.
    pub fn new(base_url: &str, data_dir: impl Into<PathBuf>) -> Result<Self, LayoutError> {
        let parsed = Url::parse(base_url).map_err(|e| LayoutError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LayoutError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            data_dir: data_dir.into(),
        })
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Local root directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the request for one key, or `None` if the key would escape
    /// the data directory.
    #[must_use]
    pub fn request_for(&self, key: &str) -> Option<DownloadRequest> {
        let key = normalize_key(key)?;
        Some(DownloadRequest::new(
            format!("{}/{key}", self.base_url),
            self.data_dir.join(&key),
        ))
    }

    /// Expands keys into download requests.
    ///
    /// Keys naming a `.CHECKSUM` companion are folded into their data key.
    /// With `with_checksums`, every data request is followed by its
    /// companion. Duplicates are dropped and first-seen order is kept.
    #[must_use]
    pub fn plan<S: AsRef<str>>(&self, keys: &[S], with_checksums: bool) -> Vec<DownloadRequest> {
        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(keys.len() * if with_checksums { 2 } else { 1 });

        for raw in keys {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let data_key = raw.strip_suffix(CHECKSUM_SUFFIX).unwrap_or(raw);
            let Some(data_request) = self.request_for(data_key) else {
                warn!(key = raw, "skipping key outside the data directory");
                continue;
            };
            if !seen.insert(data_request.url.clone()) {
                continue;
            }

            let checksum_request = with_checksums.then(|| {
                DownloadRequest::new(
                    format!("{}{CHECKSUM_SUFFIX}", data_request.url),
                    crate::checksum::checksum_path(&data_request.destination),
                )
            });
            requests.push(data_request);
            requests.extend(checksum_request);
        }

        requests
    }

    /// Returns the local data files for `keys`, companions folded and deduplicated.
    #[must_use]
    pub fn data_files<S: AsRef<str>>(&self, keys: &[S]) -> Vec<PathBuf> {
        self.plan(keys, false)
            .into_iter()
            .map(|request| request.destination)
            .collect()
    }

    /// Returns the remote URL of a local file inside the data directory.
    #[must_use]
    pub fn url_for(&self, local: &Path) -> Option<String> {
        let relative = local.strip_prefix(&self.data_dir).ok()?;
        let key = relative
            .components()
            .map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?
            .join("/");
        (!key.is_empty()).then(|| format!("{}/{key}", self.base_url))
    }

    /// Returns the checksum companion URL of a local data file.
    #[must_use]
    pub fn checksum_url_for(&self, data_file: &Path) -> Option<String> {
        self.url_for(data_file)
            .map(|url| format!("{url}{CHECKSUM_SUFFIX}"))
    }

    /// Strips the base URL from `url`, returning the key.
    #[must_use]
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(normalize_key)
    }

    /// Converts remote URLs back into requests, skipping foreign URLs.
    #[must_use]
    pub fn requests_from_urls(&self, urls: &[String]) -> Vec<DownloadRequest> {
        urls.iter()
            .filter_map(|url| {
                let request = self
                    .key_from_url(url)
                    .and_then(|key| self.request_for(&key));
                if request.is_none() {
                    warn!(%url, base_url = %self.base_url, "skipping URL outside the base URL");
                }
                request
            })
            .collect()
    }
}

/// Trims separators and rejects keys that are absolute or climb upwards.
fn normalize_key(key: &str) -> Option<String> {
    let key = key.trim().trim_start_matches('/');
    if key.is_empty() {
        return None;
    }
    let safe = Path::new(key)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    safe.then(|| key.to_string())
}
