//! Application configuration: TOML file defaults merged with CLI flags.
//!
//! Precedence for every setting is CLI flag > config file > environment
//! (proxy only) > built-in default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use archive_fetch_core::checksum::default_worker_count;
use archive_fetch_core::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_TRIES};
use serde::Deserialize;
use url::Url;

/// Application directory name under the XDG config root.
const APP_DIR: &str = "archive-fetch";

/// Default local data directory.
pub(crate) const DEFAULT_DATA_DIR: &str = "./archive_data";

/// Default remote base URL.
pub(crate) const DEFAULT_BASE_URL: &str = "https://data.binance.vision/data";

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    /// Local data directory.
    pub(crate) data_dir: Option<PathBuf>,
    /// Remote base URL.
    pub(crate) base_url: Option<String>,
    /// HTTP(S) proxy.
    pub(crate) http_proxy: Option<String>,
    /// Forward the proxy to the transfer mechanism.
    pub(crate) use_proxy_for_transfer: Option<bool>,
    /// Verify checksums after downloading.
    pub(crate) verify: Option<bool>,
    /// Delete files whose checksum does not match.
    pub(crate) delete_mismatch: Option<bool>,
    /// Download passes (1..=10).
    pub(crate) max_tries: Option<u32>,
    /// Requests per transfer batch (1..=65536).
    pub(crate) batch_size: Option<u32>,
    /// Hashing workers (1..=256).
    pub(crate) workers: Option<u32>,
    /// Pass `-q` to aria2c.
    pub(crate) transfer_quiet: Option<bool>,
    /// Default verbosity mode.
    pub(crate) verbosity: Option<VerbositySetting>,
}

fn validate_range(field: &str, value: Option<u32>, min: u32, max: u32) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

fn validate_url(field: &str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let parsed = Url::parse(value)
        .with_context(|| format!("Invalid config value for `{field}`: '{value}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!(
            "Invalid config value for `{field}`: '{value}'. Expected an http or https URL"
        );
    }
    Ok(())
}

impl FileConfig {
    /// Validates config values against CLI constraints.
    pub(crate) fn validate(&self) -> Result<()> {
        validate_range("max_tries", self.max_tries, 1, 10)?;
        validate_range("batch_size", self.batch_size, 1, 65_536)?;
        validate_range("workers", self.workers, 1, 256)?;
        validate_url("base_url", self.base_url.as_deref())?;
        validate_url("http_proxy", self.http_proxy.as_deref())?;
        Ok(())
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }

    fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub(crate) path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub(crate) config: Option<FileConfig>,
}

impl LoadedConfig {
    /// Indicates whether configuration was loaded from disk.
    pub(crate) fn loaded_from_file(&self) -> bool {
        self.config.is_some()
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/archive-fetch/config.toml`
/// 2. `$HOME/.config/archive-fetch/config.toml`
#[must_use]
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Returns the proxy from `HTTP_PROXY`, then `http_proxy`.
pub(crate) fn env_http_proxy() -> Option<String> {
    ["HTTP_PROXY", "http_proxy"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// Loads config from default path if present.
pub(crate) fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Values given on the command line; `None`/`false` means "not given".
#[derive(Debug, Clone, Default)]
pub(crate) struct CliOverrides {
    pub(crate) data_dir: Option<PathBuf>,
    pub(crate) base_url: Option<String>,
    pub(crate) proxy: Option<String>,
    pub(crate) use_proxy_for_transfer: bool,
    pub(crate) verify: bool,
    pub(crate) delete_mismatch: bool,
    pub(crate) max_tries: Option<u8>,
    pub(crate) batch_size: Option<u32>,
    pub(crate) workers: Option<u16>,
}

/// Effective settings after merging every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub(crate) data_dir: PathBuf,
    pub(crate) base_url: String,
    pub(crate) proxy: Option<String>,
    pub(crate) use_proxy_for_transfer: bool,
    pub(crate) verify: bool,
    pub(crate) delete_mismatch: bool,
    pub(crate) max_tries: usize,
    pub(crate) batch_size: usize,
    pub(crate) workers: usize,
    pub(crate) transfer_quiet: bool,
}

impl Settings {
    /// Proxy handed to the transfer mechanism, if forwarding is enabled.
    pub(crate) fn transfer_proxy(&self) -> Option<&str> {
        if self.use_proxy_for_transfer {
            self.proxy.as_deref()
        } else {
            None
        }
    }
}

fn to_usize(value: u32) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Merges CLI overrides, file config and environment into [`Settings`].
pub(crate) fn resolve_settings(
    cli: &CliOverrides,
    file: Option<&FileConfig>,
    env_proxy: Option<String>,
) -> Settings {
    let file = file.cloned().unwrap_or_default();

    Settings {
        data_dir: cli
            .data_dir
            .clone()
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        base_url: cli
            .base_url
            .clone()
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        proxy: cli.proxy.clone().or(file.http_proxy).or(env_proxy),
        use_proxy_for_transfer: cli.use_proxy_for_transfer
            || file.use_proxy_for_transfer.unwrap_or(false),
        verify: cli.verify || file.verify.unwrap_or(false),
        delete_mismatch: cli.delete_mismatch || file.delete_mismatch.unwrap_or(false),
        max_tries: cli
            .max_tries
            .map(usize::from)
            .or(file.max_tries.map(to_usize))
            .unwrap_or(DEFAULT_MAX_TRIES),
        batch_size: cli
            .batch_size
            .or(file.batch_size)
            .map_or(DEFAULT_BATCH_SIZE, to_usize),
        workers: cli
            .workers
            .map(usize::from)
            .or(file.workers.map(to_usize))
            .unwrap_or_else(default_worker_count),
        transfer_quiet: file.transfer_quiet.unwrap_or(false),
    }
}

/// Resolves the default log level.
///
/// Explicit `-q`/`-v` win; otherwise the config file's verbosity applies.
pub(crate) fn resolve_default_log_level(
    verbose: u8,
    quiet: bool,
    file_verbosity: Option<VerbositySetting>,
) -> &'static str {
    if quiet {
        "error"
    } else if verbose > 0 {
        match verbose {
            1 => "debug",
            _ => "trace",
        }
    } else {
        file_verbosity.map_or("info", VerbositySetting::log_level)
    }
}

/// Returns true when the user picked a level on the command line, so
/// `RUST_LOG` must not override it.
pub(crate) fn should_force_cli_log_level(verbose: u8, quiet: bool) -> bool {
    verbose > 0 || quiet
}
