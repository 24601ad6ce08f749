//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Fetch archive files in bulk, verify them against their checksums and
/// retry whatever failed.
///
/// Desired files are given as remote keys relative to the base URL, e.g.
/// `spot/daily/klines/BTCUSDT/1m/BTCUSDT-1m-2024-01-01.zip`.
#[derive(Parser, Debug)]
#[command(name = "archive-fetch")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download missing files, optionally verifying checksums
    Download(DownloadArgs),

    /// Verify every unverified file already in the data directory
    Verify(VerifyArgs),

    /// Inspect or act on the failed-file tracker
    Failed {
        #[command(subcommand)]
        command: FailedCommand,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Options shared by commands that fetch files.
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Local data directory
    #[arg(short = 'd', long)]
    pub data_dir: Option<PathBuf>,

    /// Remote base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// HTTP(S) proxy (defaults to HTTP_PROXY / http_proxy)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Forward the proxy to aria2c
    #[arg(long)]
    pub use_proxy_for_transfer: bool,

    /// Delete files whose checksum does not match
    #[arg(long)]
    pub delete_mismatch: bool,

    /// Parallel hashing workers (1-256)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub workers: Option<u16>,
}

/// Arguments for `download`.
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Remote keys to fetch (also read from --manifest or piped stdin)
    #[arg(value_name = "KEYS")]
    pub keys: Vec<String>,

    /// File listing one key per line (`#` starts a comment)
    #[arg(short = 'm', long)]
    pub manifest: Option<PathBuf>,

    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Fetch .CHECKSUM companions and verify downloaded files
    #[arg(long)]
    pub verify: bool,

    /// Maximum download passes (1-10)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_tries: Option<u8>,

    /// Requests handed to aria2c per batch (1-65536)
    #[arg(short = 'b', long, value_parser = clap::value_parser!(u32).range(1..=65536))]
    pub batch_size: Option<u32>,

    /// Only re-fetch and re-check files in the failed-file tracker
    #[arg(long, conflicts_with_all = ["keys", "manifest"])]
    pub retry_only: bool,
}

/// Arguments for `verify`.
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Local data directory
    #[arg(short = 'd', long)]
    pub data_dir: Option<PathBuf>,

    /// Delete files whose checksum does not match
    #[arg(long)]
    pub delete_mismatch: bool,

    /// Parallel hashing workers (1-256)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub workers: Option<u16>,
}

/// Arguments naming only a data directory.
#[derive(Args, Debug, Clone, Default)]
pub struct DataDirArgs {
    /// Local data directory
    #[arg(short = 'd', long)]
    pub data_dir: Option<PathBuf>,
}

/// `failed` subcommands.
#[derive(Subcommand, Debug)]
pub enum FailedCommand {
    /// List tracked failures
    List(DataDirArgs),
    /// Re-fetch and verify tracked failures
    Retry(FetchArgs),
    /// Forget all tracked failures
    Clear(DataDirArgs),
}

/// `config` subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn download(argv: &[&str]) -> DownloadArgs {
        let mut full = vec!["archive-fetch", "download"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Download(args) => args,
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_download_defaults() {
        let args = download(&[]);
        assert!(args.keys.is_empty());
        assert!(!args.verify);
        assert!(!args.retry_only);
        assert_eq!(args.max_tries, None);
        assert_eq!(args.batch_size, None);
        assert_eq!(args.fetch.workers, None);
        assert_eq!(args.fetch.data_dir, None);
    }

    #[test]
    fn test_cli_download_keys_and_flags() {
        let args = download(&[
            "spot/a.zip",
            "spot/b.zip",
            "--verify",
            "--delete-mismatch",
            "-t",
            "5",
            "--batch-size",
            "100",
            "-d",
            "/data",
            "--proxy",
            "http://127.0.0.1:3128",
            "--use-proxy-for-transfer",
        ]);
        assert_eq!(args.keys, vec!["spot/a.zip", "spot/b.zip"]);
        assert!(args.verify);
        assert!(args.fetch.delete_mismatch);
        assert_eq!(args.max_tries, Some(5));
        assert_eq!(args.batch_size, Some(100));
        assert_eq!(args.fetch.data_dir, Some(PathBuf::from("/data")));
        assert_eq!(args.fetch.proxy.as_deref(), Some("http://127.0.0.1:3128"));
        assert!(args.fetch.use_proxy_for_transfer);
    }

    #[test]
    fn test_cli_verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["archive-fetch", "download", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["archive-fetch", "-v", "verify"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let err = Cli::try_parse_from(["archive-fetch", "-q", "-v", "verify"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_max_tries_out_of_range_rejected() {
        let err = Cli::try_parse_from(["archive-fetch", "download", "-t", "0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        let err = Cli::try_parse_from(["archive-fetch", "download", "-t", "11"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_workers_out_of_range_rejected() {
        let err = Cli::try_parse_from(["archive-fetch", "verify", "-w", "0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_retry_only_conflicts_with_keys() {
        let err = Cli::try_parse_from(["archive-fetch", "download", "--retry-only", "spot/a.zip"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_failed_subcommands() {
        let cli = Cli::try_parse_from(["archive-fetch", "failed", "list", "-d", "/x"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Failed { command: FailedCommand::List(DataDirArgs { data_dir: Some(_) }) }
        ));

        let cli = Cli::try_parse_from(["archive-fetch", "failed", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Failed { command: FailedCommand::Clear(_) }
        ));

        let cli = Cli::try_parse_from(["archive-fetch", "failed", "retry", "--delete-mismatch"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Failed { command: FailedCommand::Retry(FetchArgs { delete_mismatch: true, .. }) }
        ));
    }

    #[test]
    fn test_cli_missing_subcommand_is_usage_error() {
        let err = Cli::try_parse_from(["archive-fetch"]).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand | ErrorKind::MissingSubcommand
        ));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["archive-fetch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Cli::try_parse_from(["archive-fetch", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }
}
