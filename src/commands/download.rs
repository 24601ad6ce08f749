//! Download command handler.

use std::sync::Arc;

use anyhow::{Context, Result};
use archive_fetch_core::Aria2Transfer;
use tracing::{debug, info};

use super::{CommandContext, build_orchestrator, print_outcome};
use crate::app::config::CliOverrides;
use crate::app::exit::{ProcessExit, determine_exit_outcome};
use crate::app::input;
use crate::cli::{DownloadArgs, FetchArgs};

pub(crate) fn overrides_from_fetch(fetch: &FetchArgs) -> CliOverrides {
    CliOverrides {
        data_dir: fetch.data_dir.clone(),
        base_url: fetch.base_url.clone(),
        proxy: fetch.proxy.clone(),
        use_proxy_for_transfer: fetch.use_proxy_for_transfer,
        delete_mismatch: fetch.delete_mismatch,
        workers: fetch.workers,
        ..CliOverrides::default()
    }
}

fn overrides_from_download(args: &DownloadArgs) -> CliOverrides {
    CliOverrides {
        verify: args.verify,
        max_tries: args.max_tries,
        batch_size: args.batch_size,
        ..overrides_from_fetch(&args.fetch)
    }
}

pub(crate) async fn run_download_command(
    ctx: &CommandContext,
    args: &DownloadArgs,
) -> Result<ProcessExit> {
    let settings = ctx.settings(&overrides_from_download(args));
    debug!(?settings, "effective settings");

    let keys = if args.retry_only {
        Vec::new()
    } else {
        input::collect_keys(&args.keys, args.manifest.as_deref())?
    };
    if !args.retry_only && keys.is_empty() {
        println!("No keys given. Pass keys as arguments, use --manifest, or pipe them via stdin.");
        println!("Example: archive-fetch download spot/daily/klines/BTCUSDT/1m/BTCUSDT-1m-2024-01-01.zip");
        return Ok(ProcessExit::Success);
    }

    let transfer = Aria2Transfer::locate()
        .context("aria2c is required for downloading")?
        .quiet(settings.transfer_quiet);
    info!(
        keys = keys.len(),
        data_dir = %settings.data_dir.display(),
        verify = settings.verify,
        retry_only = args.retry_only,
        "Starting download"
    );

    let (mut orchestrator, bar) = build_orchestrator(ctx, &settings, Arc::new(transfer))?;
    let result = if args.retry_only {
        orchestrator.run_retry_only().await
    } else {
        orchestrator.run(&keys).await
    };
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let outcome = result?;
    print_outcome(&outcome);
    Ok(determine_exit_outcome(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_overrides_from_download_carries_every_flag() {
        let args = DownloadArgs {
            verify: true,
            max_tries: Some(4),
            batch_size: Some(64),
            fetch: FetchArgs {
                data_dir: Some(PathBuf::from("/d")),
                delete_mismatch: true,
                workers: Some(3),
                ..FetchArgs::default()
            },
            ..DownloadArgs::default()
        };

        let overrides = overrides_from_download(&args);

        assert!(overrides.verify);
        assert!(overrides.delete_mismatch);
        assert_eq!(overrides.max_tries, Some(4));
        assert_eq!(overrides.batch_size, Some(64));
        assert_eq!(overrides.workers, Some(3));
        assert_eq!(overrides.data_dir, Some(PathBuf::from("/d")));
    }
}
