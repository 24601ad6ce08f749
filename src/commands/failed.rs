//! Failed-file tracker commands: list, retry, clear.

use std::sync::Arc;

use anyhow::{Context, Result};
use archive_fetch_core::{Aria2Transfer, FailedFileTracker};

use super::download::overrides_from_fetch;
use super::{CommandContext, build_orchestrator, print_outcome};
use crate::app::config::CliOverrides;
use crate::app::exit::{ProcessExit, determine_exit_outcome};
use crate::cli::{DataDirArgs, FetchArgs};

fn open_tracker(ctx: &CommandContext, args: &DataDirArgs) -> FailedFileTracker {
    let settings = ctx.settings(&CliOverrides {
        data_dir: args.data_dir.clone(),
        ..CliOverrides::default()
    });
    FailedFileTracker::open_in(&settings.data_dir)
}

pub(crate) fn run_failed_list_command(
    ctx: &CommandContext,
    args: &DataDirArgs,
) -> Result<ProcessExit> {
    let tracker = open_tracker(ctx, args);
    if !tracker.has_pending() {
        println!("No failed files tracked in {}.", tracker.path().display());
        return Ok(ProcessExit::Success);
    }

    println!("{} failed file(s):", tracker.count());
    for (path, record) in tracker.records() {
        println!("{path}");
        println!("  error: {}", record.error);
        println!("  attempts: {}", record.attempts);
        println!("  url: {}", record.url);
        if let Some(checksum_url) = &record.checksum_url {
            println!("  checksum_url: {checksum_url}");
        }
    }
    Ok(ProcessExit::Success)
}

pub(crate) async fn run_failed_retry_command(
    ctx: &CommandContext,
    args: &FetchArgs,
) -> Result<ProcessExit> {
    let settings = ctx.settings(&CliOverrides {
        verify: true,
        ..overrides_from_fetch(args)
    });
    if !FailedFileTracker::open_in(&settings.data_dir).has_pending() {
        println!("No failed files to retry.");
        return Ok(ProcessExit::Success);
    }

    let transfer = Aria2Transfer::locate()
        .context("aria2c is required for retrying")?
        .quiet(settings.transfer_quiet);
    let (mut orchestrator, bar) = build_orchestrator(ctx, &settings, Arc::new(transfer))?;
    let result = orchestrator.run_retry_only().await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let outcome = result?;
    print_outcome(&outcome);
    Ok(determine_exit_outcome(&outcome))
}

pub(crate) fn run_failed_clear_command(
    ctx: &CommandContext,
    args: &DataDirArgs,
) -> Result<ProcessExit> {
    let mut tracker = open_tracker(ctx, args);
    let count = tracker.count();
    tracker
        .clear_all()
        .with_context(|| format!("Failed to clear tracker '{}'", tracker.path().display()))?;
    println!("Cleared {count} tracked failure(s).");
    Ok(ProcessExit::Success)
}
