//! CLI command handlers.

mod config;
mod download;
mod failed;
mod verify;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use archive_fetch_core::{
    ArchiveLayout, FailedFileTracker, RetryOptions, RetryOrchestrator, RunOutcome, Transfer,
    VerifySummary,
};
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::app::config::{CliOverrides, LoadedConfig, Settings, env_http_proxy, resolve_settings};
use crate::app::progress;
use crate::app::terminal::Terminal;

pub(crate) use config::run_config_show_command;
pub(crate) use download::run_download_command;
pub(crate) use failed::{run_failed_clear_command, run_failed_list_command, run_failed_retry_command};
pub(crate) use verify::run_verify_command;

/// State shared by every command.
#[derive(Debug)]
pub(crate) struct CommandContext {
    pub(crate) loaded: LoadedConfig,
    pub(crate) quiet: bool,
    pub(crate) terminal: Terminal,
}

impl CommandContext {
    pub(crate) fn settings(&self, overrides: &CliOverrides) -> Settings {
        resolve_settings(overrides, self.loaded.config.as_ref(), env_http_proxy())
    }

    fn show_progress(&self) -> bool {
        self.terminal.shows_progress(self.quiet)
    }
}

/// Sets the returned flag on Ctrl-C so the orchestrator stops between batches.
fn spawn_interrupt_handler() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });
    interrupted
}

/// Builds an orchestrator for `settings`, with a progress bar when interactive.
fn build_orchestrator(
    ctx: &CommandContext,
    settings: &Settings,
    transfer: Arc<dyn Transfer>,
) -> Result<(RetryOrchestrator, Option<ProgressBar>)> {
    let layout = ArchiveLayout::new(&settings.base_url, &settings.data_dir)
        .context("Invalid base URL")?;
    let tracker = FailedFileTracker::open_in(&settings.data_dir);
    let options = RetryOptions {
        verify: settings.verify,
        delete_on_mismatch: settings.delete_mismatch,
        max_tries: settings.max_tries,
        batch_size: settings.batch_size,
        workers: settings.workers,
        proxy: settings.transfer_proxy().map(str::to_string),
    };

    let mut orchestrator = RetryOrchestrator::new(layout, transfer, tracker, options)
        .with_interrupt_flag(spawn_interrupt_handler());

    let bar = if settings.verify && ctx.show_progress() {
        let (bar, callback) = progress::verify_progress_bar();
        orchestrator = orchestrator.with_verify_progress(callback);
        Some(bar)
    } else {
        None
    };

    Ok((orchestrator, bar))
}

fn print_verify_summary(summary: &VerifySummary) {
    println!(
        "verified = {} (already verified: {})",
        summary.verified, summary.already_verified
    );
    println!("invalid_checksums = {}", summary.invalid_checksums.len());
    println!("mismatches = {}", summary.mismatches);
    if summary.precondition_violations > 0 || summary.other_failures > 0 {
        println!(
            "other_failures = {}",
            summary.precondition_violations + summary.other_failures
        );
    }
}

fn print_outcome(outcome: &RunOutcome) {
    println!("status = {}", outcome.phase);
    println!("requested = {}", outcome.requested);
    println!("still_missing = {}", outcome.still_missing.len());
    if let Some(summary) = &outcome.verification {
        print_verify_summary(summary);
    }
    println!("pending_failures = {}", outcome.pending);

    if outcome.interrupted {
        warn!("Interrupted. Run again to resume.");
    } else if outcome.is_converged() {
        info!("All requested files are present");
    } else {
        warn!(
            pending = outcome.pending,
            "Some files still fail; run `archive-fetch failed retry` or re-run download"
        );
    }
}
