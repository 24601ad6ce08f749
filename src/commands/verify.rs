//! Verify command handler: check every unverified file already on disk.

use std::sync::Arc;

use anyhow::Result;
use archive_fetch_core::transfer::ARIA2_BINARY;
use archive_fetch_core::{Aria2Transfer, scan};
use tracing::info;

use super::{CommandContext, build_orchestrator, print_verify_summary};
use crate::app::config::CliOverrides;
use crate::app::exit::ProcessExit;
use crate::cli::VerifyArgs;

pub(crate) async fn run_verify_command(
    ctx: &CommandContext,
    args: &VerifyArgs,
) -> Result<ProcessExit> {
    let settings = ctx.settings(&CliOverrides {
        data_dir: args.data_dir.clone(),
        delete_mismatch: args.delete_mismatch,
        workers: args.workers,
        verify: true,
        ..CliOverrides::default()
    });

    let files = scan::unverified_data_files(&settings.data_dir);
    if files.is_empty() {
        println!(
            "Nothing to verify under {}.",
            settings.data_dir.display()
        );
        return Ok(ProcessExit::Success);
    }
    info!(files = files.len(), data_dir = %settings.data_dir.display(), "Verifying local files");

    // Verification never transfers, so aria2c does not need to be installed.
    let transfer = Arc::new(Aria2Transfer::with_binary(ARIA2_BINARY));
    let (mut orchestrator, bar) = build_orchestrator(ctx, &settings, transfer)?;
    let result = orchestrator.verify(&files).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let summary = result?;
    print_verify_summary(&summary);
    println!("pending_failures = {}", orchestrator.tracker().count());
    Ok(ProcessExit::Success)
}
