//! CLI entry point for archive-fetch.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod cli;
mod commands;

use app::config::{
    VerbositySetting, load_default_file_config, resolve_default_log_level,
    should_force_cli_log_level,
};
use app::exit::ProcessExit;
use app::terminal::{Terminal, init_tracing};
use cli::{Cli, Command, ConfigCommand, FailedCommand};
use commands::CommandContext;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs).
    // Usage errors exit with status 2 from clap.
    let cli = Cli::parse();

    match run(cli).await {
        Ok(exit) => exit.into(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ProcessExit::Failure.into()
        }
    }
}

async fn run(cli: Cli) -> Result<ProcessExit> {
    let loaded = load_default_file_config()?;
    let file_verbosity = loaded.config.as_ref().and_then(|config| config.verbosity);

    let default_level = resolve_default_log_level(cli.verbose, cli.quiet, file_verbosity);
    let terminal = Terminal::detect(cli.no_color);
    init_tracing(
        default_level,
        should_force_cli_log_level(cli.verbose, cli.quiet),
        terminal,
    );
    debug!(?cli, config = ?loaded.path, "CLI arguments parsed");

    let ctx = CommandContext {
        quiet: cli.quiet || (cli.verbose == 0 && file_verbosity == Some(VerbositySetting::Quiet)),
        loaded,
        terminal,
    };

    match &cli.command {
        Command::Download(args) => commands::run_download_command(&ctx, args).await,
        Command::Verify(args) => commands::run_verify_command(&ctx, args).await,
        Command::Failed { command } => match command {
            FailedCommand::List(args) => commands::run_failed_list_command(&ctx, args),
            FailedCommand::Retry(args) => commands::run_failed_retry_command(&ctx, args).await,
            FailedCommand::Clear(args) => commands::run_failed_clear_command(&ctx, args),
        },
        Command::Config {
            command: ConfigCommand::Show,
        } => commands::run_config_show_command(&ctx),
    }
}
