//! Config command handlers: show effective configuration.

use anyhow::Result;

use super::CommandContext;
use crate::app::config::{CliOverrides, VerbositySetting};
use crate::app::exit::ProcessExit;

pub(crate) fn run_config_show_command(ctx: &CommandContext) -> Result<ProcessExit> {
    let effective = ctx.settings(&CliOverrides::default());

    let resolved_path = ctx.loaded.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if ctx.loaded.loaded_from_file() {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("data_dir = {}", effective.data_dir.display());
    println!("base_url = {}", effective.base_url);
    println!(
        "http_proxy = {}",
        effective.proxy.as_deref().unwrap_or("<none>")
    );
    println!("use_proxy_for_transfer = {}", effective.use_proxy_for_transfer);
    println!("verify = {}", effective.verify);
    println!("delete_mismatch = {}", effective.delete_mismatch);
    println!("max_tries = {}", effective.max_tries);
    println!("batch_size = {}", effective.batch_size);
    println!("workers = {}", effective.workers);
    println!("transfer_quiet = {}", effective.transfer_quiet);
    println!(
        "verbosity = {}",
        ctx.loaded
            .config
            .as_ref()
            .and_then(|config| config.verbosity)
            .unwrap_or(VerbositySetting::Default)
            .as_str()
    );

    Ok(ProcessExit::Success)
}
