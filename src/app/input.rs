//! Assembly of desired keys from positional args, a manifest file and/or stdin.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Parses manifest text: one key per line, blank lines and `#` comments ignored.
pub(crate) fn parse_keys(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_once('#').map_or(line, |(before, _)| before).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collects keys from positional args, then the manifest, then piped stdin.
///
/// Stdin is only read when no args and no manifest were given and it is
/// not a terminal.
pub(crate) fn collect_keys(args: &[String], manifest: Option<&Path>) -> Result<Vec<String>> {
    let mut keys: Vec<String> = args.iter().flat_map(|arg| parse_keys(arg)).collect();

    if let Some(manifest) = manifest {
        let text = fs::read_to_string(manifest)
            .with_context(|| format!("Failed to read manifest '{}'", manifest.display()))?;
        keys.extend(parse_keys(&text));
    }

    if args.is_empty() && manifest.is_none() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read keys from stdin")?;
        keys.extend(parse_keys(&buffer));
    }

    Ok(keys)
}
