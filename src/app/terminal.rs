//! Terminal capabilities and tracing setup.

use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;

/// What stderr can render, detected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Terminal {
    interactive: bool,
    dumb: bool,
    color: bool,
}

impl Terminal {
    /// Reads `TERM`, `NO_COLOR` and whether stderr is a TTY.
    pub(crate) fn detect(no_color_flag: bool) -> Self {
        let dumb = std::env::var("TERM").is_ok_and(|term| term.eq_ignore_ascii_case("dumb"));
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
        Self::new(io::stderr().is_terminal(), dumb, no_color_flag || no_color_env)
    }

    fn new(interactive: bool, dumb: bool, no_color: bool) -> Self {
        Self {
            interactive,
            dumb,
            color: !no_color && !dumb,
        }
    }

    /// Whether log lines may carry ANSI colors.
    pub(crate) fn color(self) -> bool {
        self.color
    }

    /// The hashing bar is drawn only on an interactive, capable stderr.
    pub(crate) fn shows_progress(self, quiet: bool) -> bool {
        self.interactive && !self.dumb && !quiet
    }
}

/// Builds the log filter. A level picked on the command line is pinned;
/// otherwise `RUST_LOG` overrides `level` when set.
fn log_filter(level: &str, pinned: bool) -> EnvFilter {
    if pinned {
        return EnvFilter::new(level);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global subscriber. Logs go to stderr so stdout stays clean
/// for command output such as `failed list`.
pub(crate) fn init_tracing(level: &str, pinned: bool, terminal: Terminal) {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(terminal.color())
        .with_env_filter(log_filter(level, pinned))
        .try_init();
}
