//! Exit code logic for the process.
//!
//! Single responsibility: map a run outcome to the process exit status.

use std::process::ExitCode;

use archive_fetch_core::{RunOutcome, RunPhase};

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Everything converged, or a partial failure that is recorded for the next run.
    Success,
    /// Fatal error (missing binary, unreadable manifest, bad config).
    Failure,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// Determines the process exit outcome from a finished run.
///
/// A partially failed run still exits 0: the failures are in the tracker
/// and operators are expected to re-invoke. Only an interrupted run exits 1.
pub(crate) fn determine_exit_outcome(outcome: &RunOutcome) -> ProcessExit {
    match outcome.phase {
        _ if outcome.interrupted => ProcessExit::Failure,
        RunPhase::Converged | RunPhase::PartiallyFailed => ProcessExit::Success,
        RunPhase::Idle | RunPhase::Downloading | RunPhase::Verifying => ProcessExit::Failure,
    }
}
