//! CLI entry point for mediaq.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod cli;

use cli::Args;

/// Process outcome, mapped to the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every item finished.
    Success,
    /// Some items finished, some failed.
    Partial,
    /// Nothing finished, or the run was interrupted.
    Failure,
}

impl ProcessExit {
    /// Outcome from completed and failed item counts.
    pub(crate) fn from_counts(completed: usize, failed: usize) -> Self {
        match (completed, failed) {
            (_, 0) => Self::Success,
            (0, _) => Self::Failure,
            _ => Self::Partial,
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse before tracing init so --help works without logs
    let args = Args::parse();

    match app::runtime::run_mediaq(args).await {
        Ok(exit) => ExitCode::from(exit.code()),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
