//! # logpilot CLI
//!
//! Command-line host for the LogPilot query orchestrator.
//! Run `logpilot --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
