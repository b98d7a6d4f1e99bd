mod bootstrap;
mod changes;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use bootstrap::{init_tracing, Cli};

pub(crate) fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match commands::dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(error = %message, "command_failed");
            ExitCode::FAILURE
        }
    }
}
