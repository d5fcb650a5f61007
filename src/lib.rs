mod cli;
mod git;
mod io;

use std::process::ExitCode;

/// Runs the command named by the process arguments.
pub fn run() -> anyhow::Result<ExitCode> {
    let argv = std::env::args().collect::<Vec<String>>();

    cli::install_interrupt_handler();
    cli::dispatch(&argv)
}
