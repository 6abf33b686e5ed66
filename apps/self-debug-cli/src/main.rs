//! self-debug CLI binary entry point.
//!
//! Initializes the tracing subscriber, parses command-line arguments with
//! clap, and dispatches to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (project_dir, script_stem) = cli.log_context();

    // Best-effort, before tracing is initialized.
    logging::cleanup_old_logs(&project_dir);

    let _guard = logging::init_tracing(&project_dir, script_stem.as_deref())?;

    cli.run().await
}
