//! Basement - entry point

use std::process::ExitCode;

use clap::Parser;

use basement::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match basement::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "basement failed");
            eprintln!("basement: {e:#}");
            ExitCode::FAILURE
        }
    }
}
