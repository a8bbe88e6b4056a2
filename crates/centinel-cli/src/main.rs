mod cli;
mod commands;
mod engine;
mod error;

use clap::Parser;
use cli::{Cli, Command};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    centinel_otel::init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run { config } => commands::run::execute(&config).await,
        Command::Validate { config } => commands::validate::execute(&config),
        Command::Reload { pid } => commands::reload::execute(pid),
        Command::Stats { status_file } => commands::stats::execute(&status_file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
