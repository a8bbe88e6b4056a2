use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "centinel", version, about = "Host/service monitoring scheduler and state engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load configuration and run the event loop until interrupted.
    Run {
        /// Path to the main TOML configuration file.
        #[arg(long, default_value = "centinel.toml")]
        config: PathBuf,
    },
    /// Parse and validate configuration without starting the event loop.
    Validate {
        #[arg(long, default_value = "centinel.toml")]
        config: PathBuf,
    },
    /// Ask a running engine process to reload its configuration.
    Reload {
        /// PID of the running engine process.
        #[arg(long)]
        pid: i32,
    },
    /// Print a summary of the last-written status file.
    Stats {
        #[arg(long, default_value = "/var/lib/centinel/status.dat")]
        status_file: PathBuf,
    },
}
