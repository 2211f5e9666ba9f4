//! Binary entry point for dircull.
//!
//! This binary provides the CLI interface for the dircull retention cleaner.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use dircull::config::DircullConfig;
use dircull::observability::{self, InitOptions, RunContext, enter_run_context};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Dircull - retires stale directory trees under configured search roots.
#[derive(Parser)]
#[command(name = "dircull")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "DIRCULL_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Path to configuration file (positional form).
    #[arg(value_name = "CONFIG")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Join the configuration and run every retention unit (default).
    Run,

    /// Validate the configuration and resolve every search root without
    /// touching the filesystem.
    Check {
        /// Print the joined units as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config_path.as_deref().or(cli.config.as_deref());
    let config = match DircullConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let context = RunContext::new();
    info!(
        run_id = context.run_id(),
        config = ?config.source,
        "Starting dircull"
    );
    let _run = enter_run_context(context);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::cmd_run(&config),
        Commands::Check { json } => commands::cmd_check(&config, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}
