//! calib - Command Line 3D-VAR Calibration
//!
//! This is the operational entry point for the calibration workspace.
//!
//! # Commands
//!
//! - `calib calibrate --problem <file.toml>` - Calibrate a model and write the result
//! - `calib validate --problem <file.toml>` - Check a problem file without calibrating
//!
//! # Architecture
//!
//! As part of the **S**ervice layer, this crate turns TOML problem files
//! into `calib_optimiser` calibrations. Set `RUST_LOG=info` (or `debug` for
//! per-iteration solver output) to see progress.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod error;
mod models;

pub use error::{CliError, Result};

/// 3D-VAR calibration CLI
#[derive(Parser)]
#[command(name = "calib")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate model parameters from a problem file
    Calibrate {
        /// Path to the problem file (TOML)
        #[arg(short, long)]
        problem: PathBuf,

        /// Output file for the calibration result (JSON, stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output file for the reloadable calibration state (JSON)
        #[arg(short, long)]
        state: Option<PathBuf>,
    },

    /// Validate a problem file without calibrating
    Validate {
        /// Path to the problem file (TOML)
        #[arg(short, long)]
        problem: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialise tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Calibrate {
            problem,
            output,
            state,
        } => commands::calibrate::run(&problem, output.as_deref(), state.as_deref()),
        Commands::Validate { problem } => commands::validate::run(&problem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_calibrate() {
        let cli = Cli::parse_from(["calib", "calibrate", "-p", "problem.toml", "-o", "out.json"]);
        match cli.command {
            Commands::Calibrate { problem, output, state } => {
                assert_eq!(problem, PathBuf::from("problem.toml"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert!(state.is_none());
            }
            Commands::Validate { .. } => panic!("expected calibrate"),
        }
    }
}
