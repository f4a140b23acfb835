//! OrderLoader CLI
//!
//! Usage from workspace root:
//!   cargo run --bin orderloader -- run                # Process the pending queue
//!   cargo run --bin orderloader -- run --dry-run      # Validate documents only
//!   cargo run --bin orderloader -- status             # Pending/completed counts
//!   cargo run --bin orderloader -- check-templates    # List missing template images
//!   cargo run --bin orderloader -- validate order.json

use crate::cli::{Cli, Commands};
use crate::command::{handle_check_templates, handle_run, handle_status, handle_validate};
use anyhow::{Context, Result};
use colored::Colorize;
use orderloader::logging::init_logging;
use orderloader::Config;
use std::process::ExitCode;

mod cli;
mod command;

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.queue_dir {
        config.queue.root = dir.clone();
    }
    Ok(config)
}

fn main() -> ExitCode {
    use clap::Parser;
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let logging = match init_logging(&config.logging, cli.log_level.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Commands::Run(args) => handle_run(&config, args, logging.directory()),
        Commands::Status => handle_status(&config).map(|_| true),
        Commands::CheckTemplates => handle_check_templates(&config),
        Commands::Validate(args) => handle_validate(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            eprintln!("Check the log files in {}", logging.directory().display());
            ExitCode::FAILURE
        }
    }
}
