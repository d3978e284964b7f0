use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::args::{Cli, Command};
use crate::cli::commands::{copy, exit_for_error, pending, recover};
use crate::config::DEFAULT_CONFIG_PATH;

pub mod args;
pub mod commands;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let outcome = match cli.command {
        Command::Copy(args) => copy::run_copy(&config_path, args),
        Command::Recover(args) => recover::run_recover(&config_path, args),
        Command::Pending => pending::run_pending(&config_path),
    };
    if let Err(err) = outcome {
        exit_for_error(&err);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
