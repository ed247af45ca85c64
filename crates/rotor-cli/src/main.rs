//! Rotor CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rotor_core::RotorConfig;
use rotor_types::config::{LogConfig, LogFormat};
use rotor_types::LogLevel;

mod cli;
mod commands;
mod ui;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => RotorConfig::load_from(path),
        None => RotorConfig::load(),
    }
    .context("Failed to load configuration")?;

    let _guards = rotor_core::log::init_from_config(&log_outputs(&config, cli.verbose))
        .context("Failed to initialize logging")?;

    cli.execute(&config).await
}

/// Configured log outputs, or a stderr fallback so stdout stays clean for
/// secrets and JSON output.
fn log_outputs(config: &RotorConfig, verbose: bool) -> Vec<LogConfig> {
    if !config.logs.is_empty() {
        return config.logs.clone();
    }

    vec![LogConfig {
        path: "stderr".to_string(),
        level: if verbose { LogLevel::Debug } else { LogLevel::Warn },
        format: LogFormat::Compact,
    }]
}
