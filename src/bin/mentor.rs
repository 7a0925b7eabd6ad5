//! Mentor CLI Binary
//!
//! Command-line interface for adaptive tutoring sessions.

use anyhow::Context;
use clap::Parser;
use mentor::cli::{load_config, map_error, Cli, RunContext};
use mentor::config::MentorConfig;
use mentor::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.workspace, cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!(map_error(&e)))
        .context("Failed to load configuration")?;

    let logging_config = build_logging_config(&cli, &config);
    init_logging(Some(&logging_config), config.storage.log_file().ok())
        .map_err(|e| anyhow::anyhow!(e.to_string()))
        .context("Failed to initialize logging")?;

    info!("Mentor CLI starting");

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "Error initializing stores");
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli, config: &MentorConfig) -> LoggingConfig {
    let mut logging = config.logging.clone();

    if cli.verbose {
        logging.level = "debug".to_string();
        // Mirror to stderr without losing file logs; an explicit
        // --log-output still wins below.
        if logging.output == "file" {
            logging.output = "both".to_string();
        }
    }
    if let Some(ref level) = cli.log_level {
        logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        logging.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        logging.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        logging.file = Some(file.clone());
    }

    logging
}
