//! mocharun CLI - Main Entry Point
//!
//! Serves the harness page, runs the suite in headless Chromium, writes the
//! result artifact and exits with the suite's verdict.

use anyhow::{bail, Context};
use clap::Parser;
use mocharun_browser::{exit_code, Harness};
use mocharun_common::report::{EXIT_FAILURE, EXIT_SUCCESS};
use tracing::{debug, error, info};

mod args;
mod output;

use args::{Cli, Command};

fn main() {
    let cli = Cli::parse();

    // stdout belongs to the page's console output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = cli
        .resolve_config()
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate()?;
    debug!("Effective configuration: {:?}", config);

    if let Some(Command::Init { force }) = cli.command {
        if cli.config.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", cli.config.display());
        }
        config.save(&cli.config)?;
        info!("Configuration written to {}", cli.config.display());
        return Ok(EXIT_SUCCESS);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let harness = Harness::new(config);
    let outcome = runtime.block_on(harness.run());
    if let Ok(summary) = &outcome {
        output::print_summary(summary, cli.summary);
    }
    Ok(exit_code(&outcome))
}
