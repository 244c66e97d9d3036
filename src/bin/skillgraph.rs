//! skillgraph CLI Binary
//!
//! Command-line interface for the tiered skill, agent and command runtime.

use anyhow::Context;
use clap::Parser;
use skillgraph::logging::init_logging;
use skillgraph::tooling::cli::{Cli, CliContext};
use std::process;

fn main() {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<String> {
    let mut config = CliContext::load_config(&cli.workspace, cli.config.as_deref())
        .with_context(|| format!("loading configuration for {}", cli.workspace.display()))?;

    // Logging comes up before descriptors load so load warnings are visible
    cli.apply_logging_overrides(&mut config.logging);
    init_logging(Some(&config.logging), config.toggles.debug).context("initializing logging")?;

    let context = CliContext::with_config(config);
    Ok(context.execute(&cli.command)?)
}
