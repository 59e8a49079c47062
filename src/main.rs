mod cli;
mod cli_utils;
mod commands;
mod merger;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use polybuild::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Merge config file, env and flags; `config validate|generate` work
    // even when the effective config is broken
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let loaded = merger::load(&cli.common, &cwd);

    // Initialize structured logging
    logging::init(match &loaded {
        Ok(config) => config.verbose,
        Err(_) => cli.common.verbose,
    });

    // Dispatch to appropriate command handler
    let success = match cli.command {
        Commands::Build(args) => {
            let mut config = loaded?;
            merger::apply_build_args(&mut config, &args);
            commands::build::run(config, args).await?
        }
        Commands::Group(args) => {
            let mut config = loaded?;
            merger::apply_group_args(&mut config, &args);
            commands::group::run(config, args).await?
        }
        Commands::Cargo(args) => commands::cargo::run(loaded?, args).await?,
        Commands::Doctor(args) => commands::doctor::run(loaded?, args).await?,
        Commands::Cache(args) => {
            commands::cache::run(loaded?, &args)?;
            true
        }
        Commands::Config(args) => {
            commands::config::run(args.command, loaded)?;
            true
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
