use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::cli::ConfigCommands;
use polybuild::config::BuilderConfig;

/// `effective` is the configuration merged from every source.
pub fn run(command: ConfigCommands, effective: Result<BuilderConfig>) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show => show(effective?),
    }
}

fn validate(path: &Path) -> Result<()> {
    info!("Validating config file: {}", path.display());

    let config = BuilderConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path.display());
    println!("\nSummary:");
    println!(
        "  - Cache: {} ({})",
        config.cache.dir,
        if config.cache.enabled { "enabled" } else { "disabled" }
    );
    match (config.parallel.enabled, config.max_workers()) {
        (false, _) => println!("  - Parallel builds: disabled"),
        (true, Some(n)) => println!("  - Parallel builds: up to {} workers", n),
        (true, None) => println!("  - Parallel builds: one worker per CPU"),
    }
    println!("  - Run executables: {}", config.runtime.execute);
    println!("  - Process timeout: {}", config.runtime.timeout);
    if let Some(env) = &config.runtime.environment_path {
        println!("  - Python environment: {}", env);
    }

    Ok(())
}

fn generate() -> Result<()> {
    info!("Generating example config");
    println!("{}", BuilderConfig::example()?);
    Ok(())
}

fn show(config: BuilderConfig) -> Result<()> {
    info!("Showing effective configuration");

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
