/// `polybuild cargo` command implementation
///
/// Builds a whole Cargo project; cargo keeps its own incremental state, so
/// the polybuild cache is not consulted.
use anyhow::{Context, Result};
use std::time::Instant;

use crate::cli::CargoArgs;
use polybuild::build::{aggregate, Language};
use polybuild::builder::Builder;
use polybuild::config::BuilderConfig;

/// Returns whether the project built.
pub async fn run(config: BuilderConfig, args: CargoArgs) -> Result<bool> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let dir = cwd.join(&args.dir);
    let optimization = args.opt.into();

    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        Builder::new(config).build_project(&dir, Language::Rust, optimization)
    })
    .await
    .context("Cargo build task failed")?;

    let success = result.is_success();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        if !result.diagnostics.is_empty() && success {
            println!("{}", result.diagnostics);
        }
        let report = aggregate(vec![result], started.elapsed(), false);
        print!("{}", report);
    }

    Ok(success)
}
