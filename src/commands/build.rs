/// `polybuild build` command implementation
///
/// Builds a mixed list of files, one group per language, and prints the
/// aggregated report.
use anyhow::{Context, Result};

use crate::cli::BuildArgs;
use crate::cli_utils::polybuild_prefix;
use polybuild::build::BuildResult;
use polybuild::builder::Builder;
use polybuild::config::BuilderConfig;

use super::expand_inputs;

/// Returns whether every group succeeded.
pub async fn run(config: BuilderConfig, args: BuildArgs) -> Result<bool> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let paths = expand_inputs(&args.files, &cwd)?;

    eprintln!(
        "{} Building {} file(s) ({})",
        polybuild_prefix(),
        paths.len(),
        match args.parallel_override() {
            Some(true) => "parallel",
            Some(false) => "sequential",
            None if config.parallel.enabled => "parallel",
            None => "sequential",
        }
    );

    let profile = args.profile;
    let parallel = args.parallel_override();
    let report = tokio::task::spawn_blocking(move || {
        Builder::new(config).build_mixed(&paths, profile, parallel)
    })
    .await
    .context("Build task failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_run_outputs(&report.per_group);
        print!("{}", report);
    }

    Ok(report.overall_success)
}

/// Echo the captured output of executed artifacts, group by group.
pub fn print_run_outputs(results: &[BuildResult]) {
    for result in results {
        let Some(run) = &result.run else {
            continue;
        };

        println!("--- {} (exit {}) ---", result.label, run.exit_code);
        if !run.stdout.is_empty() {
            print!("{}", run.stdout);
            if !run.stdout.ends_with('\n') {
                println!();
            }
        }
        if !run.stderr.is_empty() {
            eprint!("{}", run.stderr);
        }
    }
}
