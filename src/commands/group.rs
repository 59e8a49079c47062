/// `polybuild group` command implementation
///
/// Builds an explicit file list as one group, optionally packaged as a
/// Python extension module.
use anyhow::{Context, Result};
use std::time::Instant;

use crate::cli::GroupArgs;
use polybuild::build::{aggregate, BuildMode, BuildOptions};
use polybuild::builder::Builder;
use polybuild::config::BuilderConfig;

use super::{build::print_run_outputs, expand_inputs};

/// Returns whether the group succeeded.
pub async fn run(config: BuilderConfig, args: GroupArgs) -> Result<bool> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let files = expand_inputs(&args.files, &cwd)?;

    let mode = if args.module {
        BuildMode::python_extension()
    } else {
        BuildMode::Executable
    };
    let options = BuildOptions {
        optimization: args.opt.into(),
        target_name: args.target_name.clone(),
        module_name: args.module_name.clone(),
    };
    let language = args.language;

    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        Builder::new(config).build_group(&files, language, mode, options)
    })
    .await
    .context("Build task failed")?;

    let success = result.is_success();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        );
    } else {
        let report = aggregate(vec![result], started.elapsed(), false);
        print_run_outputs(&report.per_group);
        print!("{}", report);
    }

    Ok(success)
}
