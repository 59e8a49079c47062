/// Configuration merger: CLI args > Env vars > Config file > Defaults
///
/// Environment variables are read by clap through the `env` attributes on
/// the argument structs, so by the time a value reaches this module CLI and
/// env are already folded into one `Option`.
use anyhow::Result;
use std::path::Path;

use crate::cli::{BuildArgs, CommonConfigArgs, GroupArgs};
use polybuild::config::BuilderConfig;
use polybuild::config_discovery::load_config_with_discovery;

/// Merge the shared arguments over `file_config` (or defaults).
pub fn merge(args: &CommonConfigArgs, file_config: Option<BuilderConfig>) -> BuilderConfig {
    let mut config = file_config.unwrap_or_default();

    if let Some(dir) = &args.cache_dir {
        config.cache.dir = dir.clone();
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    if let Some(venv) = &args.venv {
        config.runtime.environment_path = Some(venv.clone());
    }
    if let Some(timeout) = &args.timeout {
        config.runtime.timeout = timeout.clone();
    }
    config.verbose |= args.verbose;

    config
}

/// Apply `build` subcommand overrides.
pub fn apply_build_args(config: &mut BuilderConfig, args: &BuildArgs) {
    if let Some(jobs) = args.jobs {
        config.parallel.max_workers = Some(jobs);
    }
    if args.no_run {
        config.runtime.execute = false;
    }
}

/// Apply `group` subcommand overrides.
pub fn apply_group_args(config: &mut BuilderConfig, args: &GroupArgs) {
    if args.no_run {
        config.runtime.execute = false;
    }
}

/// Discover the config file, merge the shared arguments over it and
/// validate the result.
pub fn load(args: &CommonConfigArgs, start_dir: &Path) -> Result<BuilderConfig> {
    let file_config = match load_config_with_discovery(args.config.as_deref(), start_dir)? {
        Some((config, path)) => {
            tracing::debug!("[polybuild] Using config: {}", path.display());
            Some(config)
        }
        None => {
            tracing::debug!("[polybuild] No configuration file found, using defaults");
            None
        }
    };

    let config = merge(args, file_config);
    config.validate()?;
    Ok(config)
}
