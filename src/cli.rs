use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use polybuild::build::{Language, OptLevel};

/// polybuild - Polyglot build orchestrator
///
/// Groups source files by language, compiles each group with its native
/// toolchain, runs the results and reuses unchanged builds from a local cache.
#[derive(Parser, Debug)]
#[command(name = "polybuild")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Polyglot build orchestrator with an incremental build cache", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Configuration arguments shared across commands
#[derive(Args, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Config file path
    #[arg(short = 'c', long, global = true, env = "POLYBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory
    #[arg(long, global = true, env = "POLYBUILD_CACHE_DIR")]
    pub cache_dir: Option<String>,

    /// Disable the build cache for this invocation
    #[arg(long, global = true, env = "POLYBUILD_NO_CACHE")]
    pub no_cache: bool,

    /// Python virtual environment used for python and extension builds
    #[arg(long, global = true, env = "POLYBUILD_VENV")]
    pub venv: Option<String>,

    /// Per-process timeout (e.g. "300s", "10m")
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true, env = "POLYBUILD_VERBOSE")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and run a mixed list of source files, one group per language
    Build(BuildArgs),

    /// Build a list of files as a single group
    Group(GroupArgs),

    /// Build a Cargo project with `cargo build`
    Cargo(CargoArgs),

    /// Probe every toolchain and report what is available
    Doctor(DoctorArgs),

    /// Inspect and manage the build cache
    Cache(CacheArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Source files or glob patterns
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Build groups in parallel (default from config)
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Build groups one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Maximum number of groups built at once
    #[arg(short = 'j', long, env = "POLYBUILD_JOBS")]
    pub jobs: Option<usize>,

    /// Include a per-group phase breakdown
    #[arg(long)]
    pub profile: bool,

    /// Build only; do not run the produced executables
    #[arg(long)]
    pub no_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl BuildArgs {
    /// `--parallel`/`--sequential` as an override of `parallel.enabled`.
    pub fn parallel_override(&self) -> Option<bool> {
        match (self.parallel, self.sequential) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GroupArgs {
    /// Source files or glob patterns; all built under one language
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Language of the group (default: inferred from the first file)
    #[arg(short, long, value_parser = parse_language)]
    pub language: Option<Language>,

    /// Package the group as a Python extension module instead of an executable
    #[arg(long)]
    pub module: bool,

    /// Name of the extension module (default: first file's stem)
    #[arg(long, requires = "module")]
    pub module_name: Option<String>,

    /// Optimization level
    #[arg(long, value_enum, default_value_t = OptArg::Release)]
    pub opt: OptArg,

    /// Base name of the produced artifact (default: first file's stem)
    #[arg(long)]
    pub target_name: Option<String>,

    /// Build only; do not run the produced executable
    #[arg(long)]
    pub no_run: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CargoArgs {
    /// Project directory containing Cargo.toml
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Optimization level (release adds --release)
    #[arg(long, value_enum, default_value_t = OptArg::Release)]
    pub opt: OptArg,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptArg {
    Debug,
    Release,
}

impl From<OptArg> for OptLevel {
    fn from(value: OptArg) -> Self {
        match value {
            OptArg::Debug => OptLevel::Debug,
            OptArg::Release => OptLevel::Release,
        }
    }
}

fn parse_language(value: &str) -> Result<Language, String> {
    value.parse()
}

#[derive(Args, Debug, Clone)]
pub struct DoctorArgs {
    /// Print the probe results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// List cached builds, oldest first
    List {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove one cached build, or everything with --all
    Clean {
        /// Fingerprint (full hex) of the entry to remove
        fingerprint: Option<String>,

        /// Remove every entry and artifact
        #[arg(long, conflicts_with = "fingerprint")]
        all: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: PathBuf,
    },
    /// Generate example config file
    Generate,
    /// Show effective configuration (merged from all sources)
    Show,
}
