// Library interface for polybuild
// The binary and the integration tests build on these modules.

pub mod adapter;
pub mod build;
pub mod builder;
pub mod cache;
pub mod config;
pub mod config_discovery;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use adapter::{AdapterRegistry, LanguageAdapter, ProjectBuilder, ToolchainStatus};
pub use build::{BuildMode, BuildOptions, BuildResult, BuildStatus, Language, OptLevel, Report};
pub use builder::{Builder, ParallelInfo};
pub use cache::{CacheStats, CacheStore, Fingerprint};
pub use config::BuilderConfig;
pub use error::{BuildError, CacheError};
