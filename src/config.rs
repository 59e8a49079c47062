use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete polybuild configuration (loaded from TOML file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BuilderConfig {
    /// Lower the default log level to debug
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub parallel: ParallelConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Incremental build cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Reuse artifacts across invocations
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache root; relative paths resolve against the working directory
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
        }
    }
}

/// Worker pool for independent build groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound on concurrent groups (default: hardware parallelism)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: None,
        }
    }
}

/// External toolchain processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Python virtual environment used by the python and extension adapters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_path: Option<String>,

    /// Run executable artifacts after building
    #[serde(default = "default_true")]
    pub execute: bool,

    /// Per-process timeout (e.g. "300s", "5m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment_path: None,
            execute: true,
            timeout: default_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> String {
    ".polybuild/cache".to_string()
}

fn default_timeout() -> String {
    "300s".to_string()
}

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Parse duration string (e.g., "30s", "5m", "1h", "1d")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty duration string"));
    }
    if !s.is_ascii() {
        return Err(anyhow!("Invalid duration: {}", s));
    }

    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid duration: {}", s))?;

    let multiplier: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(anyhow!("Invalid duration unit: {}. Use: s, m, h, d", unit)),
    };
    let seconds = num
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("Duration out of range: {}", s))?;

    Ok(Duration::from_secs(seconds))
}

impl BuilderConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: BuilderConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = BuilderConfig {
            parallel: ParallelConfig {
                enabled: true,
                max_workers: Some(4),
            },
            runtime: RuntimeConfig {
                environment_path: Some(".venv".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.dir.trim().is_empty() {
            anyhow::bail!("cache.dir must be set");
        }

        if self.parallel.max_workers == Some(0) {
            anyhow::bail!("parallel.max_workers must be at least 1");
        }

        let timeout = parse_duration(&self.runtime.timeout)
            .with_context(|| format!("runtime.timeout is invalid: {}", self.runtime.timeout))?;
        if timeout.is_zero() {
            anyhow::bail!("runtime.timeout must be greater than zero");
        }

        if let Some(env) = &self.runtime.environment_path {
            if env.trim().is_empty() {
                anyhow::bail!("runtime.environment_path must not be empty when set");
            }
        }

        Ok(())
    }

    /// Timeout applied to every external process. An unparsable value falls
    /// back to the default.
    pub fn process_timeout(&self) -> Duration {
        match parse_duration(&self.runtime.timeout) {
            Ok(timeout) if !timeout.is_zero() => timeout,
            _ => {
                tracing::warn!(
                    "[polybuild] Invalid runtime.timeout {:?}, using {}s",
                    self.runtime.timeout,
                    FALLBACK_TIMEOUT.as_secs()
                );
                FALLBACK_TIMEOUT
            }
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache.dir)
    }

    pub fn environment_path(&self) -> Option<PathBuf> {
        self.runtime.environment_path.as_ref().map(PathBuf::from)
    }

    /// Worker bound for parallel builds, or `None` for hardware parallelism.
    pub fn max_workers(&self) -> Option<usize> {
        self.parallel.max_workers.filter(|&n| n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BuilderConfig::default();
        assert!(!config.verbose);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.dir, ".polybuild/cache");
        assert!(config.parallel.enabled);
        assert_eq!(config.parallel.max_workers, None);
        assert!(config.runtime.execute);
        assert_eq!(config.process_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_validate_config() {
        assert!(BuilderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: BuilderConfig = toml::from_str(
            r#"
            [parallel]
            max_workers = 2

            [runtime]
            timeout = "2m"
            "#,
        )
        .unwrap();

        assert!(config.cache.enabled);
        assert_eq!(config.max_workers(), Some(2));
        assert_eq!(config.process_timeout(), Duration::from_secs(120));
        assert!(config.runtime.execute);
    }

    #[test]
    fn test_example_parses_and_validates() {
        let text = BuilderConfig::example().unwrap();
        let config: BuilderConfig = toml::from_str(&text).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.environment_path(), Some(PathBuf::from(".venv")));
    }

    #[test]
    fn test_invalid_timeout() {
        let mut config = BuilderConfig::default();
        config.runtime.timeout = "ten minutes".to_string();
        assert!(config.validate().is_err());
        assert_eq!(config.process_timeout(), FALLBACK_TIMEOUT);

        config.runtime.timeout = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = BuilderConfig::default();
        config.parallel.max_workers = Some(0);
        assert!(config.validate().is_err());
        assert_eq!(config.max_workers(), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        let err = parse_duration("999999999999999999d").unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)).unwrap(),
            Duration::from_secs(u64::MAX)
        );

        let mut config = BuilderConfig::default();
        config.runtime.timeout = "999999999999999999d".to_string();
        assert!(config.validate().is_err());
        assert_eq!(config.process_timeout(), FALLBACK_TIMEOUT);
    }
}
