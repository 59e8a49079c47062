use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::BuilderConfig;

pub const CONFIG_FILE: &str = "polybuild.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "POLYBUILD_CONFIG";

/// Discovers polybuild configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Option<PathBuf> {
    for dir in start_dir.ancestors() {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.is_file() {
            return Some(config_path);
        }
    }

    global_config().filter(|path| path.is_file())
}

/// `~/.config/polybuild/config.toml`
pub fn global_config() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("polybuild").join("config.toml"))
}

/// Loads configuration with auto-discovery support
///
/// An explicit path (from `--config` or `POLYBUILD_CONFIG`) must exist.
/// Otherwise the tree above `start_dir` is searched, then the global config.
///
/// Returns Ok(None) if no config is found, together with the path it was
/// loaded from otherwise.
pub fn load_config_with_discovery(
    explicit_path: Option<&Path>,
    start_dir: &Path,
) -> Result<Option<(BuilderConfig, PathBuf)>> {
    let env_path = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let path = match explicit_path.map(Path::to_path_buf).or(env_path) {
        Some(path) => path,
        None => match discover_config(start_dir) {
            Some(path) => path,
            None => return Ok(None),
        },
    };

    tracing::debug!("[polybuild] Loading config from {}", path.display());
    let config = BuilderConfig::from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    Ok(Some((config, path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_finds_nearest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let project = root.join("project");
        let subdir = project.join("src").join("nested");
        fs::create_dir_all(&subdir).unwrap();

        let config_path = project.join(CONFIG_FILE);
        fs::write(&config_path, "verbose = true\n").unwrap();

        assert_eq!(discover_config(&subdir), Some(config_path));
    }

    #[test]
    fn test_inner_config_shadows_outer() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("inner");
        fs::create_dir_all(&inner).unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "").unwrap();
        fs::write(inner.join(CONFIG_FILE), "").unwrap();

        assert_eq!(discover_config(&inner), Some(inner.join(CONFIG_FILE)));
    }

    #[test]
    #[serial]
    fn test_explicit_path_wins() {
        std::env::remove_var(CONFIG_ENV);
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "verbose = false\n").unwrap();
        let explicit = temp.path().join("other.toml");
        fs::write(&explicit, "[cache]\nenabled = false\n").unwrap();

        let (config, path) = load_config_with_discovery(Some(&explicit), temp.path())
            .unwrap()
            .unwrap();
        assert_eq!(path, explicit);
        assert!(!config.cache.enabled);
    }

    #[test]
    #[serial]
    fn test_env_path_used() {
        let temp = TempDir::new().unwrap();
        let from_env = temp.path().join("env.toml");
        fs::write(&from_env, "[parallel]\nmax_workers = 3\n").unwrap();

        std::env::set_var(CONFIG_ENV, &from_env);
        let loaded = load_config_with_discovery(None, temp.path());
        std::env::remove_var(CONFIG_ENV);

        let (config, _) = loaded.unwrap().unwrap();
        assert_eq!(config.max_workers(), Some(3));
    }

    #[test]
    #[serial]
    fn test_missing_explicit_path_is_error() {
        std::env::remove_var(CONFIG_ENV);
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(load_config_with_discovery(Some(&missing), temp.path()).is_err());
    }

    #[test]
    #[serial]
    fn test_malformed_config_is_error() {
        std::env::remove_var(CONFIG_ENV);
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE), "[cache\n").unwrap();
        assert!(load_config_with_discovery(None, temp.path()).is_err());
    }
}
