pub mod build;
pub mod cache;
pub mod cargo;
pub mod config;
pub mod doctor;
pub mod group;

use anyhow::{Context, Result};
use glob::glob;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Expand command-line file arguments.
///
/// Arguments containing glob metacharacters are expanded relative to
/// `base_dir` (matches sorted, files only) and must match something. Plain
/// paths pass through untouched so a missing file is reported by the build
/// of its group. Duplicates keep their first position.
pub fn expand_inputs(patterns: &[String], base_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut paths = Vec::new();

    for pattern in patterns {
        let expanded = if is_glob(pattern) {
            let matches = expand_glob(pattern, base_dir)?;
            if matches.is_empty() {
                anyhow::bail!("Pattern matched no files: {}", pattern);
            }
            matches
        } else {
            vec![base_dir.join(pattern)]
        };

        for path in expanded {
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }
    }

    Ok(paths)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn expand_glob(pattern: &str, base_dir: &Path) -> Result<Vec<PathBuf>> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base_dir.join(pattern).to_string_lossy().to_string()
    };

    let mut paths = Vec::new();

    for entry in
        glob(&full_pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?
    {
        let path = entry.with_context(|| format!("Failed to read glob entry for: {}", pattern))?;

        if path.is_file() {
            paths.push(path);
        }
    }

    paths.sort();

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_expand_mixes_globs_and_plain_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/b.cpp"), "").unwrap();
        fs::write(temp.path().join("src/a.cpp"), "").unwrap();
        fs::write(temp.path().join("Main.java"), "").unwrap();

        let paths = expand_inputs(
            &["Main.java".to_string(), "src/*.cpp".to_string()],
            temp.path(),
        )
        .unwrap();

        assert_eq!(
            paths,
            vec![
                temp.path().join("Main.java"),
                temp.path().join("src/a.cpp"),
                temp.path().join("src/b.cpp"),
            ]
        );
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.py"), "").unwrap();
        fs::write(temp.path().join("b.py"), "").unwrap();

        let paths = expand_inputs(
            &["b.py".to_string(), "*.py".to_string()],
            temp.path(),
        )
        .unwrap();
        assert_eq!(paths, vec![temp.path().join("b.py"), temp.path().join("a.py")]);
    }

    #[test]
    fn test_empty_glob_is_error_missing_plain_path_is_not() {
        let temp = TempDir::new().unwrap();
        assert!(expand_inputs(&["*.rs".to_string()], temp.path()).is_err());
        assert_eq!(
            expand_inputs(&["missing.rs".to_string()], temp.path()).unwrap(),
            vec![temp.path().join("missing.rs")]
        );
    }
}
