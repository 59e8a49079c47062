//! Error taxonomy for build groups and the cache store.
//!
//! Every `BuildError` is scoped to the group that produced it: the scheduler
//! turns it into that group's failed `BuildResult` and keeps going.
//! `CacheError` never reaches a caller as a build failure; the store logs it
//! and degrades to cache misses instead.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::build::source::{BuildMode, Language};

/// Reasons a single build group can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildError {
    #[error("unsupported language for extension '{extension}'")]
    UnsupportedLanguage { extension: String },

    #[error("no adapter registered for {language} ({mode})")]
    NoAdapter { language: Language, mode: BuildMode },

    #[error("cannot read source {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("no project build tool registered for {language}")]
    NoProjectBuilder { language: Language },

    #[error("project manifest not found: {path}")]
    ManifestMissing { path: PathBuf },

    #[error("{language} toolchain unavailable: {detail}")]
    ToolchainUnavailable { language: Language, detail: String },

    #[error("{language} compilation failed")]
    CompileFailed {
        language: Language,
        diagnostics: String,
    },

    #[error("artifact exited with code {exit_code}")]
    RunFailed { exit_code: i32, stderr: String },

    #[error("artifact storage error: {reason}")]
    ArtifactStorage { reason: String },

    #[error("build task panicked: {reason}")]
    TaskPanicked { reason: String },
}

impl BuildError {
    /// Captured tool output attached to the error, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            BuildError::CompileFailed { diagnostics, .. } => Some(diagnostics),
            BuildError::RunFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Errors raised inside the cache subsystem.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache index {path} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("cache serialization error: {reason}")]
    Serialization { reason: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::source::PackagingKind;

    #[test]
    fn test_unsupported_language_display() {
        let err = BuildError::UnsupportedLanguage {
            extension: ".xyz".to_string(),
        };
        assert!(err.to_string().contains("unsupported language"));
        assert!(err.to_string().contains(".xyz"));
    }

    #[test]
    fn test_no_adapter_display() {
        let err = BuildError::NoAdapter {
            language: Language::Java,
            mode: BuildMode::Module {
                packaging: PackagingKind::PythonExtension,
            },
        };
        assert_eq!(
            err.to_string(),
            "no adapter registered for java (module:python-extension)"
        );
    }

    #[test]
    fn test_manifest_missing_display() {
        let err = BuildError::ManifestMissing {
            path: PathBuf::from("/proj/Cargo.toml"),
        };
        assert_eq!(err.to_string(), "project manifest not found: /proj/Cargo.toml");
        assert_eq!(
            serde_json::to_value(&err).unwrap()["kind"],
            "manifest_missing"
        );
    }

    #[test]
    fn test_diagnostics_accessor() {
        let err = BuildError::CompileFailed {
            language: Language::Cpp,
            diagnostics: "main.cpp:1: error".to_string(),
        };
        assert_eq!(err.diagnostics(), Some("main.cpp:1: error"));

        let err = BuildError::ToolchainUnavailable {
            language: Language::Rust,
            detail: "rustc not found".to_string(),
        };
        assert_eq!(err.diagnostics(), None);
    }

    #[test]
    fn test_serialize_tagged() {
        let err = BuildError::RunFailed {
            exit_code: 3,
            stderr: "boom".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "run_failed");
        assert_eq!(json["exit_code"], 3);
    }

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::IndexCorrupt {
            path: PathBuf::from("/tmp/cache/index.json"),
            reason: "expected value at line 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("corrupt"));
        assert!(msg.contains("index.json"));
    }
}
