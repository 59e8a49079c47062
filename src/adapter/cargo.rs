/// Cargo projects: `cargo build [--release]` run inside the project directory
///
/// Cargo tracks its own incremental state, so project builds never go
/// through the fingerprint cache.
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::process::{self, ProcessError};
use super::{CompileOutput, ProjectBuilder, ToolchainStatus};
use crate::build::source::{Language, OptLevel};
use crate::error::BuildError;

pub const MANIFEST: &str = "Cargo.toml";

pub struct CargoProject {
    timeout: Duration,
}

impl CargoProject {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, dir: &Path, optimization: OptLevel) -> (Command, PathBuf) {
        let mut cmd = Command::new("cargo");
        cmd.arg("build").current_dir(dir);
        if optimization == OptLevel::Release {
            cmd.arg("--release");
        }
        (cmd, dir.join("target").join(optimization.as_str()))
    }
}

impl ProjectBuilder for CargoProject {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn tool(&self) -> &'static str {
        "cargo"
    }

    fn manifest(&self) -> &'static str {
        MANIFEST
    }

    fn probe(&self) -> ToolchainStatus {
        process::probe_on_path("cargo", &["--version"])
    }

    fn build(&self, dir: &Path, optimization: OptLevel) -> Result<CompileOutput, BuildError> {
        let (mut cmd, artifact) = self.command(dir, optimization);

        let output = process::run(&mut cmd, self.timeout).map_err(|e| match e {
            ProcessError::Spawn { .. } => BuildError::ToolchainUnavailable {
                language: Language::Rust,
                detail: e.to_string(),
            },
            other => BuildError::CompileFailed {
                language: Language::Rust,
                diagnostics: other.to_string(),
            },
        })?;

        if !output.success() {
            return Err(BuildError::CompileFailed {
                language: Language::Rust,
                diagnostics: output.combined(),
            });
        }

        Ok(CompileOutput {
            artifact,
            diagnostics: output.combined(),
        })
    }
}
