/// Python adapter and interpreter resolution
///
/// Sources are staged into the output directory, byte-compiled with
/// `py_compile` to surface syntax errors, and the entry file is run with the
/// resolved interpreter.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::process::{self, run_artifact, ProcessError};
use super::{CompileOutput, LanguageAdapter, RunOutput, ToolchainStatus};
use crate::build::source::{BuildGroup, Language};
use crate::error::BuildError;

/// The Python interpreter used for scripts and extension modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    path: Option<PathBuf>,
}

impl Interpreter {
    /// Prefer the configured runtime environment, then `python3`/`python` on PATH.
    pub fn resolve(environment: Option<&Path>) -> Self {
        if let Some(env) = environment {
            let candidate = environment_python(env);
            if candidate.is_file() {
                tracing::debug!(
                    "[polybuild] Using interpreter from environment: {}",
                    candidate.display()
                );
                return Self::at(candidate);
            }
            tracing::warn!(
                "[polybuild] No interpreter at {}, falling back to PATH",
                candidate.display()
            );
        }

        let path = ["python3", "python"]
            .iter()
            .find_map(|name| process::find_program(name));
        Self { path }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn missing() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn require(&self, language: Language) -> Result<&Path, BuildError> {
        self.path().ok_or_else(|| BuildError::ToolchainUnavailable {
            language,
            detail: "no python interpreter found".to_string(),
        })
    }

    pub fn probe(&self) -> ToolchainStatus {
        match self.path() {
            Some(path) => process::probe_tool(path, &["--version"]),
            None => ToolchainStatus::unavailable("python3 or python not found in PATH"),
        }
    }

    /// Run a one-line script and return its trimmed stdout.
    pub(crate) fn query(&self, script: &str, timeout: Duration) -> Result<String, String> {
        let path = self.path().ok_or("no python interpreter found")?;
        let output = process::run(Command::new(path).args(["-c", script]), timeout)
            .map_err(|e| e.to_string())?;
        if !output.success() {
            return Err(output.combined());
        }
        Ok(output.stdout.trim().to_string())
    }

    pub(crate) fn fingerprint_inputs(&self) -> BTreeMap<String, String> {
        let mut inputs = BTreeMap::new();
        let value = self
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        inputs.insert("interpreter".to_string(), value);
        inputs
    }
}

#[cfg(windows)]
fn environment_python(env: &Path) -> PathBuf {
    env.join("Scripts").join("python.exe")
}

#[cfg(not(windows))]
fn environment_python(env: &Path) -> PathBuf {
    env.join("bin").join("python")
}

pub struct PythonAdapter {
    interpreter: Interpreter,
    timeout: Duration,
}

impl PythonAdapter {
    pub fn new(interpreter: Interpreter, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
        }
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn probe(&self) -> ToolchainStatus {
        self.interpreter.probe()
    }

    fn compile(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError> {
        let python = self.interpreter.require(Language::Python)?;

        let mut staged = Vec::with_capacity(group.units().len());
        for unit in group.units() {
            let dest = out_dir.join(unit.rel_key());
            let content = unit.content().map_err(|e| BuildError::SourceUnreadable {
                path: unit.path().to_path_buf(),
                reason: e.to_string(),
            })?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| staging_error(&dest, e))?;
            }
            fs::write(&dest, content).map_err(|e| staging_error(&dest, e))?;
            staged.push(dest);
        }

        let mut cmd = Command::new(python);
        cmd.args(["-m", "py_compile"]).args(&staged);

        let output = process::run(&mut cmd, self.timeout).map_err(compile_error)?;
        if !output.success() {
            return Err(BuildError::CompileFailed {
                language: Language::Python,
                diagnostics: output.combined(),
            });
        }

        Ok(CompileOutput {
            artifact: out_dir.join(group.main_unit().rel_key()),
            diagnostics: output.combined(),
        })
    }

    fn run(&self, artifact: &Path) -> Result<RunOutput, BuildError> {
        let python = self.interpreter.require(Language::Python)?;
        let mut cmd = Command::new(python);
        cmd.arg(artifact);
        if let Some(dir) = artifact.parent() {
            cmd.current_dir(dir);
        }
        run_artifact(&mut cmd, self.timeout)
    }

    fn fingerprint_inputs(&self) -> BTreeMap<String, String> {
        self.interpreter.fingerprint_inputs()
    }
}

fn staging_error(path: &Path, e: std::io::Error) -> BuildError {
    BuildError::ArtifactStorage {
        reason: format!("failed to stage {}: {}", path.display(), e),
    }
}

fn compile_error(e: ProcessError) -> BuildError {
    match e {
        ProcessError::Spawn { .. } => BuildError::ToolchainUnavailable {
            language: Language::Python,
            detail: e.to_string(),
        },
        other => BuildError::CompileFailed {
            language: Language::Python,
            diagnostics: other.to_string(),
        },
    }
}
