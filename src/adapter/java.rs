/// Java adapter: `javac -d <out> <files>`, run with `java -cp <out> <MainClass>`
///
/// The main class is the first file's stem; the artifact is its `.class`
/// file, so the class path and class name can both be recovered from it.
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use super::process::{self, run_artifact, ProcessError};
use super::{CompileOutput, LanguageAdapter, RunOutput, ToolchainStatus};
use crate::build::source::{BuildGroup, Language};
use crate::error::BuildError;

pub struct JavaAdapter {
    timeout: Duration,
}

impl JavaAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn main_class(group: &BuildGroup) -> String {
    group
        .main_unit()
        .path()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Main".to_string())
}

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn probe(&self) -> ToolchainStatus {
        let javac = process::probe_on_path("javac", &["-version"]);
        if !javac.available {
            return javac;
        }
        let java = process::probe_on_path("java", &["-version"]);
        if !java.available {
            return java;
        }
        javac
    }

    fn compile(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError> {
        let mut cmd = Command::new("javac");
        cmd.arg("-d").arg(out_dir).args(group.paths());

        let output = process::run(&mut cmd, self.timeout).map_err(|e| match e {
            ProcessError::Spawn { .. } => BuildError::ToolchainUnavailable {
                language: Language::Java,
                detail: e.to_string(),
            },
            other => BuildError::CompileFailed {
                language: Language::Java,
                diagnostics: other.to_string(),
            },
        })?;

        if !output.success() {
            return Err(BuildError::CompileFailed {
                language: Language::Java,
                diagnostics: output.combined(),
            });
        }

        Ok(CompileOutput {
            artifact: out_dir.join(format!("{}.class", main_class(group))),
            diagnostics: output.combined(),
        })
    }

    fn run(&self, artifact: &Path) -> Result<RunOutput, BuildError> {
        let class_path = artifact.parent().unwrap_or_else(|| Path::new("."));
        let class = artifact
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Main".to_string());

        let mut cmd = Command::new("java");
        cmd.arg("-cp").arg(class_path).arg(class);
        run_artifact(&mut cmd, self.timeout)
    }
}
