/// Rust adapter: `rustc [-C opt-level=3] <first file> -o <out>/<name>`
///
/// Only the first file is handed to rustc; the rest of the group is reached
/// through `mod` declarations and participates in the fingerprint.
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::process::{self, run_artifact, ProcessError};
use super::{executable_name, CompileOutput, LanguageAdapter, RunOutput, ToolchainStatus};
use crate::build::source::{BuildGroup, Language, OptLevel};
use crate::error::BuildError;

pub struct RustAdapter {
    timeout: Duration,
}

impl RustAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, group: &BuildGroup, out_dir: &Path) -> (Command, PathBuf) {
        let artifact = out_dir.join(executable_name(&group.artifact_stem()));

        let mut cmd = Command::new("rustc");
        match group.options().optimization {
            OptLevel::Release => {
                cmd.args(["-C", "opt-level=3"]);
            }
            OptLevel::Debug => {
                cmd.arg("-g");
            }
        }
        cmd.arg(group.main_unit().path()).arg("-o").arg(&artifact);
        (cmd, artifact)
    }
}

impl LanguageAdapter for RustAdapter {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn probe(&self) -> ToolchainStatus {
        process::probe_on_path("rustc", &["--version"])
    }

    fn compile(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError> {
        let (mut cmd, artifact) = self.command(group, out_dir);

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

    fn run(&self, artifact: &Path) -> Result<RunOutput, BuildError> {
        run_artifact(&mut Command::new(artifact), self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::source::{BuildMode, BuildOptions};

    fn group(optimization: OptLevel) -> BuildGroup {
        BuildGroup::new(
            Language::Rust,
            BuildMode::Executable,
            BuildOptions {
                optimization,
                ..Default::default()
            },
            vec![PathBuf::from("/w/main.rs"), PathBuf::from("/w/util.rs")],
        )
        .unwrap()
    }

    #[test]
    fn test_release_passes_first_file_only() {
        let adapter = RustAdapter::new(Duration::from_secs(1));
        let (cmd, artifact) = adapter.command(&group(OptLevel::Release), Path::new("/out"));

        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[..3], &["-C", "opt-level=3", "/w/main.rs"]);
        assert!(!args.iter().any(|a| a.ends_with("util.rs")));
        assert_eq!(artifact, Path::new("/out").join(executable_name("main")));
    }

    #[test]
    fn test_debug_has_no_opt_level() {
        let adapter = RustAdapter::new(Duration::from_secs(1));
        let (cmd, _) = adapter.command(&group(OptLevel::Debug), Path::new("/out"));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-g");
        assert!(!args.contains(&"opt-level=3".to_string()));
    }
}
