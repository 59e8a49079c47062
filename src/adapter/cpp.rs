/// C++ adapters: native executables and pybind11 extension modules
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::process::{self, run_artifact, ProcessError};
use super::python::Interpreter;
use super::{executable_name, CompileOutput, LanguageAdapter, RunOutput, ToolchainStatus};
use crate::build::source::{BuildGroup, Language, OptLevel};
use crate::error::BuildError;

const COMPILER: &str = "g++";
const STANDARD: &str = "-std=c++14";

fn optimization_flags(level: OptLevel) -> &'static [&'static str] {
    match level {
        OptLevel::Release => &["-O3"],
        OptLevel::Debug => &["-O0", "-g"],
    }
}

fn compile_with(cmd: &mut Command, timeout: Duration) -> Result<String, BuildError> {
    let output = process::run(cmd, timeout).map_err(|e| match e {
        ProcessError::Spawn { .. } => BuildError::ToolchainUnavailable {
            language: Language::Cpp,
            detail: e.to_string(),
        },
        other => BuildError::CompileFailed {
            language: Language::Cpp,
            diagnostics: other.to_string(),
        },
    })?;

    if !output.success() {
        return Err(BuildError::CompileFailed {
            language: Language::Cpp,
            diagnostics: output.combined(),
        });
    }
    Ok(output.combined())
}

/// `g++ -O3 -Wall -std=c++14 <files> -o <out>/<name>`
pub struct CppExecutable {
    timeout: Duration,
}

impl CppExecutable {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, group: &BuildGroup, out_dir: &Path) -> (Command, PathBuf) {
        let artifact = out_dir.join(executable_name(&group.artifact_stem()));

        let mut cmd = Command::new(COMPILER);
        cmd.args(optimization_flags(group.options().optimization))
            .args(["-Wall", STANDARD])
            .args(group.paths())
            .arg("-o")
            .arg(&artifact);
        (cmd, artifact)
    }
}

impl LanguageAdapter for CppExecutable {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn probe(&self) -> ToolchainStatus {
        process::probe_on_path(COMPILER, &["--version"])
    }

    fn compile(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError> {
        let (mut cmd, artifact) = self.command(group, out_dir);
        let diagnostics = compile_with(&mut cmd, self.timeout)?;
        Ok(CompileOutput {
            artifact,
            diagnostics,
        })
    }

    fn run(&self, artifact: &Path) -> Result<RunOutput, BuildError> {
        run_artifact(&mut Command::new(artifact), self.timeout)
    }
}

/// Native Python extension module built against pybind11.
///
/// `g++ -O3 -Wall -shared -std=c++14 -fPIC <includes> <files> -o <out>/<module><EXT_SUFFIX>`
pub struct CppPythonExtension {
    interpreter: Interpreter,
    timeout: Duration,
}

const INCLUDES_QUERY: &str =
    "import sysconfig, pybind11; print(sysconfig.get_paths()['include']); print(pybind11.get_include())";
const SUFFIX_QUERY: &str = "import sysconfig; print(sysconfig.get_config_var('EXT_SUFFIX') or '')";

impl CppPythonExtension {
    pub fn new(interpreter: Interpreter, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
        }
    }

    fn include_dirs(&self) -> Result<Vec<String>, BuildError> {
        let output = self
            .interpreter
            .query(INCLUDES_QUERY, self.timeout)
            .map_err(|detail| BuildError::ToolchainUnavailable {
                language: Language::Cpp,
                detail: format!("pybind11 include lookup failed: {}", detail),
            })?;

        let mut dirs: Vec<String> = Vec::new();
        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !dirs.iter().any(|d| d == line) {
                dirs.push(line.to_string());
            }
        }
        Ok(dirs)
    }

    fn extension_suffix(&self) -> String {
        match self.interpreter.query(SUFFIX_QUERY, self.timeout) {
            Ok(suffix) if !suffix.is_empty() => suffix,
            Ok(_) | Err(_) => default_suffix().to_string(),
        }
    }
}

#[cfg(windows)]
fn default_suffix() -> &'static str {
    ".pyd"
}

#[cfg(not(windows))]
fn default_suffix() -> &'static str {
    ".so"
}

impl LanguageAdapter for CppPythonExtension {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn probe(&self) -> ToolchainStatus {
        let compiler = process::probe_on_path(COMPILER, &["--version"]);
        if !compiler.available {
            return compiler;
        }
        if self.interpreter.path().is_none() {
            return ToolchainStatus::unavailable("python3 or python not found in PATH");
        }
        match self
            .interpreter
            .query("import pybind11; print(pybind11.__version__)", self.timeout)
        {
            Ok(version) => {
                ToolchainStatus::available(format!("{}; pybind11 {}", compiler.detail, version))
            }
            Err(detail) => ToolchainStatus::unavailable(format!("pybind11 unavailable: {}", detail)),
        }
    }

    fn compile(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError> {
        self.interpreter.require(Language::Cpp)?;
        let includes = self.include_dirs()?;
        let artifact = out_dir.join(format!(
            "{}{}",
            group.module_name(),
            self.extension_suffix()
        ));

        let mut cmd = Command::new(COMPILER);
        cmd.args(optimization_flags(group.options().optimization))
            .args(["-Wall", "-shared", STANDARD, "-fPIC"]);
        for dir in &includes {
            cmd.arg(format!("-I{}", dir));
        }
        if cfg!(target_os = "macos") {
            cmd.args(["-undefined", "dynamic_lookup"]);
        }
        cmd.args(group.paths()).arg("-o").arg(&artifact);

        let diagnostics = compile_with(&mut cmd, self.timeout)?;
        Ok(CompileOutput {
            artifact,
            diagnostics,
        })
    }

    /// Smoke-test the module by importing it.
    fn run(&self, artifact: &Path) -> Result<RunOutput, BuildError> {
        let python = self.interpreter.require(Language::Cpp)?;
        let module = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .unwrap_or_default()
            .to_string();

        let mut cmd = Command::new(python);
        cmd.args(["-c", &format!("import {}", module)]);
        if let Some(dir) = artifact.parent() {
            cmd.current_dir(dir);
        }
        run_artifact(&mut cmd, self.timeout)
    }

    fn fingerprint_inputs(&self) -> BTreeMap<String, String> {
        self.interpreter.fingerprint_inputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::source::{BuildMode, BuildOptions};

    fn group(options: BuildOptions) -> BuildGroup {
        BuildGroup::new(
            Language::Cpp,
            BuildMode::Executable,
            options,
            vec![PathBuf::from("/w/main.cpp"), PathBuf::from("/w/util.cpp")],
        )
        .unwrap()
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_release_command() {
        let adapter = CppExecutable::new(Duration::from_secs(1));
        let (cmd, artifact) = adapter.command(&group(BuildOptions::default()), Path::new("/out"));

        assert_eq!(cmd.get_program(), COMPILER);
        let args = args(&cmd);
        assert_eq!(&args[..3], &["-O3", "-Wall", "-std=c++14"]);
        assert!(args.contains(&"/w/main.cpp".to_string()));
        assert!(args.contains(&"/w/util.cpp".to_string()));
        assert_eq!(artifact, Path::new("/out").join(executable_name("main")));
    }

    #[test]
    fn test_debug_command_and_target_name() {
        let adapter = CppExecutable::new(Duration::from_secs(1));
        let options = BuildOptions {
            optimization: OptLevel::Debug,
            target_name: Some("solver".to_string()),
            ..Default::default()
        };
        let (cmd, artifact) = adapter.command(&group(options), Path::new("/out"));

        let args = args(&cmd);
        assert_eq!(&args[..2], &["-O0", "-g"]);
        assert!(!args.contains(&"-O3".to_string()));
        assert_eq!(artifact, Path::new("/out").join(executable_name("solver")));
    }

    #[test]
    fn test_extension_fingerprint_inputs() {
        let adapter =
            CppPythonExtension::new(Interpreter::at("/venv/bin/python"), Duration::from_secs(1));
        assert_eq!(
            adapter.fingerprint_inputs().get("interpreter").map(String::as_str),
            Some("/venv/bin/python")
        );
    }

    #[test]
    fn test_extension_without_interpreter_is_unavailable() {
        let adapter = CppPythonExtension::new(Interpreter::missing(), Duration::from_secs(1));
        let err = adapter
            .compile(&group(BuildOptions::default()), Path::new("/out"))
            .unwrap_err();
        assert!(matches!(err, BuildError::ToolchainUnavailable { .. }));
    }
}
