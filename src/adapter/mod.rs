//! Language build adapters.
//!
//! An adapter knows how to probe, compile and run one language in one build
//! mode. The scheduler only ever talks to the [`LanguageAdapter`] trait; the
//! built-in command templates live in the per-language modules.
//!
//! Whole projects driven by their own build tool (cargo) go through
//! [`ProjectBuilder`] instead and bypass the fingerprint cache.

pub mod cargo;
pub mod cpp;
pub mod java;
pub mod process;
pub mod python;
pub mod rust;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::build::source::{BuildGroup, BuildMode, Language, OptLevel};
use crate::config::BuilderConfig;
use crate::error::BuildError;

/// Result of probing for a toolchain. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainStatus {
    pub available: bool,
    /// Version line, or the reason the toolchain is unavailable.
    pub detail: String,
}

impl ToolchainStatus {
    pub fn available(detail: impl Into<String>) -> Self {
        Self {
            available: true,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            available: false,
            detail: detail.into(),
        }
    }
}

/// A successfully compiled artifact plus whatever the compiler printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub artifact: PathBuf,
    pub diagnostics: String,
}

/// Captured output of executing an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Compile/run/probe unit for one language and build mode.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Check whether the external toolchain can be used.
    fn probe(&self) -> ToolchainStatus;

    /// Compile `group` into `out_dir`, which exists and is empty.
    fn compile(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError>;

    /// Execute a previously compiled artifact.
    fn run(&self, artifact: &Path) -> Result<RunOutput, BuildError>;

    /// Extra values that shape the compiler invocation and therefore belong
    /// in the fingerprint.
    fn fingerprint_inputs(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Builds a project directory with the language's own build tool.
pub trait ProjectBuilder: Send + Sync {
    fn language(&self) -> Language;

    /// Build tool name, e.g. `cargo`.
    fn tool(&self) -> &'static str;

    /// File that marks a directory as a project of this tool.
    fn manifest(&self) -> &'static str;

    fn probe(&self) -> ToolchainStatus;

    /// Build the project rooted at `dir`; the artifact is the output directory.
    fn build(&self, dir: &Path, optimization: OptLevel) -> Result<CompileOutput, BuildError>;
}

/// Maps `(Language, BuildMode)` to the adapter that handles it, plus one
/// optional project builder per language.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<(Language, BuildMode), Arc<dyn LanguageAdapter>>,
    projects: HashMap<Language, Arc<dyn ProjectBuilder>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in command templates.
    pub fn builtin(config: &BuilderConfig) -> Self {
        let timeout = config.process_timeout();
        let interpreter = python::Interpreter::resolve(config.environment_path().as_deref());

        let mut registry = Self::new();
        registry.register(BuildMode::Executable, cpp::CppExecutable::new(timeout));
        registry.register(
            BuildMode::python_extension(),
            cpp::CppPythonExtension::new(interpreter.clone(), timeout),
        );
        registry.register(BuildMode::Executable, java::JavaAdapter::new(timeout));
        registry.register(BuildMode::Executable, rust::RustAdapter::new(timeout));
        registry.register(
            BuildMode::Executable,
            python::PythonAdapter::new(interpreter, timeout),
        );
        registry.register_project(cargo::CargoProject::new(timeout));
        registry
    }

    /// Install `adapter` for its language in `mode`, replacing any previous one.
    pub fn register<A>(&mut self, mode: BuildMode, adapter: A)
    where
        A: LanguageAdapter + 'static,
    {
        self.register_shared(mode, Arc::new(adapter));
    }

    pub fn register_shared(&mut self, mode: BuildMode, adapter: Arc<dyn LanguageAdapter>) {
        self.adapters.insert((adapter.language(), mode), adapter);
    }

    pub fn get(&self, language: Language, mode: BuildMode) -> Option<Arc<dyn LanguageAdapter>> {
        self.adapters.get(&(language, mode)).cloned()
    }

    pub fn register_project<P>(&mut self, builder: P)
    where
        P: ProjectBuilder + 'static,
    {
        self.register_project_shared(Arc::new(builder));
    }

    pub fn register_project_shared(&mut self, builder: Arc<dyn ProjectBuilder>) {
        self.projects.insert(builder.language(), builder);
    }

    pub fn project(&self, language: Language) -> Option<Arc<dyn ProjectBuilder>> {
        self.projects.get(&language).cloned()
    }

    /// Languages with a project builder, in a stable order.
    pub fn project_languages(&self) -> Vec<Language> {
        let mut languages: Vec<_> = self.projects.keys().copied().collect();
        languages.sort();
        languages
    }

    /// Registered keys in a stable order.
    pub fn keys(&self) -> Vec<(Language, BuildMode)> {
        let mut keys: Vec<_> = self.adapters.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("keys", &self.keys())
            .field("projects", &self.project_languages())
            .finish()
    }
}

/// Base file name for an executable artifact on this platform.
pub(crate) fn executable_name(stem: &str) -> String {
    format!("{}{}", stem, std::env::consts::EXE_SUFFIX)
}
