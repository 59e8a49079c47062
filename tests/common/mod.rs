// Common test utilities shared across acceptance tests
//
// Library-level tests never touch a real toolchain: `FakeAdapter` stands in
// for g++/javac/rustc/python and records how often it was asked to compile,
// how many compiles overlapped and what it ran.
//
// Behaviour is driven by the source text:
// - a source containing `FAIL` fails to compile with diagnostics
// - a source containing `EXIT1` compiles, but its artifact exits with code 1
//
// `FakeProject` stands in for cargo: a manifest containing `FAIL` fails the
// project build.
//
// Every test gets its own TempDir for sources and cache.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use polybuild::adapter::{
    AdapterRegistry, CompileOutput, LanguageAdapter, ProjectBuilder, RunOutput,
};
use polybuild::build::BuildGroup;
use polybuild::{BuildError, BuildMode, Builder, BuilderConfig, Language, OptLevel, ToolchainStatus};

pub struct FakeAdapter {
    language: Language,
    delay: Duration,
    available: bool,
    compiles: AtomicUsize,
    probes: AtomicUsize,
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            delay: Duration::ZERO,
            available: true,
            compiles: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn compile_sources(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError> {
        let mut combined = String::new();
        for unit in group.units() {
            let content = unit.content().map_err(|e| BuildError::SourceUnreadable {
                path: unit.path().to_path_buf(),
                reason: e.to_string(),
            })?;
            combined.push_str(&String::from_utf8_lossy(content));
        }

        if combined.contains("FAIL") {
            Err(BuildError::CompileFailed {
                language: self.language,
                diagnostics: format!("{}: error: FAIL marker", group.main_unit().rel_key()),
            })
        } else {
            let artifact = out_dir.join(group.artifact_stem());
            fs::write(&artifact, &combined).map_err(|e| BuildError::ArtifactStorage {
                reason: e.to_string(),
            })?;
            Ok(CompileOutput {
                artifact,
                diagnostics: String::new(),
            })
        }
    }
}

impl LanguageAdapter for FakeAdapter {
    fn language(&self) -> Language {
        self.language
    }

    fn probe(&self) -> ToolchainStatus {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.available {
            ToolchainStatus::available(format!("fake-{} 1.0", self.language))
        } else {
            ToolchainStatus::unavailable(format!("{} compiler not found in PATH", self.language))
        }
    }

    fn compile(&self, group: &BuildGroup, out_dir: &Path) -> Result<CompileOutput, BuildError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        thread::sleep(self.delay);
        let outcome = self.compile_sources(group, out_dir);
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn run(&self, artifact: &Path) -> Result<RunOutput, BuildError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let content = fs::read_to_string(artifact).unwrap_or_default();
        let exit_code = if content.contains("EXIT1") { 1 } else { 0 };
        Ok(RunOutput {
            exit_code,
            stdout: format!("ran {}\n", self.language),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "assertion failed".to_string()
            },
        })
    }

    fn fingerprint_inputs(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("fake".to_string(), "1".to_string())])
    }
}

#[derive(Default)]
pub struct FakeProject {
    builds: AtomicUsize,
}

impl FakeProject {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ProjectBuilder for FakeProject {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn tool(&self) -> &'static str {
        "cargo"
    }

    fn manifest(&self) -> &'static str {
        "Cargo.toml"
    }

    fn probe(&self) -> ToolchainStatus {
        ToolchainStatus::available("fake-cargo 1.0")
    }

    fn build(&self, dir: &Path, optimization: OptLevel) -> Result<CompileOutput, BuildError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let manifest = fs::read_to_string(dir.join("Cargo.toml")).unwrap_or_default();
        if manifest.contains("FAIL") {
            return Err(BuildError::CompileFailed {
                language: Language::Rust,
                diagnostics: "error: failed to parse manifest".to_string(),
            });
        }

        let artifact = dir.join("target").join(optimization.as_str());
        fs::create_dir_all(&artifact).map_err(|e| BuildError::ArtifactStorage {
            reason: e.to_string(),
        })?;
        Ok(CompileOutput {
            artifact,
            diagnostics: "Finished".to_string(),
        })
    }
}

/// Isolated source + cache directories with fake adapters for every language.
pub struct TestWorkspace {
    temp_dir: TempDir,
    pub adapters: BTreeMap<Language, Arc<FakeAdapter>>,
    pub extension: Option<Arc<FakeAdapter>>,
    pub project: Arc<FakeProject>,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        let adapters = Language::ALL
            .iter()
            .map(|&language| {
                (
                    language,
                    Arc::new(FakeAdapter::new(language).with_delay(delay)),
                )
            })
            .collect();

        Self {
            temp_dir: TempDir::new().unwrap(),
            adapters,
            extension: Some(Arc::new(FakeAdapter::new(Language::Cpp).with_delay(delay))),
            project: Arc::new(FakeProject::default()),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path().join("cache")
    }

    /// Write `name` under the workspace and return its path.
    pub fn source(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn config(&self) -> BuilderConfig {
        let mut config = BuilderConfig::default();
        config.cache.dir = self.cache_dir().to_string_lossy().into_owned();
        config
    }

    pub fn registry(&self) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        for adapter in self.adapters.values() {
            registry.register_shared(BuildMode::Executable, adapter.clone());
        }
        if let Some(extension) = &self.extension {
            registry.register_shared(BuildMode::python_extension(), extension.clone());
        }
        registry.register_project_shared(self.project.clone());
        registry
    }

    pub fn builder(&self) -> Builder {
        self.builder_with(self.config())
    }

    pub fn builder_with(&self, config: BuilderConfig) -> Builder {
        Builder::with_adapters(config, self.registry())
    }

    pub fn adapter(&self, language: Language) -> &FakeAdapter {
        &self.adapters[&language]
    }

    /// Total compiles across every fake adapter.
    pub fn total_compiles(&self) -> usize {
        self.adapters.values().map(|a| a.compiles()).sum::<usize>()
            + self.extension.as_ref().map_or(0, |a| a.compiles())
    }
}
