//! Caller-facing entry points.
//!
//! A `Builder` owns the effective configuration, the cache store, the
//! adapter registry and the scheduler. One instance serves any number of
//! `build_mixed`/`build_group` calls; the cache store and the memoized
//! toolchain probes are shared between them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapter::{AdapterRegistry, ToolchainStatus};
use crate::build::{
    aggregate, classify, BuildGroup, BuildMode, BuildOptions, BuildResult, BuildStatus, BuildTask,
    GroupSlot, Job, Language, OptLevel, Parallelism, Report, Scheduler, Timings,
};
use crate::cache::{CacheStats, CacheStore};
use crate::config::BuilderConfig;
use crate::error::{BuildError, CacheError};
use crate::logging::{operations, status};

/// Effective worker settings, as reported by `polybuild doctor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParallelInfo {
    pub enabled: bool,
    /// Workers a parallel build would use.
    pub max_workers: usize,
    pub cpu_count: usize,
}

pub struct Builder {
    config: BuilderConfig,
    registry: AdapterRegistry,
    scheduler: Scheduler,
}

impl Builder {
    /// Builder with the built-in adapters.
    pub fn new(config: BuilderConfig) -> Self {
        let registry = AdapterRegistry::builtin(&config);
        Self::with_adapters(config, registry)
    }

    pub fn with_adapters(config: BuilderConfig, registry: AdapterRegistry) -> Self {
        let root = absolute(&config.cache_dir());
        let store = Arc::new(CacheStore::open(root, config.cache.enabled));
        let scheduler = Scheduler::new(store, config.runtime.execute);

        tracing::debug!(
            adapters = registry.len(),
            cache_enabled = config.cache.enabled,
            execute = config.runtime.execute,
            "[polybuild] Builder ready"
        );

        Self {
            config,
            registry,
            scheduler,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheStore {
        self.scheduler.store()
    }

    /// Build (and run) every file in `paths`, grouped by language.
    ///
    /// `parallel_override` replaces `parallel.enabled` for this call only.
    /// The report always covers every group, in first-occurrence order.
    pub fn build_mixed(
        &self,
        paths: &[PathBuf],
        profile: bool,
        parallel_override: Option<bool>,
    ) -> Report {
        let started = Instant::now();
        let paths: Vec<PathBuf> = paths.iter().map(|p| absolute(p)).collect();

        let slots = classify(&paths, BuildMode::Executable, &BuildOptions::default());
        let jobs = slots.into_iter().map(|slot| self.job_for(slot)).collect();

        let results = self.scheduler.run(jobs, self.parallelism(parallel_override));
        let report = aggregate(results, started.elapsed(), profile);

        tracing::info!(
            groups = report.per_group.len(),
            success = report.overall_success,
            "[polybuild] Build finished in {:.2}s",
            report.total_duration.as_secs_f64()
        );
        report
    }

    /// Build `files` as one group.
    ///
    /// Without `language` the group's language comes from the first file.
    /// Every file is compiled under that language regardless of extension.
    pub fn build_group(
        &self,
        files: &[PathBuf],
        language: Option<Language>,
        mode: BuildMode,
        options: BuildOptions,
    ) -> BuildResult {
        let files: Vec<PathBuf> = files.iter().map(|p| absolute(p)).collect();

        let Some(first) = files.first() else {
            return BuildResult::failed(
                "empty",
                language,
                Vec::new(),
                BuildError::SourceUnreadable {
                    path: PathBuf::new(),
                    reason: "no source files given".to_string(),
                },
            );
        };

        let language = match language.or_else(|| Language::from_path(first)) {
            Some(language) => language,
            None => {
                let extension = first
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
                    .unwrap_or_else(|| "<none>".to_string());
                return BuildResult::failed(
                    format!("unsupported({})", extension),
                    None,
                    files,
                    BuildError::UnsupportedLanguage { extension },
                );
            }
        };

        let label = mode_label(language, mode);
        let Some(group) = BuildGroup::new(language, mode, options, files.clone()) else {
            return BuildResult::failed(
                label,
                Some(language),
                files,
                BuildError::SourceUnreadable {
                    path: PathBuf::new(),
                    reason: "no source files given".to_string(),
                },
            );
        };

        let job = self.job_for(GroupSlot::Supported(group));
        self.scheduler
            .run(vec![job], Parallelism::Sequential)
            .pop()
            .unwrap_or_else(|| {
                BuildResult::failed(
                    label,
                    Some(language),
                    files,
                    BuildError::TaskPanicked {
                        reason: "task produced no result".to_string(),
                    },
                )
            })
    }

    /// Build the project in `dir` with the build tool registered for
    /// `language` (`cargo build` for rust). Never cached.
    pub fn build_project(
        &self,
        dir: &Path,
        language: Language,
        optimization: OptLevel,
    ) -> BuildResult {
        let dir = absolute(dir);
        let start = Instant::now();

        let Some(project) = self.registry.project(language) else {
            return BuildResult::failed(
                format!("{} (project)", language),
                Some(language),
                vec![dir],
                BuildError::NoProjectBuilder { language },
            );
        };

        let label = project_label(language, project.tool());
        let manifest = dir.join(project.manifest());
        if !manifest.is_file() {
            return BuildResult::failed(
                label,
                Some(language),
                vec![manifest.clone()],
                BuildError::ManifestMissing { path: manifest },
            );
        }

        let toolchain = project.probe();
        if !toolchain.available {
            return BuildResult::failed(
                label,
                Some(language),
                vec![manifest],
                BuildError::ToolchainUnavailable {
                    language,
                    detail: toolchain.detail,
                },
            );
        }

        tracing::info!(
            operation = operations::COMPILE,
            language = %language,
            "[polybuild] Building {} project in {}",
            project.tool(),
            dir.display()
        );

        let outcome = project.build(&dir, optimization);
        let timings = Timings {
            compile: start.elapsed(),
            ..Timings::default()
        };

        let mut result = match outcome {
            Ok(output) => BuildResult {
                label,
                language: Some(language),
                files: vec![manifest],
                status: BuildStatus::Built,
                duration: Duration::ZERO,
                diagnostics: output.diagnostics,
                artifact: Some(output.artifact),
                fingerprint: None,
                error: None,
                run: None,
                timings,
            },
            Err(e) => {
                tracing::warn!(
                    operation = operations::COMPILE,
                    status = status::FAILED,
                    language = %language,
                    "[polybuild] {} failed: {}",
                    label,
                    e
                );
                let mut result = BuildResult::failed(label, Some(language), vec![manifest], e);
                result.timings = timings;
                result
            }
        };
        result.duration = start.elapsed();
        result
    }

    /// Probe every registered adapter and project builder, keyed by label
    /// (`cpp`, `cpp (python-extension)`, `rust (cargo)`, ...).
    pub fn probe_toolchains(&self) -> BTreeMap<String, ToolchainStatus> {
        let adapters = self
            .registry
            .keys()
            .into_iter()
            .filter_map(|(language, mode)| {
                let adapter = self.registry.get(language, mode)?;
                Some((mode_label(language, mode), adapter.probe()))
            });

        let projects = self
            .registry
            .project_languages()
            .into_iter()
            .filter_map(|language| {
                let project = self.registry.project(language)?;
                Some((project_label(language, project.tool()), project.probe()))
            });

        adapters.chain(projects).collect()
    }

    pub fn parallel_info(&self) -> ParallelInfo {
        let cpu_count = num_cpus::get().max(1);
        ParallelInfo {
            enabled: self.config.parallel.enabled,
            max_workers: self.config.max_workers().unwrap_or(cpu_count),
            cpu_count,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.cache().clear()
    }

    fn parallelism(&self, parallel_override: Option<bool>) -> Parallelism {
        if !parallel_override.unwrap_or(self.config.parallel.enabled) {
            return Parallelism::Sequential;
        }
        match self.config.max_workers() {
            Some(max_workers) => Parallelism::Parallel { max_workers },
            None => Parallelism::available(),
        }
    }

    fn job_for(&self, slot: GroupSlot) -> Job {
        match slot {
            GroupSlot::Supported(group) => {
                match self.registry.get(group.language(), group.mode()) {
                    Some(adapter) => Job::Build(BuildTask { group, adapter }),
                    None => Job::Settled(BuildResult::failed(
                        group.label(),
                        Some(group.language()),
                        group.paths(),
                        BuildError::NoAdapter {
                            language: group.language(),
                            mode: group.mode(),
                        },
                    )),
                }
            }
            GroupSlot::Unsupported { extension, files } => Job::Settled(BuildResult::failed(
                format!("unsupported({})", extension),
                None,
                files,
                BuildError::UnsupportedLanguage { extension },
            )),
        }
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("cache_root", &self.cache().root())
            .finish()
    }
}

/// Label of a `(language, mode)` pair, matching `BuildGroup::label`.
pub fn mode_label(language: Language, mode: BuildMode) -> String {
    match mode {
        BuildMode::Executable => language.to_string(),
        BuildMode::Module { packaging } => format!("{} ({})", language, packaging.as_str()),
    }
}

/// Label of a project build, e.g. `rust (cargo)`.
pub fn project_label(language: Language, tool: &str) -> String {
    format!("{} ({})", language, tool)
}

/// Canonical form of `path`, or `path` joined onto the working directory
/// when it does not exist.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildStatus;

    #[test]
    fn test_mode_label_matches_group_label() {
        let group = BuildGroup::new(
            Language::Cpp,
            BuildMode::python_extension(),
            BuildOptions::default(),
            vec![PathBuf::from("/w/ext.cpp")],
        )
        .unwrap();
        assert_eq!(
            mode_label(Language::Cpp, BuildMode::python_extension()),
            group.label()
        );
        assert_eq!(mode_label(Language::Java, BuildMode::Executable), "java");
    }

    #[test]
    fn test_absolute_keeps_missing_paths() {
        let resolved = absolute(Path::new("does/not/exist.cpp"));
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("does/not/exist.cpp"));
    }

    #[test]
    fn test_empty_registry_reports_no_adapter() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = BuilderConfig::default();
        config.cache.dir = temp.path().join("cache").to_string_lossy().into_owned();
        let builder = Builder::with_adapters(config, AdapterRegistry::new());

        let source = temp.path().join("main.rs");
        std::fs::write(&source, "fn main() {}").unwrap();

        let report = builder.build_mixed(&[source], false, Some(false));
        assert!(!report.overall_success);
        assert_eq!(report.per_group[0].status, BuildStatus::Failed);
        assert!(matches!(
            report.per_group[0].error,
            Some(BuildError::NoAdapter { .. })
        ));
    }

    #[test]
    fn test_build_group_rejects_empty_and_unknown() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = BuilderConfig::default();
        config.cache.dir = temp.path().join("cache").to_string_lossy().into_owned();
        let builder = Builder::with_adapters(config, AdapterRegistry::new());

        let empty = builder.build_group(&[], None, BuildMode::Executable, BuildOptions::default());
        assert!(matches!(
            empty.error,
            Some(BuildError::SourceUnreadable { .. })
        ));

        let unknown = builder.build_group(
            &[temp.path().join("notes.txt")],
            None,
            BuildMode::Executable,
            BuildOptions::default(),
        );
        assert_eq!(unknown.label, "unsupported(.txt)");
        assert!(matches!(
            unknown.error,
            Some(BuildError::UnsupportedLanguage { .. })
        ));
    }

    #[test]
    fn test_parallelism_follows_config_and_override() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = BuilderConfig::default();
        config.cache.dir = temp.path().to_string_lossy().into_owned();
        config.parallel.max_workers = Some(3);
        let builder = Builder::with_adapters(config, AdapterRegistry::new());

        assert_eq!(
            builder.parallelism(None),
            Parallelism::Parallel { max_workers: 3 }
        );
        assert_eq!(builder.parallelism(Some(false)), Parallelism::Sequential);
    }

    #[test]
    fn test_parallel_info_reports_effective_workers() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = BuilderConfig::default();
        config.cache.dir = temp.path().to_string_lossy().into_owned();

        let info = Builder::with_adapters(config.clone(), AdapterRegistry::new()).parallel_info();
        assert!(info.enabled);
        assert!(info.cpu_count >= 1);
        assert_eq!(info.max_workers, info.cpu_count);

        config.parallel.enabled = false;
        config.parallel.max_workers = Some(2);
        let info = Builder::with_adapters(config, AdapterRegistry::new()).parallel_info();
        assert!(!info.enabled);
        assert_eq!(info.max_workers, 2);
    }

    #[test]
    fn test_project_without_manifest_fails_before_probing() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = BuilderConfig::default();
        config.cache.dir = temp.path().join("cache").to_string_lossy().into_owned();
        let builder = Builder::new(config);

        let result = builder.build_project(temp.path(), Language::Rust, OptLevel::Release);
        assert_eq!(result.label, "rust (cargo)");
        assert_eq!(
            result.error,
            Some(BuildError::ManifestMissing {
                path: temp.path().canonicalize().unwrap().join("Cargo.toml")
            })
        );
    }
}
