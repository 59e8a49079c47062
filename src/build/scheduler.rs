/// Build scheduler
///
/// Runs one task per build group, either sequentially on the calling thread
/// or on a bounded pool of scoped worker threads, and always returns exactly
/// one result per job in submission order.
use crossbeam_channel::{bounded, unbounded};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use super::report::{BuildResult, BuildStatus, Timings};
use super::source::{BuildGroup, BuildMode, Language};
use crate::adapter::{LanguageAdapter, ToolchainStatus};
use crate::cache::{fingerprint, Acquired, CacheStore};
use crate::error::BuildError;
use crate::logging::{operations, status};

/// A group paired with the adapter that builds it.
#[derive(Clone)]
pub struct BuildTask {
    pub group: BuildGroup,
    pub adapter: Arc<dyn LanguageAdapter>,
}

/// One slot of a scheduled batch.
pub enum Job {
    Build(BuildTask),
    /// Already decided before scheduling (unsupported extension, no adapter).
    Settled(BuildResult),
}

impl Job {
    fn describe(&self) -> (String, Option<Language>, Vec<PathBuf>) {
        match self {
            Job::Build(task) => (
                task.group.label(),
                Some(task.group.language()),
                task.group.paths(),
            ),
            Job::Settled(result) => (
                result.label.clone(),
                result.language,
                result.files.clone(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel { max_workers: usize },
}

impl Parallelism {
    /// Parallel with one worker per available CPU.
    pub fn available() -> Self {
        Parallelism::Parallel {
            max_workers: num_cpus::get().max(1),
        }
    }
}

pub struct Scheduler {
    store: Arc<CacheStore>,
    execute: bool,
    probes: Mutex<HashMap<(Language, BuildMode), ToolchainStatus>>,
}

impl Scheduler {
    /// `execute` controls whether executable artifacts are run after building.
    pub fn new(store: Arc<CacheStore>, execute: bool) -> Self {
        Self {
            store,
            execute,
            probes: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Run every job; returns only after all of them have reported.
    pub fn run(&self, jobs: Vec<Job>, parallelism: Parallelism) -> Vec<BuildResult> {
        let workers = match parallelism {
            Parallelism::Sequential => 1,
            Parallelism::Parallel { max_workers } => max_workers.max(1).min(jobs.len()),
        };

        tracing::debug!(
            operation = operations::SCHEDULE,
            jobs = jobs.len(),
            workers,
            "[polybuild] Scheduling build"
        );

        if parallelism == Parallelism::Sequential || jobs.len() <= 1 {
            return jobs.into_iter().map(|job| self.run_job(job)).collect();
        }

        self.run_parallel(jobs, workers)
    }

    fn run_parallel(&self, jobs: Vec<Job>, workers: usize) -> Vec<BuildResult> {
        let described: Vec<_> = jobs.iter().map(Job::describe).collect();
        let mut slots: Vec<Option<BuildResult>> = (0..jobs.len()).map(|_| None).collect();

        let (job_tx, job_rx) = bounded::<(usize, Job)>(workers);
        let (result_tx, result_rx) = unbounded::<(usize, BuildResult)>();

        thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || {
                    for (index, job) in job_rx.iter() {
                        let result = self.run_job(job);
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            for (index, job) in jobs.into_iter().enumerate() {
                if job_tx.send((index, job)).is_err() {
                    break;
                }
            }
            drop(job_tx);

            for (index, result) in result_rx.iter() {
                slots[index] = Some(result);
            }
        });

        slots
            .into_iter()
            .zip(described)
            .map(|(slot, (label, language, files))| {
                slot.unwrap_or_else(|| {
                    BuildResult::failed(
                        label,
                        language,
                        files,
                        BuildError::TaskPanicked {
                            reason: "worker exited without reporting a result".to_string(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Run one job, turning a panic into a failed result.
    fn run_job(&self, job: Job) -> BuildResult {
        let task = match job {
            Job::Settled(result) => return result,
            Job::Build(task) => task,
        };

        let label = task.group.label();
        let language = task.group.language();
        let files = task.group.paths();
        let start = Instant::now();

        match panic::catch_unwind(AssertUnwindSafe(|| self.build(task))) {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(
                    operation = operations::COMPILE,
                    status = status::FAILED,
                    language = %language,
                    "[polybuild] Build task for {} panicked: {}",
                    label,
                    reason
                );
                let mut result = BuildResult::failed(
                    label,
                    Some(language),
                    files,
                    BuildError::TaskPanicked { reason },
                );
                result.duration = start.elapsed();
                result
            }
        }
    }

    /// fingerprint → lookup → (miss) probe → single-flight compile → record → run
    fn build(&self, task: BuildTask) -> BuildResult {
        let BuildTask { group, adapter } = task;
        let start = Instant::now();
        let mut timings = Timings::default();

        let fail = |error: BuildError, timings: Timings| {
            let mut result =
                BuildResult::failed(group.label(), Some(group.language()), group.paths(), error);
            result.timings = timings;
            result.duration = start.elapsed();
            result
        };

        let phase = Instant::now();
        let fp = match fingerprint(&group, &adapter.fingerprint_inputs()) {
            Ok(fp) => fp,
            Err(e) => return fail(e, timings),
        };
        timings.fingerprint = phase.elapsed();

        // `_scratch` keeps an unretained artifact alive through the run step
        let (build_status, artifact, diagnostics, _scratch) = match self.store.lookup(&fp) {
            Some(entry) => {
                tracing::info!(
                    operation = operations::CACHE_LOOKUP,
                    status = status::HIT,
                    language = %group.language(),
                    fingerprint = %fp.short(),
                    "[polybuild] Cache hit for {}",
                    group.label()
                );
                (BuildStatus::Cached, entry.artifact, String::new(), None)
            }
            None => {
                tracing::debug!(
                    operation = operations::CACHE_LOOKUP,
                    status = status::MISS,
                    language = %group.language(),
                    fingerprint = %fp.short(),
                    "[polybuild] Cache miss for {}",
                    group.label()
                );

                let toolchain = self.probe(adapter.as_ref(), group.mode());
                if !toolchain.available {
                    let mut result = fail(
                        BuildError::ToolchainUnavailable {
                            language: group.language(),
                            detail: toolchain.detail,
                        },
                        timings,
                    );
                    result.fingerprint = Some(fp);
                    return result;
                }

                let phase = Instant::now();
                let shared = self
                    .store
                    .get_or_compile(&fp, |out_dir| adapter.compile(&group, out_dir));
                timings.compile = phase.elapsed();

                match shared.value {
                    Ok(Acquired::Hit(entry)) => {
                        (BuildStatus::Cached, entry.artifact, String::new(), None)
                    }
                    Ok(Acquired::Compiled { output, scratch }) => {
                        tracing::info!(
                            operation = operations::COMPILE,
                            status = if shared.leader { status::BUILT } else { status::SHARED },
                            language = %group.language(),
                            fingerprint = %fp.short(),
                            "[polybuild] Built {} in {:.2}s",
                            group.label(),
                            timings.compile.as_secs_f64()
                        );
                        (BuildStatus::Built, output.artifact, output.diagnostics, scratch)
                    }
                    Err(e) => {
                        tracing::warn!(
                            operation = operations::COMPILE,
                            status = status::FAILED,
                            language = %group.language(),
                            fingerprint = %fp.short(),
                            "[polybuild] {} failed: {}",
                            group.label(),
                            e
                        );
                        let mut result = fail(e, timings);
                        result.fingerprint = Some(fp);
                        return result;
                    }
                }
            }
        };

        let mut result = BuildResult {
            label: group.label(),
            language: Some(group.language()),
            files: group.paths(),
            status: build_status,
            duration: start.elapsed(),
            diagnostics,
            artifact: Some(artifact.clone()),
            fingerprint: Some(fp),
            error: None,
            run: None,
            timings,
        };

        if self.execute && group.mode().is_executable() {
            let phase = Instant::now();
            let outcome = adapter.run(&artifact);
            result.timings.run = phase.elapsed();

            match outcome {
                Ok(run) if run.success() => {
                    result.run = Some(run);
                }
                Ok(run) => {
                    tracing::warn!(
                        operation = operations::RUN,
                        status = status::FAILED,
                        language = %group.language(),
                        "[polybuild] {} exited with code {}",
                        group.label(),
                        run.exit_code
                    );
                    result.status = BuildStatus::Failed;
                    result.error = Some(BuildError::RunFailed {
                        exit_code: run.exit_code,
                        stderr: run.stderr.clone(),
                    });
                    result.run = Some(run);
                }
                Err(e) => {
                    result.status = BuildStatus::Failed;
                    result.error = Some(e);
                }
            }
        }

        result.duration = start.elapsed();
        result
    }

    /// Probe once per language and mode for the lifetime of the scheduler.
    fn probe(&self, adapter: &dyn LanguageAdapter, mode: BuildMode) -> ToolchainStatus {
        let key = (adapter.language(), mode);
        if let Some(cached) = self
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return cached.clone();
        }

        let status = adapter.probe();
        tracing::debug!(
            operation = operations::PROBE,
            language = %key.0,
            available = status.available,
            "[polybuild] Probed {}: {}",
            key.0,
            status.detail
        );

        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(status)
            .clone()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
