/// Persistent build cache
///
/// Maps fingerprints to retained artifacts under `<root>/artifacts/<fp>/`,
/// backed by `<root>/index.json`. Cache failures never fail a build: they
/// are logged and the store degrades to misses.
///
/// Builds that are not retained (cache disabled) compile into scratch
/// directories under `<root>/work/` that disappear with their last holder.
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;

use super::fingerprint::Fingerprint;
use super::flight::{FlightRegistry, Shared};
use super::index::{self, CacheEntry, INDEX_FILE};
use crate::adapter::CompileOutput;
use crate::error::{BuildError, CacheError};
use crate::logging::{operations, status};

const ARTIFACTS_DIR: &str = "artifacts";
const WORK_DIR: &str = "work";

/// Scratch entries untouched for this long belong to no live build.
const STALE_SCRATCH_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// How a fingerprint was satisfied inside a flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// The leader found a usable entry when it re-checked the index.
    Hit(CacheEntry),
    /// Freshly compiled. `scratch` is set when the artifact is not retained;
    /// the artifact is valid only while a clone of it is alive.
    Compiled {
        output: CompileOutput,
        scratch: Option<Arc<ScratchDir>>,
    },
}

/// Unindexed output directory under `<root>/work/`, removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PartialEq for ScratchDir {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ScratchDir {}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                tracing::debug!(
                    "[polybuild] Failed to remove scratch directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Outcome shared between the leader of a compile and its followers.
pub type CompileOutcome = Result<Acquired, BuildError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entry_count: usize,
    /// Bytes retained under the artifact directory.
    pub total_size: u64,
    pub root: PathBuf,
}

pub struct CacheStore {
    root: PathBuf,
    enabled: bool,
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    /// Set when the index could not be parsed; lookups miss for the rest of the run.
    degraded: AtomicBool,
    write_lock: Mutex<()>,
    flights: FlightRegistry<Fingerprint, CompileOutcome>,
}

impl CacheStore {
    /// Open the store rooted at `root`. Never fails; an unreadable or
    /// corrupt index leaves the store in degraded mode.
    pub fn open(root: impl Into<PathBuf>, enabled: bool) -> Self {
        let root = root.into();
        let mut degraded = false;

        let entries = if enabled {
            match index::load(&root.join(INDEX_FILE)) {
                Ok(entries) => {
                    tracing::debug!(
                        operation = operations::CACHE_OPEN,
                        entries = entries.len(),
                        "[polybuild] Loaded cache index from {}",
                        root.display()
                    );
                    entries
                }
                Err(e) => {
                    tracing::warn!(
                        operation = operations::CACHE_OPEN,
                        status = status::DEGRADED,
                        "[polybuild] CacheIndexCorrupt: {}; cache lookups disabled for this run",
                        e
                    );
                    degraded = true;
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        sweep_stale_scratch(&root.join(WORK_DIR));

        Self {
            root,
            enabled,
            entries: RwLock::new(entries),
            degraded: AtomicBool::new(degraded),
            write_lock: Mutex::new(()),
            flights: FlightRegistry::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn artifacts_root(&self) -> PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    /// Find a usable entry. An entry whose artifact is gone is removed.
    pub fn lookup(&self, fp: &Fingerprint) -> Option<CacheEntry> {
        if !self.enabled || self.is_degraded() {
            return None;
        }

        let entry = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fp)
            .cloned()?;

        if entry.success && entry.artifact.exists() {
            return Some(entry);
        }

        tracing::warn!(
            operation = operations::CACHE_LOOKUP,
            fingerprint = %fp.short(),
            "[polybuild] Cached artifact missing, dropping stale entry: {}",
            entry.artifact.display()
        );

        // A concurrent record may have replaced the stale entry meanwhile
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if entries.get(fp) == Some(&entry) {
                entries.remove(fp);
                true
            } else {
                false
            }
        };
        if removed {
            if let Err(e) = self.persist() {
                tracing::warn!("[polybuild] Failed to persist cache index: {}", e);
            }
        }
        None
    }

    /// Record a successful build, replacing any previous entry.
    pub fn record(&self, fp: &Fingerprint, artifact: &Path) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*fp, CacheEntry::new(artifact.to_path_buf()));
        self.persist()?;

        tracing::debug!(
            operation = operations::CACHE_RECORD,
            fingerprint = %fp.short(),
            "[polybuild] Recorded {}",
            artifact.display()
        );
        Ok(())
    }

    /// Delete one entry and its artifact directory. Returns whether it existed.
    pub fn remove(&self, fp: &Fingerprint) -> Result<bool, CacheError> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(fp)
            .is_some();

        let dir = self.artifacts_root().join(fp.to_hex());
        let had_dir = dir.exists();
        if had_dir {
            fs::remove_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        }

        if removed {
            self.persist()?;
        }
        Ok(removed || had_dir)
    }

    /// Drop every entry and retained artifact.
    pub fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        match fs::remove_file(self.index_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(self.index_path(), e)),
        }

        for dir in [self.artifacts_root(), self.root.join(WORK_DIR)] {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
            }
        }

        self.degraded.store(false, Ordering::SeqCst);

        tracing::info!(
            operation = operations::CACHE_CLEAR,
            "[polybuild] Cleared cache at {}",
            self.root.display()
        );
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();

        CacheStats {
            enabled: self.enabled,
            entry_count,
            total_size: dir_size(&self.artifacts_root()),
            root: self.root.clone(),
        }
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<(Fingerprint, CacheEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(fp, entry)| (*fp, entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));
        entries
    }

    /// Prepare the empty retained artifact directory for `fp`.
    pub fn output_dir(&self, fp: &Fingerprint) -> Result<PathBuf, BuildError> {
        let dir = self.artifacts_root().join(fp.to_hex());

        let storage_error = |e: std::io::Error| BuildError::ArtifactStorage {
            reason: format!("{}: {}", dir.display(), e),
        };

        // Leftovers from an interrupted build are never reused
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(storage_error)?;
        }
        fs::create_dir_all(&dir).map_err(storage_error)?;
        Ok(dir)
    }

    /// Create a fresh scratch directory for an unretained build of `fp`.
    pub fn scratch_dir(&self, fp: &Fingerprint) -> Result<ScratchDir, BuildError> {
        let work = self.root.join(WORK_DIR);
        let storage_error = |e: std::io::Error| BuildError::ArtifactStorage {
            reason: format!("{}: {}", work.display(), e),
        };

        fs::create_dir_all(&work).map_err(storage_error)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", fp.short()))
            .tempdir_in(&work)
            .map_err(storage_error)?;

        Ok(ScratchDir {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    /// Produce an artifact for `fp`, compiling at most once concurrently.
    ///
    /// The leader re-checks the index, prepares the output directory, runs
    /// `compile` and records a success. Followers receive the leader's
    /// outcome, success or failure.
    ///
    /// A retained directory that already backs an entry is never rebuilt in
    /// place: in degraded mode such a compile goes to scratch instead.
    pub fn get_or_compile<F>(&self, fp: &Fingerprint, compile: F) -> Shared<CompileOutcome>
    where
        F: FnOnce(&Path) -> Result<CompileOutput, BuildError>,
    {
        self.flights.run(fp, || {
            if let Some(entry) = self.lookup(fp) {
                return Ok(Acquired::Hit(entry));
            }

            let in_use = self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(fp);

            let (dir, scratch) = if self.enabled && !in_use {
                (self.output_dir(fp)?, None)
            } else {
                let scratch = self.scratch_dir(fp)?;
                (scratch.path().to_path_buf(), Some(Arc::new(scratch)))
            };

            let output = match compile(&dir) {
                Ok(output) => output,
                Err(e) => {
                    if scratch.is_none() {
                        discard_dir(&dir);
                    }
                    return Err(e);
                }
            };

            if !output.artifact.exists() {
                if scratch.is_none() {
                    discard_dir(&dir);
                }
                return Err(BuildError::ArtifactStorage {
                    reason: format!(
                        "compiler reported success but {} does not exist",
                        output.artifact.display()
                    ),
                });
            }

            if scratch.is_none() {
                if let Err(e) = self.record(fp, &output.artifact) {
                    tracing::warn!(
                        operation = operations::CACHE_RECORD,
                        fingerprint = %fp.short(),
                        "[polybuild] Failed to record build: {}",
                        e
                    );
                }
            }
            Ok(Acquired::Compiled { output, scratch })
        })
    }

    fn persist(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        index::persist(&self.root, &self.index_path(), &snapshot)
    }
}

/// Remove a failed build's directory; failure only costs disk space.
fn discard_dir(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(
            "[polybuild] Failed to remove {}: {}",
            dir.display(),
            e
        ),
    }
}

/// Delete scratch entries left behind by builds that never finished.
fn sweep_stale_scratch(work: &Path) {
    let Ok(entries) = fs::read_dir(work) else {
        return;
    };
    let now = SystemTime::now();

    for entry in entries.filter_map(|e| e.ok()) {
        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age >= STALE_SCRATCH_AGE);
        if !stale {
            continue;
        }

        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => tracing::debug!("[polybuild] Removed stale scratch {}", path.display()),
            Err(e) => tracing::debug!(
                "[polybuild] Failed to remove stale scratch {}: {}",
                path.display(),
                e
            ),
        }
    }
}

fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
