/// Persistent fingerprint index (`index.json`)
///
/// Loading is forward tolerant: unknown fields are ignored and malformed
/// entries are skipped with a warning. Only a file that is not valid JSON at
/// all is reported as corrupt.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::fingerprint::Fingerprint;
use crate::error::CacheError;

pub const INDEX_FILE: &str = "index.json";
pub const INDEX_VERSION: u32 = 1;

/// One successful build retained by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub artifact: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl CacheEntry {
    pub fn new(artifact: PathBuf) -> Self {
        Self {
            artifact,
            created_at: Utc::now(),
            success: true,
        }
    }
}

#[derive(Deserialize)]
struct RawIndex {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct IndexDocument<'a> {
    version: u32,
    entries: BTreeMap<String, &'a CacheEntry>,
}

/// Load the index at `path`.
///
/// A missing file is an empty index.
pub fn load(path: &Path) -> Result<HashMap<Fingerprint, CacheEntry>, CacheError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(CacheError::io(path, e)),
    };

    parse(&content).map_err(|reason| CacheError::IndexCorrupt {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse(content: &str) -> Result<HashMap<Fingerprint, CacheEntry>, String> {
    let raw: RawIndex = serde_json::from_str(content).map_err(|e| e.to_string())?;

    if raw.version > INDEX_VERSION {
        tracing::warn!(
            version = raw.version,
            supported = INDEX_VERSION,
            "[polybuild] Cache index written by a newer version, reading known fields only"
        );
    }

    let mut entries = HashMap::with_capacity(raw.entries.len());
    for (key, value) in raw.entries {
        let fingerprint = match key.parse::<Fingerprint>() {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!("[polybuild] Skipping cache index entry: {}", e);
                continue;
            }
        };

        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => {
                entries.insert(fingerprint, entry);
            }
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint.short(),
                    "[polybuild] Skipping malformed cache index entry: {}",
                    e
                );
            }
        }
    }

    Ok(entries)
}

/// Atomically replace the index at `path` with `entries`.
///
/// The document is written to a temporary file inside `root`, synced, then
/// renamed over the index so readers never observe a partial write.
pub fn persist(
    root: &Path,
    path: &Path,
    entries: &HashMap<Fingerprint, CacheEntry>,
) -> Result<(), CacheError> {
    let document = IndexDocument {
        version: INDEX_VERSION,
        entries: entries
            .iter()
            .map(|(fp, entry)| (fp.to_hex(), entry))
            .collect(),
    };

    let json = serde_json::to_vec_pretty(&document).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;

    fs::create_dir_all(root).map_err(|e| CacheError::io(root, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| CacheError::io(root, e))?;
    tmp.write_all(&json)
        .map_err(|e| CacheError::io(tmp.path().to_path_buf(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CacheError::io(tmp.path().to_path_buf(), e))?;
    tmp.persist(path).map_err(|e| CacheError::io(path, e.error))?;

    Ok(())
}
