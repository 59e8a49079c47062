/// Fingerprint computation for build groups
///
/// A fingerprint is a SHA-256 digest over everything that can change what
/// the compiler emits for a group:
/// - Relative path and full content of every source (sorted by path)
/// - The entry file, which decides what the compiler is pointed at
/// - Language and build mode
/// - Optimization level plus the resolved artifact and module names
/// - Extra invocation inputs declared by the adapter (e.g. interpreter path)
///
/// Anything left out of this encoding must not influence compiler output.
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::build::source::BuildGroup;
use crate::error::BuildError;

const DOMAIN_TAG: &[u8] = b"polybuild-fingerprint-v2";

/// Content-derived cache key for a build group.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines and tables.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid fingerprint '{}': {}", s, e))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("invalid fingerprint '{}': expected 64 hex characters", s))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the fingerprint of a group.
///
/// `extra` carries adapter-declared invocation inputs; it is encoded in key
/// order so map construction order never matters.
pub fn fingerprint(
    group: &BuildGroup,
    extra: &BTreeMap<String, String>,
) -> Result<Fingerprint, BuildError> {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);

    // 1. Sources, sorted by relative key for order independence
    let mut units: Vec<_> = group.units().iter().collect();
    units.sort_by(|a, b| a.rel_key().cmp(b.rel_key()));

    update_len(&mut hasher, units.len());
    for unit in units {
        let content = unit.content().map_err(|e| BuildError::SourceUnreadable {
            path: unit.path().to_path_buf(),
            reason: e.to_string(),
        })?;
        update_field(&mut hasher, unit.rel_key().as_bytes());
        update_field(&mut hasher, content);
    }

    // 2. Entry file; the units above are order-free, the entry is not
    update_option(&mut hasher, "entry", group.main_unit().rel_key());

    // 3. Invocation options, with names resolved against the entry file
    let options = group.options();
    update_option(&mut hasher, "language", group.language().as_str());
    update_option(&mut hasher, "mode", &group.mode().to_string());
    update_option(&mut hasher, "optimization", options.optimization.as_str());
    update_option(&mut hasher, "target_name", &group.artifact_stem());
    update_option(&mut hasher, "module_name", &group.module_name());

    // 4. Adapter-declared inputs
    update_len(&mut hasher, extra.len());
    for (key, value) in extra {
        update_option(&mut hasher, key, value);
    }

    Ok(Fingerprint(hasher.finalize().into()))
}

fn update_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    update_len(hasher, bytes.len());
    hasher.update(bytes);
}

fn update_option(hasher: &mut Sha256, key: &str, value: &str) {
    update_field(hasher, key.as_bytes());
    update_field(hasher, value.as_bytes());
}
