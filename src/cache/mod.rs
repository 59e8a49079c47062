//! Incremental build cache: fingerprints, the persistent index and the
//! single-flight registry.

pub mod fingerprint;
pub mod flight;
pub mod index;
pub mod store;

pub use fingerprint::{fingerprint, Fingerprint};
pub use index::CacheEntry;
pub use store::{Acquired, CacheStats, CacheStore, CompileOutcome};
