//! Object store abstraction and the append-only logs built on it.
//!
//! The store is the only shared mutable state between runs. Every blob has a
//! content [`Version`]; a conditional put succeeds only when the stored
//! version still matches the one the writer read, which is what keeps
//! concurrent read-merge-write cycles from losing each other's appends.

pub mod append;
pub mod fs;
pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use append::{AppendLog, LogBlob, PendingAppend, ResultLog, WriteGuard, MAX_CAS_ATTEMPTS};
pub use fs::FileStore;
pub use memory::MemoryStore;

/// Content version of a stored blob (BLAKE3 of its bytes, hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Bytes read from the store together with the version they had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedBlob {
    pub bytes: Vec<u8>,
    pub version: Version,
}

impl VersionedBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        let version = Version::of(&bytes);
        Self { bytes, version }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("I/O error on '{key}'")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("blob '{key}' is not valid JSON for its log")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode blob '{key}'")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{key}' changed since it was read")]
    Conflict { key: String },

    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

/// Logical contract of the blob store: read bytes, write bytes, list, delete.
///
/// Keys are `/`-separated relative paths such as `results/results_buy.json`.
pub trait ObjectStore: Send + Sync {
    /// Current blob at `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<VersionedBlob>, StoreError>;

    /// Unconditional overwrite.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<Version, StoreError>;

    /// Write only if the stored version equals `expected` (`None`: the key
    /// must be absent). Fails with [`StoreError::Conflict`] otherwise.
    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<&Version>,
    ) -> Result<Version, StoreError>;

    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Remove `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Human-readable location of `key` (a path or URL).
    fn location(&self, key: &str) -> String;
}

/// Reject keys that could escape the store root or are empty.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
