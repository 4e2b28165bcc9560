//! Append-only JSON logs over an [`ObjectStore`]: read, merge, write.
//!
//! An append is two phases, [`AppendLog::read`] then [`AppendLog::commit`],
//! so tests can interleave two writers deterministically. Under
//! [`WriteGuard::Unguarded`] the commit is a blind overwrite and a concurrent
//! writer's batch can be lost. Under [`WriteGuard::Conditional`] the commit is
//! a version-checked put; on conflict the blob is re-read and the batch merged
//! again on top of what is there now.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use varfleet_core::SimulationRecord;

use super::{ObjectStore, StoreError, Version};

/// Upper bound on re-read/re-merge rounds of one conditional commit.
pub const MAX_CAS_ATTEMPTS: usize = 8;

/// How commits protect against concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteGuard {
    /// Read-merge-write with a plain put. Concurrent appends may be lost.
    Unguarded,
    /// Read-merge-write with a compare-and-swap on the content version.
    #[default]
    Conditional,
}

/// A JSON document that holds an ordered, append-only list of items.
pub trait LogBlob: Default + Clone + Serialize + DeserializeOwned {
    type Item: Clone;

    fn items(&self) -> &[Self::Item];

    fn extend_from(&mut self, items: &[Self::Item]);
}

/// `{"results": [...]}`, the layout of every result blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultLog {
    #[serde(default)]
    pub results: Vec<SimulationRecord>,
}

impl LogBlob for ResultLog {
    type Item = SimulationRecord;

    fn items(&self) -> &[SimulationRecord] {
        &self.results
    }

    fn extend_from(&mut self, items: &[SimulationRecord]) {
        self.results.extend_from_slice(items);
    }
}

/// A bare JSON array, the layout of the audit log.
impl<T> LogBlob for Vec<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    type Item = T;

    fn items(&self) -> &[T] {
        self
    }

    fn extend_from(&mut self, items: &[T]) {
        self.extend_from_slice(items);
    }
}

/// Snapshot taken by [`AppendLog::read`]: the decoded blob and its version.
#[derive(Debug, Clone)]
pub struct PendingAppend<B> {
    key: String,
    base: B,
    version: Option<Version>,
}

impl<B: LogBlob> PendingAppend<B> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn base(&self) -> &B {
        &self.base
    }
}

#[derive(Clone)]
pub struct AppendLog {
    store: Arc<dyn ObjectStore>,
    guard: WriteGuard,
}

impl AppendLog {
    pub fn new(store: Arc<dyn ObjectStore>, guard: WriteGuard) -> Self {
        Self { store, guard }
    }

    pub fn guard(&self) -> WriteGuard {
        self.guard
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Read and decode `key`. An absent blob reads as an empty log.
    pub fn read<B: LogBlob>(&self, key: &str) -> Result<PendingAppend<B>, StoreError> {
        let (base, version) = match self.store.get(key)? {
            Some(blob) => {
                let base = serde_json::from_slice(&blob.bytes).map_err(|source| {
                    StoreError::Corrupt {
                        key: key.to_string(),
                        source,
                    }
                })?;
                (base, Some(blob.version))
            }
            None => (B::default(), None),
        };
        Ok(PendingAppend {
            key: key.to_string(),
            base,
            version,
        })
    }

    /// Decoded contents of `key`.
    pub fn load<B: LogBlob>(&self, key: &str) -> Result<B, StoreError> {
        Ok(self.read::<B>(key)?.base)
    }

    /// Append `items` on top of a previously read snapshot and write back.
    pub fn commit<B: LogBlob>(
        &self,
        pending: PendingAppend<B>,
        items: &[B::Item],
    ) -> Result<B, StoreError> {
        match self.guard {
            WriteGuard::Unguarded => {
                let merged = merge(&pending.base, items);
                self.store.put(&pending.key, &encode(&pending.key, &merged)?)?;
                Ok(merged)
            }
            WriteGuard::Conditional => self.commit_conditional(pending, items),
        }
    }

    fn commit_conditional<B: LogBlob>(
        &self,
        mut pending: PendingAppend<B>,
        items: &[B::Item],
    ) -> Result<B, StoreError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let merged = merge(&pending.base, items);
            let bytes = encode(&pending.key, &merged)?;
            match self
                .store
                .put_if(&pending.key, &bytes, pending.version.as_ref())
            {
                Ok(_) => return Ok(merged),
                Err(StoreError::Conflict { .. }) => {
                    debug!(key = %pending.key, attempt, "concurrent append, re-merging");
                    pending = self.read(&pending.key)?;
                }
                Err(e) => return Err(e),
            }
        }
        warn!(key = %pending.key, attempts = MAX_CAS_ATTEMPTS, "append kept conflicting");
        Err(StoreError::Conflict { key: pending.key })
    }

    /// Read, merge and write in one call.
    pub fn append<B: LogBlob>(&self, key: &str, items: &[B::Item]) -> Result<B, StoreError> {
        let pending = self.read::<B>(key)?;
        self.commit(pending, items)
    }
}

fn merge<B: LogBlob>(base: &B, items: &[B::Item]) -> B {
    let mut merged = base.clone();
    merged.extend_from(items);
    merged
}

fn encode<B: LogBlob>(key: &str, blob: &B) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(blob).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────
