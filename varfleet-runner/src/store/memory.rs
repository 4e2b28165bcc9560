//! In-process store, used by tests and single-process runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{validate_key, ObjectStore, StoreError, Version, VersionedBlob};

#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StoreError> {
        self.blobs
            .lock()
            .map_err(|_| StoreError::Unreachable("memory store lock poisoned".into()))
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<VersionedBlob>, StoreError> {
        validate_key(key)?;
        Ok(self.blobs()?.get(key).cloned().map(VersionedBlob::new))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<Version, StoreError> {
        validate_key(key)?;
        self.blobs()?.insert(key.to_string(), bytes.to_vec());
        Ok(Version::of(bytes))
    }

    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<&Version>,
    ) -> Result<Version, StoreError> {
        validate_key(key)?;
        let mut blobs = self.blobs()?;
        let current = blobs.get(key).map(|b| Version::of(b));
        if current.as_ref() != expected {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(Version::of(bytes))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .blobs()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.blobs()?.remove(key).is_some())
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}
