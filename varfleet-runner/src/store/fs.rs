//! Directory-backed store: one file per key under a root directory.
//!
//! Writes go to a uniquely named temporary sibling and are renamed into place,
//! so readers never see a half-written blob. Conditional puts hold a lock file
//! next to the key around the compare and the rename; the lock is created
//! with `create_new`, so it excludes writers in other stores and other
//! processes sharing the same root.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use super::{validate_key, ObjectStore, StoreError, Version, VersionedBlob};

const TMP_SUFFIX: &str = ".tmp";
const LOCK_SUFFIX: &str = ".lock";

/// Longest a conditional put waits for another writer's lock.
const LOCK_WAIT: Duration = Duration::from_secs(10);

/// A lock file older than this was left by a writer that died mid-commit.
const STALE_LOCK: Duration = Duration::from_secs(30);

const LOCK_POLL: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    fn read(&self, key: &str, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_err(key, source)),
        }
    }

    fn write_atomic(&self, key: &str, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let parent = ensure_parent(key, path)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".blob-")
            .suffix(TMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| io_err(key, e))?;
        tmp.write_all(bytes).map_err(|e| io_err(key, e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(key, e))?;
        tmp.persist(path).map_err(|e| io_err(key, e.error))?;
        debug!(key, bytes = bytes.len(), "wrote blob");
        Ok(())
    }
}

fn ensure_parent<'a>(key: &str, path: &'a Path) -> Result<&'a Path, StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
    fs::create_dir_all(parent).map_err(|e| io_err(key, e))?;
    Ok(parent)
}

/// Exclusive lock on one key, held for as long as the guard lives.
struct KeyLock {
    path: PathBuf,
}

impl KeyLock {
    fn acquire(key: &str, blob_path: &Path) -> Result<Self, StoreError> {
        ensure_parent(key, blob_path)?;
        let mut name = blob_path.as_os_str().to_owned();
        name.push(LOCK_SUFFIX);
        let path = PathBuf::from(name);

        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Holder pid, for whoever has to clean up after a crash.
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!(key, "removing stale lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(StoreError::Unreachable(format!(
                            "timed out waiting for lock on {key}"
                        )));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(source) => return Err(io_err(key, source)),
            }
        }
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age > STALE_LOCK)
}

fn io_err(key: &str, source: io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        source,
    }
}

impl ObjectStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<VersionedBlob>, StoreError> {
        let path = self.path_for(key)?;
        Ok(self.read(key, &path)?.map(VersionedBlob::new))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<Version, StoreError> {
        let path = self.path_for(key)?;
        self.write_atomic(key, &path, bytes)?;
        Ok(Version::of(bytes))
    }

    fn put_if(
        &self,
        key: &str,
        bytes: &[u8],
        expected: Option<&Version>,
    ) -> Result<Version, StoreError> {
        let path = self.path_for(key)?;
        let _lock = KeyLock::acquire(key, &path)?;

        let current = self.read(key, &path)?.map(|b| Version::of(&b));
        if current.as_ref() != expected {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }
        self.write_atomic(key, &path, bytes)?;
        Ok(Version::of(bytes))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        collect_keys(&self.root, "", &mut keys).map_err(|e| io_err(prefix, e))?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(io_err(key, source)),
        }
    }

    fn location(&self, key: &str) -> String {
        self.path_for(key)
            .unwrap_or_else(|_| self.root.join(key))
            .display()
            .to_string()
    }
}

/// Walk `dir`, pushing `/`-joined keys relative to the store root.
fn collect_keys(dir: &Path, rel: &str, out: &mut Vec<String>) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = if rel.is_empty() {
            name.clone()
        } else {
            format!("{rel}/{name}")
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &key, out)?;
        } else if !name.ends_with(TMP_SUFFIX) && !name.ends_with(LOCK_SUFFIX) {
            out.push(key);
        }
    }
    Ok(())
}
