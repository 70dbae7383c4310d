//! Local Key/Value Store
//!
//! String → string persistence on the device, used for cached cloud values
//! and the outbox manifest.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

/// File name of the store inside the data directory.
pub const STORE_FILE_NAME: &str = "prefs.json";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store io error: {0}")]
    Io(#[from] io::Error),
    /// Store file is not a JSON string map.
    #[error("store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Device-local string store.
///
/// Writes are visible to `get` immediately; `flush` makes them durable.
pub trait KeyValueStore: Send + Sync {
    /// Value for `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Set `key` to `value`.
    fn set(&self, key: &str, value: &str);
    /// Remove `key`. Returns whether it was present.
    fn remove(&self, key: &str) -> bool;
    /// Drop every entry.
    fn clear(&self);
    /// Persist pending writes.
    fn flush(&self) -> Result<(), StoreError>;

    /// True if `key` has a value.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Ephemeral store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(key).is_some()
    }

    fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store backed by a JSON file, read on open and rewritten on flush.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Serializes flushes; they share one temp file.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file is absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::with_entries(path, entries))
    }

    /// Open the store at `path`, starting empty if the file is unreadable
    /// as a store. The bad file is replaced on the next flush.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        match Self::open(path.clone()) {
            Err(StoreError::Corrupt(e)) => {
                warn!(target: "cloud", "Local store {} is corrupt, starting empty: {}", path.display(), e);
                Ok(Self::with_entries(path, BTreeMap::new()))
            }
            result => result,
        }
    }

    fn with_entries(path: PathBuf, entries: BTreeMap<String, String>) -> Self {
        Self {
            path,
            inner: MemoryStore {
                entries: Mutex::new(entries),
            },
            write_lock: Mutex::new(()),
        }
    }

    /// Open the default store file inside `dir`.
    pub fn open_in(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(dir.as_ref().join(STORE_FILE_NAME))
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.inner.set(key, value);
    }

    fn remove(&self, key: &str) -> bool {
        self.inner.remove(key)
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn flush(&self) -> Result<(), StoreError> {
        let _writing = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let json = {
            let entries = self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*entries)?
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
