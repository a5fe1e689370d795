//! Durable key-value persistence for client-local state.
//!
//! Holds the transaction-record collection and the per-asset deposit
//! address map. Both must survive a process reload, so every write goes
//! to disk synchronously (temp file + rename, never a partial file).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the local persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(String),
}

/// Durable string key-value store.
///
/// Implementations must guarantee read-after-write consistency within a
/// single client instance.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// File-backed store keeping the whole map in one JSON document.
///
/// A corrupt or absent file is treated as an empty map, never a fatal error.
pub struct JsonFileStore {
    path: PathBuf,
    map: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store, loading any existing content.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<HashMap<String, String>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt store file, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!(path = %path.display(), entries = map.len(), "Store opened");
        Self {
            path,
            map: RwLock::new(map),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        let text =
            serde_json::to_string_pretty(map).map_err(|e| StorageError::Serde(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.write();
        map.insert(key.to_string(), value.to_string());
        self.flush(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.map.write();
        if map.remove(key).is_some() {
            self.flush(&map)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.map.write().remove(key);
        Ok(())
    }
}
