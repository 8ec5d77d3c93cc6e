//! Key-value store port used to persist listing snapshots.
//!
//! The loader only needs get/set/delete/list over string keys with JSON
//! values. [`MemoryStore`] backs tests and single-process use;
//! [`FileStore`] keeps one JSON document per key in a directory so several
//! processes on a shared filesystem see the same cache. Writers race freely:
//! the last `set` for a key wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::CacheError;

/// Extension of the per-key documents written by [`FileStore`].
const ENTRY_EXT: &str = "json";

/// Durable string-keyed JSON store.
pub trait KeyValueStore {
    /// Returns the value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &Value) -> Result<(), CacheError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Lists every key currently stored.
    fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Reads `key` as text: strings verbatim, other JSON values serialized,
    /// absent keys and read failures as `None`.
    fn get_text(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Ok(Some(Value::String(s))) => Some(s),
            Ok(Some(other)) => Some(other.to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("unable to read store key {key}: {e}");
                None
            }
        }
    }
}

/// In-process store backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>, CacheError> {
        self.entries.lock().map_err(|e| CacheError::Store {
            key: String::new(),
            reason: e.to_string(),
        })
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.lock()?.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// Store keeping each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Path of the document holding `key`.
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(CacheError::Store {
                key: key.to_string(),
                reason: "key cannot be used as a file name".to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.{ENTRY_EXT}")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.entry_path(key)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::Store {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        let json = serde_json::to_string(value).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::io(path, e))
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CacheError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
