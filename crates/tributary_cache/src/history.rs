//! Execution-history port consulted by cache garbage collection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::CacheError;

/// Answers "when did entity X last run?".
pub trait ExecutionHistory {
    /// Time of the most recent run of `entity_id`, or `None` if it never ran.
    fn last_run(&self, entity_id: &str) -> Result<Option<DateTime<Utc>>, CacheError>;
}

/// Fixed history held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    runs: BTreeMap<String, DateTime<Utc>>,
}

impl MemoryHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a run, keeping only the most recent timestamp per entity.
    pub fn record(&mut self, entity_id: &str, at: DateTime<Utc>) {
        let slot = self.runs.entry(entity_id.to_string()).or_insert(at);
        if at > *slot {
            *slot = at;
        }
    }
}

impl ExecutionHistory for MemoryHistory {
    fn last_run(&self, entity_id: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self.runs.get(entity_id).copied())
    }
}

/// History read from a JSON document mapping entity id to an RFC 3339 timestamp.
///
/// ```json
/// { "nightly_orders": "2024-05-01T02:00:00Z" }
/// ```
///
/// The document is re-read on every lookup so that a long-running process
/// sees runs recorded by other processes.
#[derive(Debug, Clone)]
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    /// Uses the document at `path`. A missing file reads as an empty history.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, DateTime<Utc>>, CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(CacheError::io(&self.path, e)),
        };
        serde_json::from_str(&content).map_err(|e| CacheError::Store {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl ExecutionHistory for FileHistory {
    fn last_run(&self, entity_id: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self.read()?.get(entity_id).copied())
    }
}
