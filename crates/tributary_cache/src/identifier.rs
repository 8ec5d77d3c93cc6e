//! Cache identifiers, store keys and per-identifier cache directories.
//!
//! A cache is identified by where its graph is consumed (a top-level
//! scheduling entity, optionally narrowed to a nested group), not by the
//! project path: two consumers of the same project must not share a working
//! cache directory.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::CacheError;
use crate::partial_parse::TARGET_DIR_NAME;

/// Prefix of every listing-cache key in the key-value store.
pub const CACHE_KEY_PREFIX: &str = "tributary_cache__";

/// Separator between identifier components.
const SCOPE_SEPARATOR: &str = "__";

/// Metadata field naming the kind of consumer.
pub const META_SCOPE_TYPE: &str = "scope_type";
/// Metadata field holding the scheduling entity id. Garbage collection groups by it.
pub const META_ENTITY_ID: &str = "entity_id";
/// Metadata field holding the nested group id, if any.
pub const META_GROUP_ID: &str = "group_id";

/// The logical consumer of a loaded graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheScope {
    /// Top-level scheduling entity.
    pub entity_id: String,
    /// Nested group inside the entity, if the graph renders only a part of it.
    pub group_id: Option<String>,
}

impl CacheScope {
    /// Scope for a whole entity.
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            group_id: None,
        }
    }

    /// Scope for a group nested inside an entity.
    pub fn group(entity_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            group_id: Some(group_id.into()),
        }
    }

    /// Identifier used as key suffix and cache subdirectory name.
    ///
    /// Dots in the group id (nested groups) become `__`.
    pub fn identifier(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.entity_id.is_empty() {
            parts.push(self.entity_id.clone());
        }
        if let Some(group) = self.group_id.as_deref().filter(|g| !g.is_empty()) {
            parts.push(group.replace('.', SCOPE_SEPARATOR));
        }
        parts.join(SCOPE_SEPARATOR)
    }

    /// Metadata stored alongside every snapshot written for this scope.
    pub fn metadata(&self) -> Map<String, Value> {
        let scope_type = if self.group_id.is_some() { "group" } else { "graph" };
        let mut meta = Map::new();
        meta.insert(META_SCOPE_TYPE.to_string(), Value::from(scope_type));
        meta.insert(META_ENTITY_ID.to_string(), Value::from(self.entity_id.clone()));
        meta.insert(
            META_GROUP_ID.to_string(),
            self.group_id.clone().map_or(Value::Null, Value::from),
        );
        meta
    }
}

/// Store key for a cache identifier.
pub fn create_cache_key(identifier: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{identifier}")
}

/// Returns `<base_dir>/<identifier>`, creating its `target` subdirectory.
pub fn cache_dir_for(base_dir: &Path, identifier: &str) -> Result<PathBuf, CacheError> {
    let dir = base_dir.join(identifier);
    let target = dir.join(TARGET_DIR_NAME);
    std::fs::create_dir_all(&target).map_err(|e| CacheError::io(target, e))?;
    Ok(dir)
}
