//! High-level listing cache.
//!
//! `ListingCache` ties a cache scope, a key-value store and the global cache
//! switches together. The graph loader asks it for a payload matching the
//! current fingerprint and hands it fresh output after every real listing.

use serde_json::{Map, Value};

use crate::error::CacheError;
use crate::identifier::{create_cache_key, CacheScope};
use crate::snapshot::{load_snapshot, save_snapshot};
use crate::store::KeyValueStore;

/// Listing cache for one consumer of a graph.
pub struct ListingCache<'a> {
    store: &'a dyn KeyValueStore,
    identifier: String,
    metadata: Map<String, Value>,
    enabled: bool,
}

impl<'a> ListingCache<'a> {
    /// Creates a cache for `scope`.
    ///
    /// The cache is active only when caching is enabled globally, the
    /// listing cache is enabled, and the scope yields a non-empty identifier.
    pub fn new(
        store: &'a dyn KeyValueStore,
        scope: &CacheScope,
        caching_enabled: bool,
        listing_cache_enabled: bool,
    ) -> Self {
        let identifier = scope.identifier();
        let enabled = caching_enabled && listing_cache_enabled && !identifier.is_empty();
        Self {
            store,
            identifier,
            metadata: scope.metadata(),
            enabled,
        }
    }

    /// Whether reads and writes go to the store.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The scope identifier (also the cache subdirectory name).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The store key snapshots are written under.
    pub fn key(&self) -> String {
        create_cache_key(&self.identifier)
    }

    /// Returns the cached listing if one exists for `current_version`.
    pub fn load(&self, current_version: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let key = self.key();
        let Some(snapshot) = load_snapshot(self.store, &key) else {
            tracing::info!("listing cache miss for {key}: no stored snapshot");
            return None;
        };
        if snapshot.version != current_version {
            tracing::info!(
                "listing cache miss for {key}: stored version {} differs from {current_version}",
                snapshot.version
            );
            return None;
        }
        tracing::info!("listing cache hit for {key} (version {current_version})");
        Some(snapshot.payload)
    }

    /// Stores `raw_output` for `version`. Does nothing when the cache is disabled.
    pub fn save(&self, version: &str, raw_output: &str) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        let key = self.key();
        save_snapshot(self.store, &key, version, raw_output, &self.metadata)?;
        tracing::info!("stored listing cache {key}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn hit_after_save() {
        let store = MemoryStore::new();
        let cache = ListingCache::new(&store, &CacheScope::entity("nightly"), true, true);
        assert!(cache.is_enabled());
        assert_eq!(cache.load("v1"), None);

        cache.save("v1", "line1\nline2\n").unwrap();
        assert_eq!(cache.load("v1").as_deref(), Some("line1\nline2\n"));
    }

    #[test]
    fn version_change_is_miss() {
        let store = MemoryStore::new();
        let cache = ListingCache::new(&store, &CacheScope::entity("nightly"), true, true);
        cache.save("v1", "out").unwrap();
        assert_eq!(cache.load("v2"), None);
    }

    #[test]
    fn disabled_cache_never_touches_store() {
        let store = MemoryStore::new();
        for (global, ls, entity) in [(false, true, "a"), (true, false, "a"), (true, true, "")] {
            let cache = ListingCache::new(&store, &CacheScope::entity(entity), global, ls);
            assert!(!cache.is_enabled());
            cache.save("v1", "out").unwrap();
            assert_eq!(cache.load("v1"), None);
        }
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn key_and_metadata_follow_scope() {
        let store = MemoryStore::new();
        let scope = CacheScope::group("nightly", "marts.orders");
        let cache = ListingCache::new(&store, &scope, true, true);
        assert_eq!(cache.key(), "tributary_cache__nightly__marts__orders");
        cache.save("v1", "out").unwrap();
        let raw = store.get(&cache.key()).unwrap().unwrap();
        assert_eq!(raw["scope_type"], "group");
        assert_eq!(raw["entity_id"], "nightly");
    }
}
