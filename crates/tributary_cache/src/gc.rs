//! Garbage collection of listing snapshots by execution-history age.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::error::CacheError;
use crate::history::ExecutionHistory;
use crate::identifier::{CACHE_KEY_PREFIX, META_ENTITY_ID};
use crate::store::KeyValueStore;

/// Outcome of a garbage-collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Number of cache keys examined.
    pub scanned: usize,
    /// Number of cache keys removed.
    pub deleted: usize,
    /// The removed keys, sorted.
    pub deleted_keys: Vec<String>,
}

/// Deletes every snapshot whose entity last ran strictly before `now - max_age`.
///
/// Keys are grouped by the `entity_id` stored in each record. Entities with
/// no recorded run are kept, as are records that carry no entity id or
/// cannot be read at all.
pub fn delete_unused_cache(
    store: &dyn KeyValueStore,
    history: &dyn ExecutionHistory,
    max_age: TimeDelta,
    now: DateTime<Utc>,
) -> Result<GcReport, CacheError> {
    let threshold = now - max_age;
    let mut report = GcReport::default();
    let mut by_entity: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for key in store.keys()? {
        if !key.starts_with(CACHE_KEY_PREFIX) {
            continue;
        }
        report.scanned += 1;
        let record = match store.get(&key) {
            Ok(record) => record,
            Err(e) => {
                tracing::info!("unable to read cache record {key}, skipping: {e}");
                continue;
            }
        };
        match record.and_then(entity_of) {
            Some(id) => by_entity.entry(id).or_default().push(key),
            None => tracing::debug!("cache record {key} has no {META_ENTITY_ID}, skipping"),
        }
    }

    for (entity_id, keys) in by_entity {
        let Some(last_run) = history.last_run(&entity_id)? else {
            continue;
        };
        if last_run >= threshold {
            continue;
        }
        for key in keys {
            tracing::info!("removing cache {key}: {entity_id} last ran at {last_run}");
            store.delete(&key)?;
            report.deleted_keys.push(key);
        }
    }

    report.deleted_keys.sort();
    report.deleted = report.deleted_keys.len();
    tracing::info!(
        "deleted {}/{} listing caches",
        report.deleted,
        report.scanned
    );
    Ok(report)
}

fn entity_of(record: Value) -> Option<String> {
    match record {
        Value::Object(mut fields) => match fields.remove(META_ENTITY_ID) {
            Some(Value::String(id)) if !id.is_empty() => Some(id),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::identifier::{create_cache_key, CacheScope};
    use crate::snapshot::save_snapshot;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn save(store: &MemoryStore, scope: &CacheScope) -> String {
        let key = create_cache_key(&scope.identifier());
        save_snapshot(store, &key, "v", "out", &scope.metadata()).unwrap();
        key
    }

    #[test]
    fn deletes_only_stale_entities() {
        let store = MemoryStore::new();
        let stale_a = save(&store, &CacheScope::entity("stale"));
        let stale_b = save(&store, &CacheScope::group("stale", "marts.orders"));
        let fresh = save(&store, &CacheScope::entity("fresh"));
        let never = save(&store, &CacheScope::entity("never_ran"));

        let mut history = MemoryHistory::new();
        history.record("stale", now() - TimeDelta::days(40));
        history.record("fresh", now() - TimeDelta::days(1));

        let report =
            delete_unused_cache(&store, &history, TimeDelta::days(30), now()).unwrap();

        assert_eq!(report.scanned, 4);
        assert_eq!(report.deleted, 2);
        let mut expected = vec![stale_a, stale_b];
        expected.sort();
        assert_eq!(report.deleted_keys, expected);
        assert!(store.get(&fresh).unwrap().is_some());
        assert!(store.get(&never).unwrap().is_some());
    }

    #[test]
    fn boundary_is_kept() {
        let store = MemoryStore::new();
        let key = save(&store, &CacheScope::entity("edge"));
        let mut history = MemoryHistory::new();
        history.record("edge", now() - TimeDelta::days(30));

        let report =
            delete_unused_cache(&store, &history, TimeDelta::days(30), now()).unwrap();
        assert_eq!(report.deleted, 0);
        assert!(store.get(&key).unwrap().is_some());
    }

    #[test]
    fn ignores_foreign_keys_and_records_without_entity() {
        let store = MemoryStore::new();
        store.set("unrelated", &json!({"entity_id": "stale"})).unwrap();
        store
            .set(&create_cache_key("anon"), &json!({"version": "v"}))
            .unwrap();
        store.set(&create_cache_key("text"), &json!("raw")).unwrap();

        let mut history = MemoryHistory::new();
        history.record("stale", now() - TimeDelta::days(365));

        let report = delete_unused_cache(&store, &history, TimeDelta::days(1), now()).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, 0);
        assert!(store.get("unrelated").unwrap().is_some());
    }

    #[test]
    fn unreadable_record_does_not_stop_the_sweep() {
        use crate::store::FileStore;

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let scope = CacheScope::entity("stale");
        let stale = create_cache_key(&scope.identifier());
        save_snapshot(&store, &stale, "v", "out", &scope.metadata()).unwrap();
        let torn = create_cache_key("half");
        std::fs::write(store.entry_path(&torn).unwrap(), "{\"version\": \"v\", \"pay").unwrap();

        let mut history = MemoryHistory::new();
        history.record("stale", now() - TimeDelta::days(90));

        let report =
            delete_unused_cache(&store, &history, TimeDelta::days(30), now()).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted_keys, vec![stale.clone()]);
        assert!(store.get(&stale).unwrap().is_none());
        assert!(store.entry_path(&torn).unwrap().exists());
    }

    #[test]
    fn empty_store() {
        let report = delete_unused_cache(
            &MemoryStore::new(),
            &MemoryHistory::new(),
            TimeDelta::days(1),
            now(),
        )
        .unwrap();
        assert_eq!(report, GcReport::default());
    }
}
