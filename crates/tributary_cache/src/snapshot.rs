//! Compressed listing snapshots stored in a [`KeyValueStore`].
//!
//! Each record is a JSON object:
//!
//! ```json
//! {
//!   "version": "<dir digest>,<args digest>",
//!   "payload": "<base64(zlib(listing output))>",
//!   "last_modified": "2024-05-01T02:00:00Z",
//!   "scope_type": "graph", "entity_id": "nightly", "group_id": null
//! }
//! ```

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CacheError;
use crate::store::KeyValueStore;

/// A decoded listing snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    /// Fingerprint of the project and arguments the listing was produced from.
    pub version: String,
    /// The raw listing output, decompressed.
    pub payload: String,
    /// When the snapshot was written.
    pub last_modified: DateTime<Utc>,
    /// Caller metadata stored next to the snapshot fields.
    pub metadata: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    version: String,
    payload: String,
    last_modified: DateTime<Utc>,
    #[serde(flatten)]
    metadata: Map<String, Value>,
}

fn compress(text: &str) -> Result<String, CacheError> {
    let to_err = |e: std::io::Error| CacheError::Serialization {
        reason: format!("zlib compression failed: {e}"),
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).map_err(to_err)?;
    let bytes = encoder.finish().map_err(to_err)?;
    Ok(STANDARD.encode(bytes))
}

fn decompress(encoded: &str) -> Result<String, CacheError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CacheError::Serialization {
            reason: format!("invalid base64 payload: {e}"),
        })?;
    let mut text = String::new();
    ZlibDecoder::new(bytes.as_slice())
        .read_to_string(&mut text)
        .map_err(|e| CacheError::Serialization {
            reason: format!("zlib decompression failed: {e}"),
        })?;
    Ok(text)
}

/// Compresses `raw_output` and writes it under `key`, replacing any earlier record.
///
/// Metadata keys that collide with the snapshot fields are dropped.
pub fn save_snapshot(
    store: &dyn KeyValueStore,
    key: &str,
    version: &str,
    raw_output: &str,
    metadata: &Map<String, Value>,
) -> Result<(), CacheError> {
    let mut metadata = metadata.clone();
    for reserved in ["version", "payload", "last_modified"] {
        metadata.remove(reserved);
    }
    let record = StoredRecord {
        version: version.to_string(),
        payload: compress(raw_output)?,
        last_modified: Utc::now(),
        metadata,
    };
    let value = serde_json::to_value(&record).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    store.set(key, &value)
}

/// Reads and decodes the snapshot under `key`.
///
/// Absent keys, unreadable records and undecodable payloads are all misses.
pub fn load_snapshot(store: &dyn KeyValueStore, key: &str) -> Option<CacheSnapshot> {
    let value = match store.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => return None,
        Err(e) => {
            tracing::info!("unable to read cache {key}: {e}");
            return None;
        }
    };
    let record: StoredRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => {
            tracing::info!("unable to parse cache record {key}: {e}");
            return None;
        }
    };
    match decompress(&record.payload) {
        Ok(payload) => Some(CacheSnapshot {
            version: record.version,
            payload,
            last_modified: record.last_modified,
            metadata: record.metadata,
        }),
        Err(e) => {
            tracing::info!("unable to decode cache payload {key}: {e}");
            None
        }
    }
}
