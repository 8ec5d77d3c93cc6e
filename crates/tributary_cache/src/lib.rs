//! Listing cache and incremental-parse artifact management.
//!
//! This crate fingerprints a project directory plus the arguments that shape
//! the external tool's output, persists compressed listing snapshots in a
//! pluggable key-value store, sweeps snapshots whose consumers stopped
//! running, and shares the tool's incremental-parse artifact between a
//! durable cache directory and throwaway working directories.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod gc;
pub mod history;
pub mod identifier;
pub mod partial_parse;
pub mod snapshot;
pub mod store;

pub use cache::ListingCache;
pub use error::CacheError;
pub use fingerprint::{was_project_modified, Fingerprinter};
pub use gc::{delete_unused_cache, GcReport};
pub use history::{ExecutionHistory, FileHistory, MemoryHistory};
pub use identifier::{cache_dir_for, create_cache_key, CacheScope, CACHE_KEY_PREFIX};
pub use partial_parse::{
    partial_parse_path, ArtifactReconciler, MANIFEST_FILE_NAME, PARTIAL_PARSE_FILE_NAME,
    TARGET_DIR_NAME,
};
pub use snapshot::{load_snapshot, save_snapshot, CacheSnapshot};
pub use store::{FileStore, KeyValueStore, MemoryStore};
