//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Most cache reads are fail-safe: errors result in cache misses rather than
/// hard failures. This enum is used for propagation within the cache
/// subsystem and for the writes that callers must hear about.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization, compression or encoding step failed.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The incremental-parse artifact could not be decoded.
    #[error("corrupt artifact {path}: {reason}")]
    CorruptArtifact {
        /// The artifact file path.
        path: PathBuf,
        /// Description of the decode failure.
        reason: String,
    },

    /// The key-value or execution-history store rejected an operation.
    #[error("store error for '{key}': {reason}")]
    Store {
        /// The key being read or written.
        key: String,
        /// Description of the failure.
        reason: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
