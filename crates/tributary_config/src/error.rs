//! Error types for configuration loading and validation.

use std::path::PathBuf;

/// Errors raised while reading, validating or resolving a `tributary.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file, or a directory it names, could not be read.
    #[error("cannot read {}: {source}", path.display())]
    IoError {
        /// The path being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A required setting is absent. Holds the dotted key, or the keys any one of which would do.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Settings that are present but contradict each other.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }
}
