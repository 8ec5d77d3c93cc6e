//! Error types for graph loading.

use std::path::PathBuf;

use tributary_cache::CacheError;
use tributary_config::ConfigError;

/// Errors that can occur while loading a project graph.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The configuration does not allow the requested strategy to run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Neither the configured executable nor its fallback could be found.
    #[error("unable to find the executable `{0}`")]
    ExecutableNotFound(String),

    /// The external tool exited unsuccessfully or reported an error.
    #[error("unable to run `{command}` due to the error:\n{details}")]
    ExternalTool {
        /// The command line that failed.
        command: String,
        /// The tool's stderr, or stdout when stderr was empty.
        details: String,
    },

    /// The listing failed because package dependencies are not installed.
    ///
    /// A narrower [`LoadError::ExternalTool`]: it carries the same command and output.
    #[error(
        "unable to run `{command}` due to missing package dependencies; enable `render.deps`:\n{details}"
    )]
    MissingDependency {
        /// The command line that failed.
        command: String,
        /// The tool's stdout, followed by stderr when there was any.
        details: String,
    },

    /// The strategy cannot honor the given configuration combination.
    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    /// The manifest document is malformed.
    #[error("invalid manifest {path}: {reason}")]
    Manifest {
        /// The manifest file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An I/O error outside the cache subsystem.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A cache write failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigError> for LoadError {
    fn from(err: ConfigError) -> Self {
        LoadError::Configuration(err.to_string())
    }
}
