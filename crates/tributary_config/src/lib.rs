//! Parsing and validation of `tributary.toml` configuration files.
//!
//! This crate reads the loader configuration and produces a strongly-typed
//! [`TributaryConfig`] describing the project, how to render it into a graph,
//! where it executes, which profile the external tool uses, and how caching
//! behaves.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_env_vars, resolve_project_path};
pub use types::*;
