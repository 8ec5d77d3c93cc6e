//! Project graph loading.
//!
//! Turns a dbt-style project into a map of [`Node`]s with dependency edges,
//! using one of several strategies: the tool's listing command (backed by
//! the listing cache), a pre-produced listing file, a compiled manifest, or
//! a lightweight scan of the project sources.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod project;
pub mod runner;
pub mod scanner;
pub mod selector;

pub use error::LoadError;
pub use loader::{update_node_dependency, GraphLoader, LoadOutcome};
pub use model::{Node, NodeMap, ResourceType};
pub use parser::{parse_definitions, parse_ls_output, parse_manifest, parse_manifest_str};
pub use project::{create_symlinks, has_non_empty_dependencies_file};
pub use runner::{resolve_executable, run_command, ProcessRunner, ToolOutput, ToolRunner};
pub use scanner::{ModelDefinition, ProjectScanner, SourceScanner};
pub use selector::{BasicSelector, NodeSelector};
