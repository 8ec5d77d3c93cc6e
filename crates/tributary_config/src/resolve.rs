//! Resolution of values that can come from more than one configuration section.

use crate::error::ConfigError;
use crate::types::TributaryConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Resolves the project directory used for rendering.
///
/// Precedence is `render.project_path`, then `project.path`, then
/// `execution.project_path`. The result is made absolute against the
/// current directory.
pub fn resolve_project_path(config: &TributaryConfig) -> Result<PathBuf, ConfigError> {
    let path = config
        .render
        .project_path
        .as_ref()
        .or(config.project.path.as_ref())
        .or(config.execution.project_path.as_ref())
        .ok_or_else(|| {
            ConfigError::MissingField(
                "render.project_path, project.path or execution.project_path".to_string(),
            )
        })?;

    if path.is_absolute() {
        Ok(path.clone())
    } else {
        let cwd = std::env::current_dir().map_err(|e| ConfigError::io(".", e))?;
        Ok(cwd.join(path))
    }
}

/// Environment variables relevant to rendering.
///
/// `render.env` replaces `project.env` entirely when it is non-empty.
pub fn resolve_env_vars(config: &TributaryConfig) -> BTreeMap<String, String> {
    if config.render.env.is_empty() {
        config.project.env.clone()
    } else {
        config.render.env.clone()
    }
}
