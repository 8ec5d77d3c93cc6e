//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{LoadMode, TributaryConfig};
use std::path::{Path, PathBuf};

/// Default configuration file name looked up inside a directory.
pub const CONFIG_FILE: &str = "tributary.toml";

/// Loads and validates a configuration file.
///
/// `path` may be the file itself or a directory containing [`CONFIG_FILE`].
/// Relative paths inside the file are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<TributaryConfig, ConfigError> {
    let config_path = if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    };
    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| ConfigError::io(&config_path, e))?;
    let mut config = load_config_from_str(&content)?;
    if let Some(base) = config_path.parent() {
        rebase_paths(&mut config, base);
    }
    Ok(config)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies. Paths are kept as written.
pub fn load_config_from_str(content: &str) -> Result<TributaryConfig, ConfigError> {
    let config: TributaryConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and configuration values are consistent.
fn validate_config(config: &TributaryConfig) -> Result<(), ConfigError> {
    if let Some(profile) = &config.profile {
        if profile.name.is_empty() {
            return Err(ConfigError::MissingField("profile.name".to_string()));
        }
        if profile.target.is_empty() {
            return Err(ConfigError::MissingField("profile.target".to_string()));
        }
    }
    if config.render.load_method == LoadMode::LsFile && config.render.ls_path.is_none() {
        return Err(ConfigError::ValidationError(
            "render.load_method = \"ls_file\" requires render.ls_path".to_string(),
        ));
    }
    if config.render.executable.is_empty() {
        return Err(ConfigError::MissingField("render.executable".to_string()));
    }
    Ok(())
}

fn rebase(base: &Path, path: &mut Option<PathBuf>) {
    if let Some(p) = path {
        if p.is_relative() {
            *p = base.join(&*p);
        }
    }
}

/// Makes every relative path in the configuration relative to `base`.
fn rebase_paths(config: &mut TributaryConfig, base: &Path) {
    rebase(base, &mut config.project.path);
    rebase(base, &mut config.project.manifest_path);
    rebase(base, &mut config.render.project_path);
    rebase(base, &mut config.render.ls_path);
    rebase(base, &mut config.execution.project_path);
    rebase(base, &mut config.cache.dir);
    rebase(base, &mut config.cache.store_dir);
    rebase(base, &mut config.cache.history_file);
    if let Some(profile) = &mut config.profile {
        if profile.profiles_file.is_relative() {
            profile.profiles_file = base.join(&profile.profiles_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionMode;

    #[test]
    fn parse_empty_config() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.render.load_method, LoadMode::Automatic);
        assert!(config.profile.is_none());
        assert!(config.cache.enabled);
        assert!(config.cache.ls);
        assert!(config.project.partial_parse);
        assert_eq!(config.project.models_dir, "models");
        assert_eq!(config.render.executable, "dbt");
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[project]
name = "jaffle_shop"
path = "/srv/jaffle_shop"
manifest_path = "/srv/jaffle_shop/target/manifest.json"
partial_parse = false
env = { DBT_ENV = "ci" }
vars = { start_date = "2024-01-01", limit = 10 }

[render]
load_method = "ls"
select = ["tag:nightly"]
exclude = ["path:models/legacy"]
selector = "daily"
deps = false
executable = "/opt/venv/bin/dbt"
vars_to_purge_cache = ["release_tag"]

[execution]
mode = "container"
project_path = "/app/jaffle_shop"
executable = "dbt"

[profile]
name = "jaffle"
target = "dev"
profiles_file = "/srv/profiles/profiles.yml"

[cache]
enabled = true
ls = false
dir = "/var/cache/tributary"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.project_name(), "jaffle_shop");
        assert!(!config.project.partial_parse);
        assert_eq!(config.project.env["DBT_ENV"], "ci");
        assert_eq!(config.project.vars["limit"], serde_json::json!(10));
        assert_eq!(config.render.load_method, LoadMode::Ls);
        assert_eq!(config.render.select, vec!["tag:nightly"]);
        assert_eq!(config.render.selector.as_deref(), Some("daily"));
        assert!(!config.render.deps);
        assert_eq!(config.execution.mode, ExecutionMode::Container);
        assert_eq!(config.profile.as_ref().unwrap().target, "dev");
        assert!(!config.cache.ls);
        assert_eq!(
            config.cache.cache_dir(),
            PathBuf::from("/var/cache/tributary")
        );
    }

    #[test]
    fn empty_profile_name_errors() {
        let toml = r#"
[profile]
name = ""
target = "dev"
profiles_file = "profiles.yml"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn ls_file_without_path_errors() {
        let toml = r#"
[render]
load_method = "ls_file"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn unknown_load_method_errors() {
        let toml = r#"
[render]
load_method = "telepathy"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn load_from_directory_rebases_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[project]
path = "project"

[profile]
name = "p"
target = "t"
profiles_file = "profiles/profiles.yml"
"#,
        )
        .unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.project.path, Some(dir.path().join("project")));
        assert_eq!(
            config.profile.unwrap().profiles_file,
            dir.path().join("profiles/profiles.yml")
        );
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
