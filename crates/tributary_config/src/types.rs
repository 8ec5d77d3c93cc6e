//! Configuration types deserialized from `tributary.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the directory created under the system temp dir when no cache
/// directory is configured.
pub const DEFAULT_CACHE_DIR_NAME: &str = "tributary";

/// The top-level loader configuration parsed from `tributary.toml`.
///
/// Every section is optional in the file; missing sections take their
/// defaults so that a configuration can be as small as a project path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TributaryConfig {
    /// Where the project lives and how it is laid out.
    #[serde(default)]
    pub project: ProjectSection,
    /// How the project is turned into a graph.
    #[serde(default)]
    pub render: RenderConfig,
    /// Where the project is executed once rendered.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Profile handed to the external tool. Direct invocation is impossible without one.
    #[serde(default)]
    pub profile: Option<ProfileConfig>,
    /// Listing cache and incremental-parse artifact settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

/// The `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Explicit project name. Defaults to the final component of `path`.
    #[serde(default)]
    pub name: Option<String>,
    /// Project directory containing `dbt_project.yml`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Pre-compiled manifest document.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    /// Models directory, relative to the project.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Seeds directory, relative to the project.
    #[serde(default = "default_seeds_dir")]
    pub seeds_dir: String,
    /// Snapshots directory, relative to the project.
    #[serde(default = "default_snapshots_dir")]
    pub snapshots_dir: String,
    /// Reuse the tool's incremental-parse artifact between runs.
    #[serde(default = "default_true")]
    pub partial_parse: bool,
    /// Environment variables used when rendering and executing.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Project variables passed to the tool as `--vars`.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            path: None,
            manifest_path: None,
            models_dir: default_models_dir(),
            seeds_dir: default_seeds_dir(),
            snapshots_dir: default_snapshots_dir(),
            partial_parse: true,
            env: BTreeMap::new(),
            vars: BTreeMap::new(),
        }
    }
}

impl ProjectSection {
    /// The project name: explicit `name`, else the stem of `path`, else empty.
    pub fn project_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.path
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns `true` if a manifest path is configured and the file exists.
    pub fn is_manifest_available(&self) -> bool {
        self.manifest_path.as_deref().is_some_and(Path::exists)
    }
}

/// Strategy used to obtain the project's node graph.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Manifest if present, else direct listing, else the custom parser.
    #[default]
    Automatic,
    /// Invoke the external tool's listing command (cache first).
    Ls,
    /// Use only a previously cached listing.
    LsCache,
    /// Parse a listing file produced ahead of time.
    LsFile,
    /// Parse a compiled manifest document.
    Manifest,
    /// Scan the project sources with the lightweight parser.
    Custom,
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadMode::Automatic => "automatic",
            LoadMode::Ls => "ls",
            LoadMode::LsCache => "ls_cache",
            LoadMode::LsFile => "ls_file",
            LoadMode::Manifest => "manifest",
            LoadMode::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// The `[render]` section: how the project is turned into a graph.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Loading strategy.
    #[serde(default)]
    pub load_method: LoadMode,
    /// Include expressions (e.g. `tag:nightly`).
    #[serde(default)]
    pub select: Vec<String>,
    /// Exclude expressions.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Named YAML selector; only honoured by the listing strategy.
    #[serde(default)]
    pub selector: Option<String>,
    /// Run the dependency install step before listing.
    #[serde(default = "default_true")]
    pub deps: bool,
    /// External tool executable used for rendering.
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Project directory used for rendering, overriding `project.path`.
    #[serde(default)]
    pub project_path: Option<PathBuf>,
    /// Pre-produced listing output, used by [`LoadMode::LsFile`].
    #[serde(default)]
    pub ls_path: Option<PathBuf>,
    /// Rendering-only environment variables. Take precedence over `project.env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Store variables whose value is folded into the cache version.
    #[serde(default)]
    pub vars_to_purge_cache: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            load_method: LoadMode::default(),
            select: Vec::new(),
            exclude: Vec::new(),
            selector: None,
            deps: true,
            executable: default_executable(),
            project_path: None,
            ls_path: None,
            env: BTreeMap::new(),
            vars_to_purge_cache: Vec::new(),
        }
    }
}

impl RenderConfig {
    /// Returns `true` if a listing file is configured and exists.
    pub fn is_ls_file_available(&self) -> bool {
        self.ls_path.as_deref().is_some_and(Path::exists)
    }
}

/// Where the rendered project runs.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// On the same host that renders the graph.
    #[default]
    Local,
    /// Inside a container image.
    Container,
    /// On a remote worker.
    Remote,
}

/// The `[execution]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionConfig {
    /// Where execution happens.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Project directory as seen at execution time.
    #[serde(default)]
    pub project_path: Option<PathBuf>,
    /// Fallback executable when the render executable cannot be found.
    #[serde(default)]
    pub executable: Option<String>,
}

/// The `[profile]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Profile name inside the profiles file.
    pub name: String,
    /// Target within the profile.
    pub target: String,
    /// Path to the profiles file.
    pub profiles_file: PathBuf,
}

impl ProfileConfig {
    /// Directory holding the profiles file, passed as `--profiles-dir`.
    pub fn profiles_dir(&self) -> PathBuf {
        self.profiles_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// The `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Global switch for every cache kind.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Switch for the listing-output cache.
    #[serde(default = "default_true")]
    pub ls: bool,
    /// Shared directory for incremental-parse artifacts.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Directory backing the file key-value store.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// JSON document of last execution times per entity.
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ls: true,
            dir: None,
            store_dir: None,
            history_file: None,
        }
    }
}

impl CacheSettings {
    /// The shared cache directory, defaulting to `<tmp>/tributary`.
    pub fn cache_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME))
    }
}

fn default_true() -> bool {
    true
}

fn default_models_dir() -> String {
    "models".to_string()
}

fn default_seeds_dir() -> String {
    "seeds".to_string()
}

fn default_snapshots_dir() -> String {
    "snapshots".to_string()
}

fn default_executable() -> String {
    "dbt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_name_from_path_stem() {
        let project = ProjectSection {
            path: Some(PathBuf::from("/srv/jaffle_shop")),
            ..Default::default()
        };
        assert_eq!(project.project_name(), "jaffle_shop");
    }

    #[test]
    fn explicit_project_name_wins() {
        let project = ProjectSection {
            name: Some("shop".to_string()),
            path: Some(PathBuf::from("/srv/jaffle_shop")),
            ..Default::default()
        };
        assert_eq!(project.project_name(), "shop");
    }

    #[test]
    fn manifest_unavailable_when_missing() {
        let project = ProjectSection {
            manifest_path: Some(PathBuf::from("/definitely/not/here/manifest.json")),
            ..Default::default()
        };
        assert!(!project.is_manifest_available());
        assert!(!ProjectSection::default().is_manifest_available());
    }

    #[test]
    fn profiles_dir_is_parent() {
        let profile = ProfileConfig {
            name: "default".to_string(),
            target: "dev".to_string(),
            profiles_file: PathBuf::from("/home/me/.dbt/profiles.yml"),
        };
        assert_eq!(profile.profiles_dir(), PathBuf::from("/home/me/.dbt"));
    }

    #[test]
    fn default_cache_dir_under_temp() {
        let settings = CacheSettings::default();
        assert!(settings.cache_dir().ends_with(DEFAULT_CACHE_DIR_NAME));
    }

    #[test]
    fn load_mode_display() {
        assert_eq!(LoadMode::LsCache.to_string(), "ls_cache");
        assert_eq!(LoadMode::Automatic.to_string(), "automatic");
    }
}
