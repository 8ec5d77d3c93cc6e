//! Strategy selection and orchestration of graph loading.
//!
//! [`GraphLoader::load`] picks a strategy from [`LoadMode`], obtains the full
//! node set and its filtered subset, then marks nodes that have tests. The
//! listing strategy consults the listing cache first and, on a miss, runs
//! the external tool inside a throwaway copy of the project made of
//! symlinks, priming and harvesting the incremental-parse artifact around
//! the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tributary_cache::{
    cache_dir_for, ArtifactReconciler, CacheScope, Fingerprinter, KeyValueStore, ListingCache,
    TARGET_DIR_NAME,
};
use tributary_config::{
    resolve_env_vars, resolve_project_path, ExecutionMode, LoadMode, TributaryConfig,
};

use crate::error::LoadError;
use crate::model::{NodeMap, ResourceType};
use crate::parser::{parse_definitions, parse_ls_output, parse_manifest};
use crate::project::{create_symlinks, has_non_empty_dependencies_file, LOG_DIR_NAME};
use crate::runner::{resolve_executable, run_command, ProcessRunner, ToolRunner};
use crate::scanner::{ProjectScanner, SourceScanner};
use crate::selector::{BasicSelector, NodeSelector};

/// Environment variable naming the tool's log directory.
pub const LOG_PATH_ENV: &str = "DBT_LOG_PATH";

/// Environment variable naming the tool's output directory.
pub const TARGET_PATH_ENV: &str = "DBT_TARGET_PATH";

/// Log file the tool writes inside its log directory.
pub const LOG_FILE_NAME: &str = "dbt.log";

/// A loaded graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    /// Every node of the project.
    pub nodes: NodeMap,
    /// The nodes left after selection, plus tests attached to them.
    pub filtered_nodes: NodeMap,
    /// The strategy that actually produced the graph.
    pub load_method: LoadMode,
}

impl LoadOutcome {
    fn unfiltered(nodes: NodeMap, load_method: LoadMode) -> Self {
        Self {
            filtered_nodes: nodes.clone(),
            nodes,
            load_method,
        }
    }

    fn empty(load_method: LoadMode) -> Self {
        Self::unfiltered(NodeMap::new(), load_method)
    }
}

/// Marks every filtered node that a test depends on, and adds those tests
/// to the filtered set.
pub fn update_node_dependency(outcome: &mut LoadOutcome) {
    let tests: Vec<_> = outcome
        .nodes
        .values()
        .filter(|n| n.resource_type == ResourceType::Test)
        .cloned()
        .collect();
    for test in tests {
        for dep in &test.depends_on {
            match outcome.filtered_nodes.get_mut(dep) {
                Some(node) => node.has_test = true,
                None => continue,
            }
            if let Some(node) = outcome.nodes.get_mut(dep) {
                node.has_test = true;
            }
            outcome
                .filtered_nodes
                .insert(test.unique_id.clone(), test.clone());
        }
    }
}

/// Loads a project graph according to a [`TributaryConfig`].
pub struct GraphLoader<'a> {
    config: &'a TributaryConfig,
    store: &'a dyn KeyValueStore,
    scope: CacheScope,
    runner: Box<dyn ToolRunner + 'a>,
    selector: Box<dyn NodeSelector + 'a>,
    scanner: Option<Box<dyn ProjectScanner + 'a>>,
}

impl<'a> GraphLoader<'a> {
    /// Loader using child processes, [`BasicSelector`] and [`SourceScanner`].
    ///
    /// Without a scope (see [`with_scope`](Self::with_scope)) the listing
    /// cache stays disabled.
    pub fn new(config: &'a TributaryConfig, store: &'a dyn KeyValueStore) -> Self {
        Self {
            config,
            store,
            scope: CacheScope::entity(""),
            runner: Box::new(ProcessRunner),
            selector: Box::new(BasicSelector),
            scanner: None,
        }
    }

    /// Sets the consumer the listing cache is keyed by.
    pub fn with_scope(mut self, scope: CacheScope) -> Self {
        self.scope = scope;
        self
    }

    /// Replaces the tool runner.
    pub fn with_runner(mut self, runner: impl ToolRunner + 'a) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// Replaces the selector used by the manifest and custom strategies.
    pub fn with_selector(mut self, selector: impl NodeSelector + 'a) -> Self {
        self.selector = Box::new(selector);
        self
    }

    /// Replaces the scanner used by the custom strategy.
    pub fn with_scanner(mut self, scanner: impl ProjectScanner + 'a) -> Self {
        self.scanner = Some(Box::new(scanner));
        self
    }

    /// Loads the graph with `method` and propagates test markers.
    pub fn load(&self, method: LoadMode) -> Result<LoadOutcome, LoadError> {
        let mut outcome = match method {
            LoadMode::Automatic => self.load_automatic()?,
            LoadMode::Ls => self.load_via_ls()?,
            LoadMode::LsCache => match self.load_via_ls_cache()? {
                Some(outcome) => outcome,
                None => LoadOutcome::empty(LoadMode::LsCache),
            },
            LoadMode::LsFile => self.load_via_ls_file()?,
            LoadMode::Manifest => self.load_from_manifest()?,
            LoadMode::Custom => self.load_via_custom()?,
        };
        update_node_dependency(&mut outcome);

        tracing::info!("total nodes: {}", outcome.nodes.len());
        tracing::info!("total filtered nodes: {}", outcome.filtered_nodes.len());
        Ok(outcome)
    }

    fn load_automatic(&self) -> Result<LoadOutcome, LoadError> {
        if self.config.project.is_manifest_available() {
            return self.load_from_manifest();
        }
        if self.config.execution.mode == ExecutionMode::Local && self.config.profile.is_some() {
            return match self.load_via_ls() {
                Err(LoadError::ExecutableNotFound(exe)) => {
                    tracing::info!("unable to find `{exe}`, falling back to the custom parser");
                    self.load_via_custom()
                }
                other => other,
            };
        }
        self.load_via_custom()
    }

    /// Flags passed to the listing command; they also shape the cache key.
    pub fn listing_args(&self) -> Vec<String> {
        let render = &self.config.render;
        let mut args = Vec::new();
        if !render.exclude.is_empty() {
            args.push("--exclude".to_string());
            args.extend(render.exclude.iter().cloned());
        }
        if !render.select.is_empty() {
            args.push("--select".to_string());
            args.extend(render.select.iter().cloned());
        }
        if !self.config.project.vars.is_empty() {
            args.push("--vars".to_string());
            args.push(serde_json::to_string(&self.config.project.vars).unwrap_or_default());
        }
        if let Some(selector) = &render.selector {
            args.push("--selector".to_string());
            args.push(selector.clone());
        }
        if !self.config.project.partial_parse {
            args.push("--no-partial-parse".to_string());
        }
        args
    }

    /// Everything that must invalidate a cached listing when it changes.
    ///
    /// The listing flags, the configured environment and the store values
    /// of each purge variable.
    pub fn cache_key_args(&self) -> Vec<String> {
        let mut args = self.listing_args();
        let env = resolve_env_vars(self.config);
        if !env.is_empty() {
            args.push(serde_json::to_string(&env).unwrap_or_default());
        }
        for name in &self.config.render.vars_to_purge_cache {
            args.push(name.clone());
            args.push(self.store.get_text(name).unwrap_or_default());
        }
        tracing::debug!("cache key arguments for <{}>: {args:?}", self.scope.identifier());
        args
    }

    fn listing_cache(&self) -> ListingCache<'_> {
        ListingCache::new(
            self.store,
            &self.scope,
            self.config.cache.enabled,
            self.config.cache.ls,
        )
    }

    /// Shared artifact directory for this scope, when caching is on.
    fn shared_cache_dir(&self) -> Result<Option<PathBuf>, LoadError> {
        let identifier = self.scope.identifier();
        if !self.config.cache.enabled || identifier.is_empty() {
            return Ok(None);
        }
        Ok(Some(cache_dir_for(&self.config.cache.cache_dir(), &identifier)?))
    }

    fn current_version(&self, cache: &ListingCache<'_>, project_dir: &Path) -> Result<String, LoadError> {
        Ok(Fingerprinter::fingerprint(
            &cache.key(),
            project_dir,
            &self.cache_key_args(),
        )?)
    }

    fn render_project_dir(&self) -> Option<&Path> {
        self.config
            .render
            .project_path
            .as_deref()
            .or(self.config.project.path.as_deref())
    }

    fn execution_project_dir(&self) -> Option<&Path> {
        self.config
            .execution
            .project_path
            .as_deref()
            .or(self.config.project.path.as_deref())
    }

    fn load_via_ls(&self) -> Result<LoadOutcome, LoadError> {
        match self.load_via_ls_cache()? {
            Some(outcome) => Ok(outcome),
            None => self.load_via_ls_without_cache(),
        }
    }

    fn load_via_ls_cache(&self) -> Result<Option<LoadOutcome>, LoadError> {
        let cache = self.listing_cache();
        tracing::info!("trying to parse the project using listing cache {}", cache.key());
        if !cache.is_enabled() {
            tracing::info!("listing cache miss for {} - skipped", cache.key());
            return Ok(None);
        }
        let project_dir = resolve_project_path(self.config)?;
        let version = self.current_version(&cache, &project_dir)?;
        let Some(output) = cache.load(&version) else {
            return Ok(None);
        };
        tracing::info!(
            "listing cache size for {} is {} bytes",
            cache.key(),
            output.len()
        );
        let nodes = parse_ls_output(&project_dir, &output);
        Ok(Some(LoadOutcome::unfiltered(nodes, LoadMode::LsCache)))
    }

    fn load_via_ls_without_cache(&self) -> Result<LoadOutcome, LoadError> {
        let render = &self.config.render;
        let executable = resolve_executable(
            self.runner.as_ref(),
            &render.executable,
            self.config.execution.executable.as_deref(),
        )?
        .to_string_lossy()
        .into_owned();

        let project_dir = resolve_project_path(self.config)?;
        tracing::info!(
            "trying to parse the project in `{}` using the listing command",
            project_dir.display()
        );
        let profile = self.config.profile.as_ref().ok_or_else(|| {
            LoadError::Configuration(
                "unable to load the project via listing without a profile".to_string(),
            )
        })?;

        let working = tempfile::TempDir::new().map_err(|e| LoadError::io(std::env::temp_dir(), e))?;
        let work_dir = working.path();
        create_symlinks(&project_dir, work_dir, render.deps)?;

        let shared_dir = if self.config.project.partial_parse {
            self.shared_cache_dir()?
        } else {
            None
        };
        if let Some(shared) = &shared_dir {
            let latest = ArtifactReconciler::pull(&project_dir, shared);
            tracing::info!(
                "partial parse is enabled and the latest partial parse file is {latest:?}"
            );
            if let Some(artifact) = latest {
                ArtifactReconciler::stage(&artifact, work_dir)?;
            }
        }

        let configured_env = resolve_env_vars(self.config);
        let log_dir = configured_env
            .get(LOG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join(LOG_DIR_NAME));
        let target_dir = configured_env
            .get(TARGET_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join(TARGET_DIR_NAME));
        let mut env: BTreeMap<String, String> = std::env::vars().collect();
        env.extend(configured_env);
        env.insert(LOG_PATH_ENV.to_string(), log_dir.to_string_lossy().into_owned());
        env.insert(TARGET_PATH_ENV.to_string(), target_dir.to_string_lossy().into_owned());

        let local_flags = vec![
            "--project-dir".to_string(),
            work_dir.to_string_lossy().into_owned(),
            "--profiles-dir".to_string(),
            profile.profiles_dir().to_string_lossy().into_owned(),
            "--profile".to_string(),
            profile.name.clone(),
            "--target".to_string(),
            profile.target.clone(),
        ];

        if render.deps && has_non_empty_dependencies_file(&project_dir) {
            let mut deps = vec![executable.clone(), "deps".to_string()];
            deps.extend(local_flags.iter().cloned());
            let stdout = run_command(self.runner.as_ref(), &deps, work_dir, &env)?;
            tracing::debug!("deps output: {stdout}");
        }

        let mut ls = vec![
            executable,
            "ls".to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        ls.extend(local_flags);
        ls.extend(self.listing_args());
        let stdout = run_command(self.runner.as_ref(), &ls, work_dir, &env)?;
        tracing::debug!("listing output: {stdout}");
        echo_tool_log(&log_dir);

        let cache = self.listing_cache();
        if cache.is_enabled() {
            let version = self.current_version(&cache, &project_dir)?;
            cache.save(&version, &stdout)?;
        }

        let nodes = parse_ls_output(&project_dir, &stdout);

        if let Some(shared) = &shared_dir {
            ArtifactReconciler::harvest(work_dir, shared)?;
        }
        Ok(LoadOutcome::unfiltered(nodes, LoadMode::Ls))
    }

    fn load_via_ls_file(&self) -> Result<LoadOutcome, LoadError> {
        let render = &self.config.render;
        tracing::info!(
            "trying to parse the project `{}` using a listing file",
            self.config.project.project_name()
        );
        let ls_path = match &render.ls_path {
            Some(path) if render.is_ls_file_available() => path,
            other => {
                return Err(LoadError::Configuration(format!(
                    "unable to load listing file using {other:?}"
                )))
            }
        };
        let project_dir = self.render_project_dir().ok_or_else(|| {
            LoadError::Configuration(
                "unable to load a listing file without a render project path".to_string(),
            )
        })?;
        let output = std::fs::read_to_string(ls_path).map_err(|e| LoadError::io(ls_path, e))?;
        let nodes = parse_ls_output(project_dir, &output);
        Ok(LoadOutcome::unfiltered(nodes, LoadMode::LsFile))
    }

    fn load_via_custom(&self) -> Result<LoadOutcome, LoadError> {
        tracing::info!(
            "trying to parse the project `{}` using the custom parser",
            self.config.project.project_name()
        );
        if self.config.render.selector.is_some() {
            return Err(LoadError::UnsupportedCombination(
                "render.selector is not supported by the custom parser".to_string(),
            ));
        }
        let (Some(render_dir), Some(execution_dir)) =
            (self.render_project_dir(), self.execution_project_dir())
        else {
            return Err(LoadError::Configuration(
                "unable to load the project without render and execution project paths"
                    .to_string(),
            ));
        };

        let definitions = match &self.scanner {
            Some(scanner) => scanner.scan()?,
            None => {
                let project = &self.config.project;
                SourceScanner::new(
                    render_dir,
                    &project.models_dir,
                    &project.snapshots_dir,
                    &project.seeds_dir,
                )
                .scan()?
            }
        };

        let mut project_name = self.config.project.project_name();
        if project_name.is_empty() {
            project_name = render_dir
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        let nodes = parse_definitions(&definitions, &project_name, render_dir, execution_dir);
        let filtered_nodes = self.select(execution_dir, &nodes);
        Ok(LoadOutcome {
            nodes,
            filtered_nodes,
            load_method: LoadMode::Custom,
        })
    }

    fn load_from_manifest(&self) -> Result<LoadOutcome, LoadError> {
        let project = &self.config.project;
        tracing::info!(
            "trying to parse the project `{}` using a manifest",
            project.project_name()
        );
        if self.config.render.selector.is_some() {
            return Err(LoadError::UnsupportedCombination(
                "render.selector is not supported by the manifest parser".to_string(),
            ));
        }
        let manifest_path = match &project.manifest_path {
            Some(path) if project.is_manifest_available() => path,
            other => {
                return Err(LoadError::Configuration(format!(
                    "unable to load manifest using {other:?}"
                )))
            }
        };
        let execution_dir = self.execution_project_dir().ok_or_else(|| {
            LoadError::Configuration(
                "unable to load manifest without an execution project path".to_string(),
            )
        })?;

        let nodes = parse_manifest(manifest_path, execution_dir)?;
        let filtered_nodes = self.select(execution_dir, &nodes);
        Ok(LoadOutcome {
            nodes,
            filtered_nodes,
            load_method: LoadMode::Manifest,
        })
    }

    fn select(&self, project_dir: &Path, nodes: &NodeMap) -> NodeMap {
        let render = &self.config.render;
        self.selector
            .select(project_dir, nodes, &render.select, &render.exclude)
    }
}

/// Echoes the tool's log file at debug level, if it exists.
fn echo_tool_log(log_dir: &Path) {
    let path = log_dir.join(LOG_FILE_NAME);
    tracing::debug!("tool logs available in: {}", path.display());
    if let Ok(content) = std::fs::read_to_string(&path) {
        for line in content.lines() {
            tracing::debug!("{}", line.trim());
        }
    }
}
