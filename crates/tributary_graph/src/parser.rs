//! Conversion of raw project descriptions into [`NodeMap`]s.
//!
//! Three inputs are understood: the tool's line-delimited JSON listing, the
//! compiled manifest document, and definitions from a [`ProjectScanner`].
//!
//! [`ProjectScanner`]: crate::scanner::ProjectScanner

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::LoadError;
use crate::model::{Node, NodeMap, ResourceType};
use crate::scanner::ModelDefinition;

#[derive(Debug, Default, Deserialize)]
struct DependsOn {
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    unique_id: String,
    resource_type: ResourceType,
    original_file_path: PathBuf,
    #[serde(default)]
    depends_on: DependsOn,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    config: Map<String, Value>,
}

/// Parses listing output, one JSON object per line.
///
/// Lines that are not JSON (log lines, banners) and JSON lines that do not
/// describe a node are skipped. File paths are joined onto `project_dir`.
pub fn parse_ls_output(project_dir: &Path, output: &str) -> NodeMap {
    let mut nodes = NodeMap::new();
    for line in output.lines() {
        let value: Value = match serde_json::from_str(line.trim()) {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!("skipped listing line: {line}");
                continue;
            }
        };
        let entry: ListingEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("skipped listing line ({e}): {line}");
                continue;
            }
        };
        let node = Node {
            file_path: project_dir.join(&entry.original_file_path),
            unique_id: entry.unique_id,
            resource_type: entry.resource_type,
            depends_on: distinct(entry.depends_on.nodes),
            tags: entry.tags,
            config: entry.config,
            has_test: false,
        };
        tracing::debug!(
            "parsed resource `{}` of type `{}`",
            node.unique_id,
            node.resource_type
        );
        nodes.insert(node.unique_id.clone(), node);
    }
    nodes
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    resource_type: ResourceType,
    original_file_path: PathBuf,
    depends_on: Option<DependsOn>,
    tags: Vec<String>,
    config: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    nodes: BTreeMap<String, ManifestEntry>,
    #[serde(default)]
    sources: BTreeMap<String, ManifestEntry>,
    #[serde(default)]
    exposures: BTreeMap<String, ManifestEntry>,
}

/// Reads the manifest at `manifest_path`; file paths are joined onto `project_dir`.
pub fn parse_manifest(manifest_path: &Path, project_dir: &Path) -> Result<NodeMap, LoadError> {
    let content =
        std::fs::read_to_string(manifest_path).map_err(|e| LoadError::io(manifest_path, e))?;
    parse_manifest_str(&content, project_dir).map_err(|reason| LoadError::Manifest {
        path: manifest_path.to_path_buf(),
        reason,
    })
}

/// Merges the manifest's `nodes`, `sources` and `exposures` into one map.
///
/// Entries under `nodes` must declare `depends_on`; sources and exposures
/// may omit it.
pub fn parse_manifest_str(content: &str, project_dir: &Path) -> Result<NodeMap, String> {
    let manifest: Manifest = serde_json::from_str(content).map_err(|e| e.to_string())?;
    if let Some((id, _)) = manifest.nodes.iter().find(|(_, e)| e.depends_on.is_none()) {
        return Err(format!("node `{id}` has no `depends_on`"));
    }

    let mut nodes = NodeMap::new();
    let entries = manifest
        .nodes
        .into_iter()
        .chain(manifest.sources)
        .chain(manifest.exposures);
    for (unique_id, entry) in entries {
        let node = Node {
            unique_id: unique_id.clone(),
            resource_type: entry.resource_type,
            depends_on: distinct(entry.depends_on.unwrap_or_default().nodes),
            file_path: project_dir.join(&entry.original_file_path),
            tags: entry.tags,
            config: entry.config,
            has_test: false,
        };
        nodes.insert(unique_id, node);
    }
    Ok(nodes)
}

/// Builds nodes from scanned definitions.
///
/// Unique ids are `<type>.<project_name>.<name>`. Upstream names resolve to
/// the definition of that name when there is one, otherwise to a model of
/// that name. Paths under `render_dir` are moved under `execution_dir`.
pub fn parse_definitions(
    definitions: &[ModelDefinition],
    project_name: &str,
    render_dir: &Path,
    execution_dir: &Path,
) -> NodeMap {
    let unique_id = |resource_type: ResourceType, name: &str| {
        format!("{resource_type}.{project_name}.{name}")
    };
    let mut by_name: BTreeMap<&str, String> = BTreeMap::new();
    for def in definitions {
        by_name
            .entry(def.name.as_str())
            .or_insert_with(|| unique_id(def.resource_type, &def.name));
    }

    let mut nodes = NodeMap::new();
    for def in definitions {
        let depends_on = distinct(def.upstream.iter().map(|name| {
            by_name
                .get(name.as_str())
                .cloned()
                .unwrap_or_else(|| unique_id(ResourceType::Model, name))
        }));
        let mut config = Map::new();
        for selector in &def.config_selectors {
            let key = selector.split(':').next().unwrap_or_default();
            let value = selector.rsplit(':').next().unwrap_or_default();
            config.insert(key.to_string(), Value::from(value));
        }
        let file_path = match def.path.strip_prefix(render_dir) {
            Ok(relative) => execution_dir.join(relative),
            Err(_) => def.path.clone(),
        };
        let node = Node {
            unique_id: unique_id(def.resource_type, &def.name),
            resource_type: def.resource_type,
            depends_on,
            file_path,
            tags: Vec::new(),
            config,
            has_test: false,
        };
        nodes.insert(node.unique_id.clone(), node);
    }
    nodes
}

/// Upstream ids with repeats dropped, first occurrence kept.
fn distinct(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
