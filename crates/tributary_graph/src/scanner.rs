//! Lightweight source scan used by the custom strategy.
//!
//! The scan reads files directly instead of invoking the external tool, so
//! it only understands `ref(...)` and `config(...)` calls written with
//! literal arguments. Anything rendered dynamically is invisible to it.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::LoadError;
use crate::model::ResourceType;

/// Directory holding singular tests.
pub const TESTS_DIR: &str = "tests";

/// A resource found by a [`ProjectScanner`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    /// Resource name, unique within its type.
    pub name: String,
    /// Kind of resource.
    pub resource_type: ResourceType,
    /// Defining file.
    pub path: PathBuf,
    /// Names referenced through `ref(...)`, in order of first use.
    pub upstream: Vec<String>,
    /// `key:value` pairs taken from `config(...)`.
    pub config_selectors: Vec<String>,
}

/// Source of raw definitions for the custom strategy.
pub trait ProjectScanner {
    /// Returns every definition in the project.
    fn scan(&self) -> Result<Vec<ModelDefinition>, LoadError>;
}

/// Scans the models, snapshots, seeds and tests directories of a project.
#[derive(Debug, Clone)]
pub struct SourceScanner {
    root: PathBuf,
    models_dir: String,
    snapshots_dir: String,
    seeds_dir: String,
}

impl SourceScanner {
    /// Scanner over `root` with the given directory names.
    pub fn new(root: &Path, models_dir: &str, snapshots_dir: &str, seeds_dir: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            models_dir: models_dir.to_string(),
            snapshots_dir: snapshots_dir.to_string(),
            seeds_dir: seeds_dir.to_string(),
        }
    }

    fn files_with_ext(&self, dir: &str, ext: &str) -> Result<Vec<PathBuf>, LoadError> {
        let dir = self.root.join(dir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&dir).to_path_buf();
                LoadError::io(path, e.into())
            })?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext)
            {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn sql_definition(path: PathBuf, resource_type: ResourceType) -> Result<ModelDefinition, LoadError> {
        let sql = std::fs::read_to_string(&path).map_err(|e| LoadError::io(&path, e))?;
        let name = match resource_type {
            ResourceType::Snapshot => snapshot_block_name(&sql),
            _ => None,
        }
        .unwrap_or_else(|| file_stem(&path));
        Ok(ModelDefinition {
            name,
            resource_type,
            upstream: extract_refs(&sql),
            config_selectors: extract_config_selectors(&sql),
            path,
        })
    }
}

impl ProjectScanner for SourceScanner {
    fn scan(&self) -> Result<Vec<ModelDefinition>, LoadError> {
        let mut definitions = Vec::new();
        for path in self.files_with_ext(&self.models_dir, "sql")? {
            definitions.push(Self::sql_definition(path, ResourceType::Model)?);
        }
        for path in self.files_with_ext(&self.snapshots_dir, "sql")? {
            definitions.push(Self::sql_definition(path, ResourceType::Snapshot)?);
        }
        for path in self.files_with_ext(&self.seeds_dir, "csv")? {
            definitions.push(ModelDefinition {
                name: file_stem(&path),
                resource_type: ResourceType::Seed,
                path,
                upstream: Vec::new(),
                config_selectors: Vec::new(),
            });
        }
        for path in self.files_with_ext(TESTS_DIR, "sql")? {
            definitions.push(Self::sql_definition(path, ResourceType::Test)?);
        }
        tracing::debug!(
            "scanned {} definitions under {}",
            definitions.len(),
            self.root.display()
        );
        Ok(definitions)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Finds each call to `func(` that is not part of a longer identifier and
/// returns the text between its parentheses.
fn call_arguments<'a>(source: &'a str, func: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = source[search_from..].find(func) {
        let start = search_from + offset;
        search_from = start + func.len();

        let preceded_by_ident = source[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.');
        if preceded_by_ident {
            continue;
        }
        let rest = source[search_from..].trim_start();
        let Some(inner) = rest.strip_prefix('(') else {
            continue;
        };
        if let Some(end) = matching_paren(inner) {
            found.push(&inner[..end]);
        }
    }
    found
}

/// Byte offset of the `)` closing an already-opened parenthesis.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')') if depth == 0 => return Some(i),
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Quoted string literals in `text`, in order.
fn string_literals(text: &str) -> Vec<String> {
    let mut literals = Vec::new();
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for c in text.chars() {
        match quote {
            Some(q) if c == q => {
                literals.push(std::mem::take(&mut current));
                quote = None;
            }
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None => {}
        }
    }
    literals
}

/// Splits on commas that are outside quotes and brackets.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Names referenced with `ref('name')` or `ref('package', 'name')`.
pub fn extract_refs(sql: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for args in call_arguments(sql, "ref") {
        if let Some(name) = string_literals(args).pop() {
            if !refs.contains(&name) {
                refs.push(name);
            }
        }
    }
    refs
}

/// `key:value` selectors from `config(key='value', tags=['a', 'b'])` calls.
///
/// List values yield one selector per item. Values that are not literals
/// (booleans, numbers) are kept as written.
pub fn extract_config_selectors(sql: &str) -> Vec<String> {
    let mut selectors = Vec::new();
    for args in call_arguments(sql, "config") {
        for part in split_top_level(args) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            let literals = string_literals(value);
            if literals.is_empty() {
                selectors.push(format!("{key}:{value}"));
            } else {
                selectors.extend(literals.into_iter().map(|v| format!("{key}:{v}")));
            }
        }
    }
    selectors
}

/// Name declared by a `{% snapshot name %}` block.
fn snapshot_block_name(sql: &str) -> Option<String> {
    let start = sql.find("{%")?;
    let block = &sql[start + 2..];
    let end = block.find("%}")?;
    let mut words = block[..end].trim().trim_start_matches('-').split_whitespace();
    match (words.next(), words.next()) {
        (Some("snapshot"), Some(name)) => Some(name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_simple_and_packaged() {
        let sql = "select * from {{ ref('a') }} join {{ ref(\"pkg\", \"b\") }} join {{ ref('a') }}";
        assert_eq!(extract_refs(sql), vec!["a", "b"]);
    }

    #[test]
    fn refs_ignore_longer_identifiers() {
        let sql = "{{ my_ref('x') }} {{ pref('y') }} {{ ref ( 'z' ) }}";
        assert_eq!(extract_refs(sql), vec!["z"]);
    }

    #[test]
    fn config_selectors() {
        let sql = "{{ config(materialized='table', tags=['daily', \"pii\"], enabled=true) }}";
        assert_eq!(
            extract_config_selectors(sql),
            vec!["materialized:table", "tags:daily", "tags:pii", "enabled:true"]
        );
    }

    #[test]
    fn snapshot_name_from_block() {
        let sql = "{% snapshot orders_snapshot %}\nselect 1\n{% endsnapshot %}";
        assert_eq!(snapshot_block_name(sql).as_deref(), Some("orders_snapshot"));
        assert_eq!(snapshot_block_name("select 1"), None);
    }

    #[test]
    fn scan_project_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("models/staging")).unwrap();
        std::fs::create_dir_all(root.join("seeds")).unwrap();
        std::fs::create_dir_all(root.join("snapshots")).unwrap();
        std::fs::create_dir_all(root.join("tests")).unwrap();
        std::fs::write(root.join("models/staging/stg_orders.sql"), "select * from {{ ref('raw_orders') }}").unwrap();
        std::fs::write(
            root.join("models/orders.sql"),
            "{{ config(materialized='view') }}\nselect * from {{ ref('stg_orders') }}",
        )
        .unwrap();
        std::fs::write(root.join("models/notes.md"), "docs").unwrap();
        std::fs::write(root.join("seeds/raw_orders.csv"), "id\n1\n").unwrap();
        std::fs::write(
            root.join("snapshots/snap.sql"),
            "{% snapshot orders_snapshot %}select * from {{ ref('orders') }}{% endsnapshot %}",
        )
        .unwrap();
        std::fs::write(root.join("tests/assert_positive.sql"), "select * from {{ ref('orders') }} where id < 0").unwrap();

        let scanner = SourceScanner::new(root, "models", "snapshots", "seeds");
        let defs = scanner.scan().unwrap();
        let summary: Vec<(&str, ResourceType)> =
            defs.iter().map(|d| (d.name.as_str(), d.resource_type)).collect();
        assert_eq!(
            summary,
            vec![
                ("orders", ResourceType::Model),
                ("stg_orders", ResourceType::Model),
                ("orders_snapshot", ResourceType::Snapshot),
                ("raw_orders", ResourceType::Seed),
                ("assert_positive", ResourceType::Test),
            ]
        );
        assert_eq!(defs[0].upstream, vec!["stg_orders"]);
        assert_eq!(defs[0].config_selectors, vec!["materialized:view"]);
        assert_eq!(defs[4].upstream, vec!["orders"]);
    }

    #[test]
    fn scan_missing_dirs_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = SourceScanner::new(dir.path(), "models", "snapshots", "seeds");
        assert!(scanner.scan().unwrap().is_empty());
    }
}
