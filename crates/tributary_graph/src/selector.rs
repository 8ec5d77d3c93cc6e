//! Node selection for strategies that cannot delegate filtering to the tool.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::model::{Node, NodeMap};

/// Filters a node set with include and exclude expressions.
pub trait NodeSelector {
    /// Returns the nodes matching any of `select` (all nodes when empty)
    /// and none of `exclude`.
    fn select(&self, project_dir: &Path, nodes: &NodeMap, select: &[String], exclude: &[String])
        -> NodeMap;
}

/// Selector for the common method-prefixed syntax.
///
/// Supported criteria: `tag:<tag>`, `path:<dir or file>`,
/// `config.<key>:<value>`, `resource_type:<type>` and bare resource names.
/// Criteria joined with `,` must all match. Graph operators (`+`, `@`) are
/// not understood; expressions using them match nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSelector;

#[derive(Debug, PartialEq)]
enum Criterion {
    Tag(String),
    Path(PathBuf),
    Config { key: String, value: String },
    ResourceType(String),
    Name(String),
    Unsupported(String),
}

impl Criterion {
    fn parse(project_dir: &Path, expr: &str) -> Self {
        let expr = expr.trim();
        if expr.starts_with(['+', '@']) || expr.ends_with('+') {
            return Criterion::Unsupported(expr.to_string());
        }
        let Some((method, arg)) = expr.split_once(':') else {
            return Criterion::Name(expr.to_string());
        };
        match method {
            "tag" => Criterion::Tag(arg.to_string()),
            "path" => Criterion::Path(project_dir.join(arg)),
            "resource_type" => Criterion::ResourceType(arg.to_string()),
            _ => match method.strip_prefix("config.") {
                Some(key) => Criterion::Config {
                    key: key.to_string(),
                    value: arg.to_string(),
                },
                None => Criterion::Unsupported(expr.to_string()),
            },
        }
    }

    fn matches(&self, node: &Node) -> bool {
        match self {
            Criterion::Tag(tag) => node.tags.iter().any(|t| t == tag),
            Criterion::Path(path) => node.file_path.starts_with(path),
            Criterion::Config { key, value } => match node.config.get(key) {
                Some(Value::String(s)) => s == value,
                Some(Value::Array(items)) => items.iter().any(|i| i.as_str() == Some(value)),
                Some(other) => other.to_string() == *value,
                None => false,
            },
            Criterion::ResourceType(t) => node.resource_type.as_str() == t,
            Criterion::Name(name) => node.resource_name() == name || node.name() == *name,
            Criterion::Unsupported(_) => false,
        }
    }
}

fn parse_expression(project_dir: &Path, expr: &str) -> Vec<Criterion> {
    let criteria: Vec<Criterion> = expr
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| Criterion::parse(project_dir, part))
        .collect();
    for criterion in &criteria {
        if let Criterion::Unsupported(text) = criterion {
            tracing::warn!("unsupported selection criterion `{text}` matches nothing");
        }
    }
    criteria
}

fn matches_any(node: &Node, expressions: &[Vec<Criterion>]) -> bool {
    expressions
        .iter()
        .any(|all| !all.is_empty() && all.iter().all(|c| c.matches(node)))
}

impl NodeSelector for BasicSelector {
    fn select(
        &self,
        project_dir: &Path,
        nodes: &NodeMap,
        select: &[String],
        exclude: &[String],
    ) -> NodeMap {
        let include: Vec<Vec<Criterion>> =
            select.iter().map(|e| parse_expression(project_dir, e)).collect();
        let exclude: Vec<Vec<Criterion>> =
            exclude.iter().map(|e| parse_expression(project_dir, e)).collect();

        nodes
            .iter()
            .filter(|(_, node)| include.is_empty() || matches_any(node, &include))
            .filter(|(_, node)| !matches_any(node, &exclude))
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect()
    }
}
