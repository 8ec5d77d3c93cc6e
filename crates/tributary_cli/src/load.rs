//! `tributary load`: builds the project graph and prints it.

use std::io::Write;

use serde_json::{json, Value};
use tributary_cache::CacheScope;
use tributary_config::LoadMode;
use tributary_graph::{GraphLoader, LoadOutcome};

use crate::setup::{load_settings, open_store};
use crate::{GlobalArgs, LoadArgs, OutputFormat};

/// Runs the `load` subcommand.
pub fn run(args: &LoadArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_settings(global)?;
    let store = open_store(&config)?;

    let mut loader = GraphLoader::new(&config, &store);
    if let Some(scope) = scope_from_args(args) {
        loader = loader.with_scope(scope);
    }
    let method = args.method.map(LoadMode::from).unwrap_or(config.render.load_method);
    let outcome = loader.load(method)?;

    if !global.quiet {
        tracing::info!(
            "loaded {} nodes ({} selected) using {}",
            outcome.nodes.len(),
            outcome.filtered_nodes.len(),
            outcome.load_method
        );
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => write_text(&mut out, &outcome)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &render_json(&outcome))?;
            writeln!(out)?;
        }
    }
    Ok(0)
}

fn scope_from_args(args: &LoadArgs) -> Option<CacheScope> {
    let entity = args.cache_id.as_deref()?;
    Some(match args.group.as_deref() {
        Some(group) => CacheScope::group(entity, group),
        None => CacheScope::entity(entity),
    })
}

/// One line per selected node: id, type, then its upstream ids.
fn write_text(out: &mut impl Write, outcome: &LoadOutcome) -> std::io::Result<()> {
    for node in outcome.filtered_nodes.values() {
        let marker = if node.has_test { " [tested]" } else { "" };
        writeln!(out, "{} ({}){marker}", node.unique_id, node.resource_type)?;
        for upstream in &node.depends_on {
            writeln!(out, "  <- {upstream}")?;
        }
    }
    Ok(())
}

fn render_json(outcome: &LoadOutcome) -> Value {
    let nodes: Vec<Value> = outcome.filtered_nodes.values().map(|node| node.context()).collect();
    json!({
        "load_method": outcome.load_method.to_string(),
        "total_nodes": outcome.nodes.len(),
        "nodes": nodes,
    })
}
