//! Node graph model.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nodes keyed by unique id.
pub type NodeMap = BTreeMap<String, Node>;

/// Kind of build resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A SQL or Python model.
    Model,
    /// A CSV seed.
    Seed,
    /// A snapshot.
    Snapshot,
    /// A data test.
    Test,
    /// An external source table.
    Source,
    /// A downstream exposure.
    Exposure,
    /// An analysis query.
    Analysis,
    /// A hook or run operation.
    Operation,
    /// A macro.
    Macro,
    /// A metric.
    Metric,
    /// A semantic model.
    SemanticModel,
    /// A saved query.
    SavedQuery,
    /// A unit test.
    UnitTest,
    /// A group.
    Group,
}

impl ResourceType {
    /// The lowercase name used in unique ids and tool output.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Model => "model",
            ResourceType::Seed => "seed",
            ResourceType::Snapshot => "snapshot",
            ResourceType::Test => "test",
            ResourceType::Source => "source",
            ResourceType::Exposure => "exposure",
            ResourceType::Analysis => "analysis",
            ResourceType::Operation => "operation",
            ResourceType::Macro => "macro",
            ResourceType::Metric => "metric",
            ResourceType::SemanticModel => "semantic_model",
            ResourceType::SavedQuery => "saved_query",
            ResourceType::UnitTest => "unit_test",
            ResourceType::Group => "group",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::from(s)).map_err(|_| format!("unknown resource type `{s}`"))
    }
}

/// One build resource and its upstream edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// `<resource_type>.<package>.<name>[.<version>]`.
    pub unique_id: String,
    /// Kind of resource.
    pub resource_type: ResourceType,
    /// Unique ids of upstream nodes, each once, in the order first declared.
    /// May reference nodes outside the graph.
    pub depends_on: Vec<String>,
    /// Absolute path of the defining file.
    pub file_path: PathBuf,
    /// Tags in declaration order.
    pub tags: Vec<String>,
    /// Resource configuration.
    pub config: Map<String, Value>,
    /// Whether a test node depends on this node.
    pub has_test: bool,
}

impl Node {
    /// Everything after the second `.` of the unique id.
    ///
    /// Versioned models keep their version suffix (`orders.v2`).
    pub fn resource_name(&self) -> &str {
        self.unique_id.splitn(3, '.').nth(2).unwrap_or(&self.unique_id)
    }

    /// The resource name with `.` replaced by `_`, usable as a task name.
    pub fn name(&self) -> String {
        self.resource_name().replace('.', "_")
    }

    /// All fields plus `resource_name` and `name`, as a JSON object.
    pub fn context(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Value::Object(fields) = &mut value {
            fields.insert("resource_name".to_string(), Value::from(self.resource_name()));
            fields.insert("name".to_string(), Value::from(self.name()));
        }
        value
    }
}
