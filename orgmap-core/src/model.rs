use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    /// Lookup from a record to the record it references
    Parent,
    /// Reverse lookup from a record to a row that references it
    Child,
}

impl EdgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeDirection::Parent => "parent",
            EdgeDirection::Child => "child",
        }
    }
}

impl fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub key: String,
    pub record_id: String,
    pub object_name: String,
    pub label: String,
    pub depth: usize,
    /// Node that first discovered this one
    pub parent_key: Option<String>,
    pub relation_label: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub relation: String,
    pub direction: EdgeDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordGraph {
    pub root: GraphNode,
    /// Breadth-first discovery order
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl RecordGraph {
    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.key == key)
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub host: String,
    pub api_version: String,
    pub root_object: String,
    pub tracked_objects: Vec<String>,
    pub graph: RecordGraph,
}

/// What `session` reports about a page without contacting the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub host: String,
    pub has_session_cookie: bool,
    pub token_hint: Option<String>,
}

/// Entry of the business object catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessObject {
    pub name: String,
    pub label: String,
    pub custom: bool,
}
