// Renderings of an analysis result: text summary, JSON and Graphviz DOT

use crate::model::{AnalysisResult, EdgeDirection, GraphNode, RecordGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Dot,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "dot" | "graphviz" => Some(ReportFormat::Dot),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Dot => "dot",
        }
    }
}

pub fn render(result: &AnalysisResult, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(result)),
        ReportFormat::Json => generate_json_report(result),
        ReportFormat::Dot => Ok(generate_dot_report(&result.graph)),
    }
}

/// Node counts per object type, sorted by name
pub fn object_counts(graph: &RecordGraph) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for node in &graph.nodes {
        *counts.entry(node.object_name.as_str()).or_insert(0) += 1;
    }
    counts
}

pub fn generate_text_report(result: &AnalysisResult) -> String {
    let graph = &result.graph;
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                          ORGMAP RELATIONSHIP REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Analysis ID:  {}\n", result.analysis_id));
    report.push_str(&format!("Host:         {}\n", result.host));
    report.push_str(&format!("API Version:  {}\n", result.api_version));
    report.push_str(&format!(
        "Root:         {} ({})\n",
        graph.root.label, graph.root.key
    ));
    report.push_str(&format!(
        "Tracked:      {}\n",
        result.tracked_objects.join(", ")
    ));
    report.push('\n');

    report.push_str(RULE);
    report.push_str("SUMMARY\n");
    report.push_str(RULE);
    report.push('\n');

    let parents = graph
        .edges
        .iter()
        .filter(|e| e.direction == EdgeDirection::Parent)
        .count();
    report.push_str(&format!("Records:      {}\n", graph.nodes.len()));
    report.push_str(&format!(
        "Links:        {} ({} parent, {} child)\n",
        graph.edges.len(),
        parents,
        graph.edges.len() - parents
    ));
    report.push_str(&format!("Max Depth:    {}\n\n", graph.max_depth()));

    for (object, count) in object_counts(graph) {
        report.push_str(&format!("  {:<28} {}\n", object, count));
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str("RECORDS\n");
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&generate_record_tree(graph));

    report
}

/// Nodes nested under the node that discovered them
fn generate_record_tree(graph: &RecordGraph) -> String {
    let mut children: HashMap<&str, Vec<&GraphNode>> = HashMap::new();
    for node in &graph.nodes {
        if let Some(ref parent) = node.parent_key {
            children.entry(parent.as_str()).or_default().push(node);
        }
    }

    let mut out = format!("{} [{}]\n", graph.root.label, graph.root.key);
    push_subtree(&mut out, &children, &graph.root.key, "");
    out
}

fn push_subtree(
    out: &mut String,
    children: &HashMap<&str, Vec<&GraphNode>>,
    key: &str,
    indent: &str,
) {
    let Some(nodes) = children.get(key) else {
        return;
    };
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        let prefix = if is_last { "└── " } else { "├── " };
        out.push_str(&format!(
            "{}{}{} [{}] via {}\n",
            indent,
            prefix,
            node.label,
            node.key,
            node.relation_label.as_deref().unwrap_or("?")
        ));
        let next_indent = format!("{}{}", indent, if is_last { "    " } else { "│   " });
        push_subtree(out, children, &node.key, &next_indent);
    }
}

pub fn generate_json_report(result: &AnalysisResult) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "metadata": {
            "generator": "orgmap",
            "version": env!("CARGO_PKG_VERSION"),
            "generatedAt": chrono::Utc::now().to_rfc3339(),
        },
        "analysis": result,
    });

    serde_json::to_string_pretty(&json_report)
}

fn dot_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn generate_dot_report(graph: &RecordGraph) -> String {
    let mut dot = String::from("digraph orgmap {\n  rankdir=LR;\n  node [shape=box];\n");

    for node in &graph.nodes {
        let style = if node.key == graph.root.key {
            ", style=bold"
        } else {
            ""
        };
        dot.push_str(&format!(
            "  \"{}\" [label=\"{}\\n{}\"{}];\n",
            dot_escape(&node.key),
            dot_escape(&node.object_name),
            dot_escape(&node.label),
            style
        ));
    }
    for edge in &graph.edges {
        let style = match edge.direction {
            EdgeDirection::Parent => "solid",
            EdgeDirection::Child => "dashed",
        };
        dot.push_str(&format!(
            "  \"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
            dot_escape(&edge.from),
            dot_escape(&edge.to),
            dot_escape(&edge.relation),
            style
        ));
    }

    dot.push_str("}\n");
    dot
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
