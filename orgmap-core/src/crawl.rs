use crate::cache::{META_TTL, MetadataCache, describe_key};
use crate::error::{AnalyzeError, Result};
use crate::filter::TrackedObjects;
use crate::ids::{node_key, normalize_record_id};
use crate::model::{EdgeDirection, GraphEdge, GraphNode, RecordGraph};
use orgmap_scanner::client::unique_fields;
use orgmap_scanner::events::SharedSink;
use orgmap_scanner::{ChildRelationship, Field, ObjectSchema, Record, SchemaClient};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rows fetched per child relationship when no explicit limit is set
pub const MAX_RECORDS_PER_RELATIONSHIP: usize = 5000;
pub const MAX_NODES_TOTAL: usize = 20000;
pub const DEFAULT_MAX_DEPTH: usize = 5;
/// 0 means "use the safety cap"
pub const DEFAULT_CHILDREN_LIMIT: usize = 0;

const DISPLAY_FIELD_OVERRIDES: &[(&str, &str)] = &[("Case", "CaseNumber")];

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub max_depth: usize,
    pub children_limit: usize,
    pub node_cap: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            children_limit: DEFAULT_CHILDREN_LIMIT,
            node_cap: MAX_NODES_TOTAL,
        }
    }
}

impl CrawlOptions {
    pub fn per_relationship_cap(&self) -> usize {
        if self.children_limit > 0 {
            self.children_limit
        } else {
            MAX_RECORDS_PER_RELATIONSHIP
        }
    }
}

/// Field whose value labels a node of `object_name`
pub fn display_field(schema: &ObjectSchema, object_name: &str) -> String {
    if let Some((_, field)) = DISPLAY_FIELD_OVERRIDES
        .iter()
        .find(|(object, _)| *object == object_name)
    {
        return field.to_string();
    }
    if let Some(field) = schema.name_field() {
        return field.name.clone();
    }
    if schema.field("Name").is_some() {
        return "Name".to_string();
    }
    "Id".to_string()
}

pub fn record_url(origin: &str, object_name: &str, record_id: &str) -> String {
    format!(
        "{}/lightning/r/{}/{}/view",
        origin.trim_end_matches('/'),
        object_name,
        record_id
    )
}

fn children_query(child_object: &str, display: &str, foreign_key: &str, record_id: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = '{}'",
        unique_fields(["Id", display]).join(", "),
        child_object,
        foreign_key,
        record_id
    )
}

#[derive(Debug)]
struct PendingVisit {
    object_name: String,
    record_id: String,
    depth: usize,
    parent_key: Option<String>,
    relation_label: Option<String>,
}

#[derive(Default)]
struct CrawlState {
    queue: VecDeque<PendingVisit>,
    visited: HashSet<String>,
    nodes: Vec<GraphNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    describes: HashMap<String, Arc<ObjectSchema>>,
}

impl CrawlState {
    /// Insert unless present; returns the stored node
    fn upsert_node(&mut self, node: GraphNode) -> &GraphNode {
        let index = match self.node_index.get(&node.key) {
            Some(&index) => index,
            None => {
                self.node_index.insert(node.key.clone(), self.nodes.len());
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        &self.nodes[index]
    }

    fn push_link(
        &mut self,
        from: &GraphNode,
        object_name: &str,
        record_id: String,
        relation: String,
        direction: EdgeDirection,
    ) {
        self.edges.push(GraphEdge {
            from: from.key.clone(),
            to: node_key(object_name, &record_id),
            relation: relation.clone(),
            direction,
        });
        self.queue.push_back(PendingVisit {
            object_name: object_name.to_string(),
            record_id,
            depth: from.depth + 1,
            parent_key: Some(from.key.clone()),
            relation_label: Some(relation),
        });
    }
}

/// Breadth-first walk over the records reachable from one root record
pub struct GraphCrawler {
    client: SchemaClient,
    cache: Arc<MetadataCache>,
    tracked: TrackedObjects,
    options: CrawlOptions,
    page_origin: String,
    events: SharedSink,
    progress_callback: Option<CrawlProgressCallback>,
}

impl GraphCrawler {
    /// `page_origin` is the origin node URLs are built against, normally the
    /// origin of the page the analysis started from
    pub fn new(
        client: SchemaClient,
        cache: Arc<MetadataCache>,
        tracked: TrackedObjects,
        page_origin: impl Into<String>,
        events: SharedSink,
    ) -> Self {
        Self {
            client,
            cache,
            tracked,
            options: CrawlOptions::default(),
            page_origin: page_origin.into(),
            events,
            progress_callback: None,
        }
    }

    pub fn with_options(mut self, options: CrawlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.options.max_depth = depth;
        self
    }

    pub fn with_children_limit(mut self, limit: usize) -> Self {
        self.options.children_limit = limit;
        self
    }

    pub fn with_progress_callback(mut self, callback: CrawlProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub async fn crawl(&self, root_object: &str, root_id: &str) -> Result<RecordGraph> {
        info!(
            "Starting crawl at {}:{} (max depth {})",
            root_object, root_id, self.options.max_depth
        );

        let mut state = CrawlState::default();
        state.queue.push_back(PendingVisit {
            object_name: root_object.to_string(),
            record_id: root_id.to_string(),
            depth: 0,
            parent_key: None,
            relation_label: None,
        });

        while let Some(item) = state.queue.pop_front() {
            if state.nodes.len() >= self.options.node_cap {
                warn!("Node cap of {} reached", self.options.node_cap);
                self.events
                    .record("graph:nodeCap", json!({ "cap": self.options.node_cap }));
                break;
            }
            self.visit(&mut state, item).await?;
        }

        let Some(root) = state.nodes.first().cloned() else {
            return Err(AnalyzeError::NoAnalyzableRecord);
        };

        info!(
            "Crawl complete: {} nodes, {} edges",
            state.nodes.len(),
            state.edges.len()
        );
        self.events.record(
            "graph:complete",
            json!({ "nodes": state.nodes.len(), "edges": state.edges.len() }),
        );

        Ok(RecordGraph {
            root,
            nodes: state.nodes,
            edges: state.edges,
        })
    }

    async fn visit(&self, state: &mut CrawlState, item: PendingVisit) -> Result<()> {
        if !self.tracked.contains(&item.object_name) {
            return Ok(());
        }
        let Some(record_id) = normalize_record_id(&item.record_id) else {
            debug!("Skipping malformed id {:?}", item.record_id);
            return Ok(());
        };
        let key = node_key(&item.object_name, &record_id);
        if !state.visited.insert(key.clone()) {
            return Ok(());
        }

        if let Some(ref callback) = self.progress_callback {
            callback(format!("Visiting {} (depth {})", key, item.depth));
        }

        let loaded = match self.load_record(state, &item.object_name, &record_id).await {
            Ok(loaded) => loaded,
            Err(e) if state.nodes.is_empty() => return Err(e),
            Err(e) => {
                warn!("Skipping record {}: {}", key, e);
                self.events.record(
                    "crawl:record_skipped",
                    json!({ "key": key, "depth": item.depth, "error": e.to_string() }),
                );
                return Ok(());
            }
        };
        let Some((schema, record)) = loaded else {
            debug!("{} no longer exists", key);
            return Ok(());
        };
        let display = display_field(&schema, &item.object_name);
        let reference_fields = self.reference_fields(&schema);

        let label = match display.as_str() {
            "Id" => None,
            field => record.get_text(field).filter(|l| !l.is_empty()),
        }
        .unwrap_or_else(|| record_id.clone());

        let node = state
            .upsert_node(GraphNode {
                key: key.clone(),
                url: record_url(&self.page_origin, &item.object_name, &record_id),
                record_id: record_id.clone(),
                object_name: item.object_name.clone(),
                label,
                depth: item.depth,
                parent_key: item.parent_key,
                relation_label: item.relation_label,
            })
            .clone();

        if item.depth >= self.options.max_depth {
            return Ok(());
        }

        self.expand_parents(state, &node, &reference_fields, &record);
        for relationship in &schema.child_relationships {
            self.expand_children(state, &node, relationship).await;
        }
        Ok(())
    }

    /// Reference fields pointing at one or more tracked objects
    fn reference_fields<'a>(&self, schema: &'a ObjectSchema) -> Vec<&'a Field> {
        schema
            .fields
            .iter()
            .filter(|f| {
                f.is_reference()
                    && !f.deprecated_and_hidden
                    && f.reference_to.iter().any(|t| self.tracked.contains(t))
            })
            .collect()
    }

    /// Describe `object_name` and fetch the record with its display and
    /// reference fields. `None` when the record does not exist.
    async fn load_record(
        &self,
        state: &mut CrawlState,
        object_name: &str,
        record_id: &str,
    ) -> Result<Option<(Arc<ObjectSchema>, Record)>> {
        let schema = self.describe(state, object_name).await?;
        let display = display_field(&schema, object_name);
        let mut fields = vec!["Id", display.as_str()];
        fields.extend(self.reference_fields(&schema).iter().map(|f| f.name.as_str()));

        let record = self.client.query_one(object_name, record_id, &fields).await?;
        Ok(record.map(|record| (schema, record)))
    }

    fn expand_parents(
        &self,
        state: &mut CrawlState,
        node: &GraphNode,
        reference_fields: &[&Field],
        record: &Record,
    ) {
        for field in reference_fields {
            let Some(linked_id) = record
                .get_text(&field.name)
                .and_then(|v| normalize_record_id(&v))
            else {
                continue;
            };
            let Some(target) = field
                .targets()
                .and_then(|t| t.resolve(|name| self.tracked.contains(name)).map(str::to_string))
            else {
                continue;
            };

            state.push_link(
                node,
                &target,
                linked_id,
                field.relation_label(),
                EdgeDirection::Parent,
            );
        }
    }

    async fn expand_children(
        &self,
        state: &mut CrawlState,
        node: &GraphNode,
        relationship: &ChildRelationship,
    ) {
        if relationship.deprecated_and_hidden {
            return;
        }
        let (Some(child_object), Some(foreign_key)) = (
            relationship.child_sobject.as_deref(),
            relationship.field.as_deref(),
        ) else {
            return;
        };
        if child_object.is_empty() || foreign_key.is_empty() || !self.tracked.contains(child_object)
        {
            return;
        }
        let relation = relationship
            .relation_label()
            .unwrap_or_else(|| foreign_key.to_string());

        let rows = match self
            .fetch_children(state, child_object, foreign_key, &node.record_id)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "Skipping relationship {} of {}: {}",
                    relation, node.key, e
                );
                self.events.record(
                    "crawl:relationship_skipped",
                    json!({
                        "from": node.key,
                        "childObject": child_object,
                        "relation": relation,
                        "error": e.to_string(),
                    }),
                );
                return;
            }
        };

        for row in rows {
            let Some(child_id) = row.id().and_then(|id| normalize_record_id(&id)) else {
                continue;
            };
            state.push_link(
                node,
                child_object,
                child_id,
                relation.clone(),
                EdgeDirection::Child,
            );
        }
    }

    async fn fetch_children(
        &self,
        state: &mut CrawlState,
        child_object: &str,
        foreign_key: &str,
        record_id: &str,
    ) -> Result<Vec<Record>> {
        let child_schema = self.describe(state, child_object).await?;
        let display = display_field(&child_schema, child_object);
        let soql = children_query(child_object, &display, foreign_key, record_id);
        Ok(self
            .client
            .query_all(&soql, self.options.per_relationship_cap())
            .await?)
    }

    /// Per-crawl map, then the shared cache, then the API
    async fn describe(&self, state: &mut CrawlState, object_name: &str) -> Result<Arc<ObjectSchema>> {
        if let Some(schema) = state.describes.get(object_name) {
            return Ok(schema.clone());
        }

        let key = describe_key(self.client.connection(), object_name);
        let schema = match self.cache.get::<ObjectSchema>(&key) {
            Some(schema) => {
                debug!("Describe cache hit for {}", object_name);
                schema
            }
            None => {
                let schema = self.client.describe(object_name).await?;
                self.cache.set(&key, &schema, META_TTL);
                schema
            }
        };

        let schema = Arc::new(schema);
        state
            .describes
            .insert(object_name.to_string(), schema.clone());
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with(fields: &[(&str, bool)]) -> ObjectSchema {
        ObjectSchema {
            name: "Thing__c".to_string(),
            fields: fields
                .iter()
                .map(|(name, name_field)| Field {
                    name: name.to_string(),
                    name_field: *name_field,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_display_field_priority() {
        let with_name_field = schema_with(&[("Id", false), ("Name", false), ("Title__c", true)]);
        assert_eq!(display_field(&with_name_field, "Thing__c"), "Title__c");
        assert_eq!(display_field(&with_name_field, "Case"), "CaseNumber");

        let with_name = schema_with(&[("Id", false), ("Name", false)]);
        assert_eq!(display_field(&with_name, "Thing__c"), "Name");

        let bare = schema_with(&[("Id", false)]);
        assert_eq!(display_field(&bare, "Thing__c"), "Id");
    }

    #[test]
    fn test_children_query() {
        assert_eq!(
            children_query("Contact", "Name", "AccountId", "001000000000001AAA"),
            "SELECT Id, Name FROM Contact WHERE AccountId = '001000000000001AAA'"
        );
        assert_eq!(
            children_query("Note", "Id", "ParentId", "001000000000001AAA"),
            "SELECT Id FROM Note WHERE ParentId = '001000000000001AAA'"
        );
    }

    #[test]
    fn test_record_url() {
        assert_eq!(
            record_url("https://acme.lightning.force.com/", "Account", "001000000000001AAA"),
            "https://acme.lightning.force.com/lightning/r/Account/001000000000001AAA/view"
        );
    }

    #[test]
    fn test_per_relationship_cap() {
        let mut options = CrawlOptions::default();
        assert_eq!(options.per_relationship_cap(), MAX_RECORDS_PER_RELATIONSHIP);
        options.children_limit = 10;
        assert_eq!(options.per_relationship_cap(), 10);
    }
}
