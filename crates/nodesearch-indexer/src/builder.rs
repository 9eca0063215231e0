use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use nodesearch_core::config::IndexingSettings;
use nodesearch_core::error::Result;
use nodesearch_core::filter::lookup;
use nodesearch_core::traits::{IndexBackend, LinkResolver, NodeTypeSchema, TreeAccessor};
use nodesearch_core::types::{
    document_id, fields, is_empty_value, value_text, DimensionSpacePoint, Document, FulltextBag, GeoPoint, Node,
    NodeAggregateId,
};

use crate::aggregator::FulltextAggregator;

/// `__path` of `node` and the paths of all of its ancestors, outermost first.
pub fn node_paths(tree: &dyn TreeAccessor, node: &Node) -> Result<(String, Vec<String>)> {
    let mut segments = vec![node.path_segment().to_string()];
    let mut current = node.clone();
    while let Some(parent) = tree.find_parent(&current)? {
        segments.push(parent.path_segment().to_string());
        current = parent;
    }
    segments.reverse();

    let mut paths = Vec::with_capacity(segments.len());
    let mut path = String::new();
    for segment in &segments {
        path.push('/');
        path.push_str(segment);
        paths.push(path.clone());
    }
    let own = paths.pop().unwrap_or_default();
    Ok((own, paths))
}

/// Produces the search document of one aggregate in one dimension point.
pub struct DocumentBuilder {
    tree: Arc<dyn TreeAccessor>,
    schema: Arc<dyn NodeTypeSchema>,
    links: Arc<dyn LinkResolver>,
    index: Arc<dyn IndexBackend>,
    aggregator: FulltextAggregator,
    settings: IndexingSettings,
}

impl DocumentBuilder {
    pub fn new(
        tree: Arc<dyn TreeAccessor>,
        schema: Arc<dyn NodeTypeSchema>,
        links: Arc<dyn LinkResolver>,
        index: Arc<dyn IndexBackend>,
        settings: IndexingSettings,
    ) -> Result<Self> {
        let aggregator = FulltextAggregator::new(tree.clone(), schema.clone(), &settings.content_node_types)?;
        Ok(Self { tree, schema, links, index, aggregator, settings })
    }

    /// `Ok(None)` when the aggregate has no variant in `point`, or when the
    /// variant lacks a required attribute. In the latter case the document id
    /// is deleted from the index first.
    pub fn build(&self, aggregate_id: &NodeAggregateId, point: &DimensionSpacePoint) -> Result<Option<Document>> {
        let Some(node) = self.tree.find_by_aggregate_id_in_dimension(&self.settings.workspace, aggregate_id, point)? else {
            debug!(aggregate = %aggregate_id, dimensions = %point, "no variant in dimension");
            return Ok(None);
        };

        let mut document = Document::new(document_id(aggregate_id, point));
        for (property, value) in &node.properties {
            let Some(field) = self.schema.property_field(&node.node_type, property) else { continue };
            document.insert_field(field, value.clone());
        }

        if self.settings.fulltext_enabled {
            let mut bag = FulltextBag::new();
            self.aggregator.extract_into(&node, &mut bag);
            self.aggregator.aggregate_into(&node, &mut bag)?;
            document.fulltext = bag;
        }

        document.title = node.property(&self.settings.title_property).and_then(value_text);
        document.uri = self.links.resolve_uri(&node);
        if document.uri.is_none() {
            debug!(aggregate = %aggregate_id, dimensions = %point, "no uri");
        }

        self.insert_system_fields(&node, point, &mut document)?;

        if let Some(raw) = document.fields.remove(&self.settings.geo_field) {
            match GeoPoint::from_value(&raw) {
                Some(geo) => document.geo = Some(geo),
                None => warn!(document = %document.id, field = %self.settings.geo_field, "unreadable geo value dropped"),
            }
        }

        if let Some(attribute) = self.missing_required_attribute(&document)? {
            info!(document = %document.id, attribute, "required attribute empty, removing document");
            if let Err(e) = self.index.delete_documents(&[document.id.clone()]) {
                warn!(document = %document.id, error = %e, "cleanup delete failed");
            }
            return Ok(None);
        }
        Ok(Some(document))
    }

    fn insert_system_fields(&self, node: &Node, point: &DimensionSpacePoint, document: &mut Document) -> Result<()> {
        let (path, parent_paths) = node_paths(self.tree.as_ref(), node)?;
        let lineage: Vec<Value> = self
            .schema
            .type_and_supertypes(&node.node_type)
            .into_iter()
            .map(|t| Value::String(t.to_string()))
            .collect();

        document.insert_field(fields::IDENTIFIER, Value::String(node.aggregate_id.to_string()));
        document.insert_field(fields::DIMENSIONS_HASH, Value::String(point.hash()));
        document.insert_field(fields::DIMENSIONS, point.to_value());
        document.insert_field(fields::WORKSPACE, Value::String(node.workspace.to_string()));
        document.insert_field(fields::NODE_TYPE, Value::String(node.node_type.to_string()));
        document.insert_field(fields::TYPE_AND_SUPERTYPES, Value::Array(lineage));
        document.insert_field(fields::PATH, Value::String(path));
        document.insert_field(fields::PARENT_PATH, Value::Array(parent_paths.into_iter().map(Value::String).collect()));
        Ok(())
    }

    fn missing_required_attribute<'a>(&'a self, document: &Document) -> Result<Option<&'a str>> {
        if self.settings.required_attributes.is_empty() {
            return Ok(None);
        }
        let hit = document.to_hit()?;
        Ok(self
            .settings
            .required_attributes
            .iter()
            .find(|attribute| is_empty_value(lookup(&hit, attribute)))
            .map(String::as_str))
    }
}
