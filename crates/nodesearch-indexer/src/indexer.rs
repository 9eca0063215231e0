//! Synchronization between the content tree and the search index.
//!
//! Reconciliation is delete-then-replace per aggregate: every indexed
//! variant is deleted, then all variants that still build are added in one
//! batch. A failure in between leaves the aggregate under-represented until
//! the next successful run. Calls for the same aggregate are not serialized
//! here; callers that need that must serialize externally.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use nodesearch_core::config::IndexingSettings;
use nodesearch_core::error::Result;
use nodesearch_core::schema::NodeTypeFilter;
use nodesearch_core::traits::{DimensionSource, IndexBackend, LinkResolver, NodeTypeSchema, TreeAccessor};
use nodesearch_core::types::{document_id, DimensionSpacePoint, Document, DocumentId, Node, NodeAggregateId};

use crate::builder::DocumentBuilder;
use crate::locator::find_fulltext_root;

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Fulltext-root aggregates indexed.
    pub aggregates: usize,
    /// Documents written across all aggregates.
    pub documents: usize,
}

pub struct NodeIndexer {
    index: Arc<dyn IndexBackend>,
    tree: Arc<dyn TreeAccessor>,
    schema: Arc<dyn NodeTypeSchema>,
    dimensions: Arc<dyn DimensionSource>,
    builder: DocumentBuilder,
    settings: IndexingSettings,
}

impl NodeIndexer {
    pub fn new(
        index: Arc<dyn IndexBackend>,
        tree: Arc<dyn TreeAccessor>,
        schema: Arc<dyn NodeTypeSchema>,
        links: Arc<dyn LinkResolver>,
        dimensions: Arc<dyn DimensionSource>,
        settings: IndexingSettings,
    ) -> Result<Self> {
        let builder = DocumentBuilder::new(tree.clone(), schema.clone(), links, index.clone(), settings.clone())?;
        Ok(Self { index, tree, schema, dimensions, builder, settings })
    }

    pub fn create_index(&self) -> Result<()> {
        info!(index = self.index.index_name(), "creating index");
        self.index.create_index()
    }

    /// Remove every document from the index.
    pub fn flush(&self) -> Result<()> {
        info!(index = self.index.index_name(), "flushing index");
        self.index.delete_all_documents()
    }

    /// Reindex all dimension variants of the fulltext root of `node`.
    ///
    /// Returns the number of documents written, or `None` when `node` has no
    /// fulltext root.
    pub fn index_node(&self, node: &Node) -> Result<Option<usize>> {
        let Some(root) = find_fulltext_root(node, self.tree.as_ref(), self.schema.as_ref()) else {
            debug!(aggregate = %node.aggregate_id, "not indexable");
            return Ok(None);
        };

        let stale = self.index.find_identifiers_by_aggregate(&root.aggregate_id)?;
        self.delete(&stale)?;

        let mut documents = Vec::new();
        for point in self.target_points() {
            if let Some(document) = self.builder.build(&root.aggregate_id, &point)? {
                documents.push(document);
            }
        }
        self.add(&documents)?;
        info!(aggregate = %root.aggregate_id, documents = documents.len(), "indexed");
        Ok(Some(documents.len()))
    }

    /// Reindex only the dimension variant `node` lives in.
    pub fn index_single_node(&self, node: &Node) -> Result<Option<usize>> {
        let Some(root) = find_fulltext_root(node, self.tree.as_ref(), self.schema.as_ref()) else {
            debug!(aggregate = %node.aggregate_id, "not indexable");
            return Ok(None);
        };
        let point = root.dimension_space_point.clone();
        let stale = self.index.find_identifiers_by_aggregate_and_dimension_hash(&root.aggregate_id, &point.hash())?;
        self.delete(&stale)?;

        let documents: Vec<Document> = self.builder.build(&root.aggregate_id, &point)?.into_iter().collect();
        self.add(&documents)?;
        info!(aggregate = %root.aggregate_id, dimensions = %point, documents = documents.len(), "indexed variant");
        Ok(Some(documents.len()))
    }

    /// Delete the document of `node` in its own dimension point.
    ///
    /// Documents of the aggregate in other dimension points stay in the index
    /// until the aggregate is reindexed or the index is rebuilt.
    pub fn remove_node(&self, node: &Node) -> Result<()> {
        self.remove_document(&node.aggregate_id, &node.dimension_space_point)
    }

    /// Delete the document of an aggregate in one dimension point. The node
    /// does not need to exist in the tree any more.
    pub fn remove_document(&self, aggregate_id: &NodeAggregateId, point: &DimensionSpacePoint) -> Result<()> {
        let id = document_id(aggregate_id, point);
        info!(aggregate = %aggregate_id, dimensions = %point, document = %id, "removing");
        self.index.delete_documents(&[id])
    }

    pub fn build(&self) -> Result<BuildReport> { self.build_with_progress(|_| {}) }

    /// Recreate the index and index every fulltext root of the configured
    /// workspace. The tree is walked once per dimension point; each aggregate
    /// is indexed once. The first failure aborts the run.
    pub fn build_with_progress(&self, mut progress: impl FnMut(&Node)) -> Result<BuildReport> {
        info!(index = self.index.index_name(), "recreating index");
        self.index.recreate_index()?;

        let mut seen = HashSet::new();
        let mut report = BuildReport::default();
        for point in self.target_points() {
            let mut stack = self.tree.find_root_nodes(&self.settings.workspace, &point)?;
            stack.reverse();
            while let Some(node) = stack.pop() {
                if self.schema.is_fulltext_root(&node.node_type) && seen.insert(node.aggregate_id.clone()) {
                    if let Some(documents) = self.index_node(&node)? {
                        report.aggregates += 1;
                        report.documents += documents;
                        progress(&node);
                    }
                }
                let mut children = self.tree.find_children(&node, &NodeTypeFilter::any())?;
                children.reverse();
                stack.extend(children);
            }
        }
        info!(aggregates = report.aggregates, documents = report.documents, "build finished");
        Ok(report)
    }

    fn target_points(&self) -> BTreeSet<DimensionSpacePoint> {
        let points = self.dimensions.all_dimension_combinations();
        if points.is_empty() {
            return BTreeSet::from([DimensionSpacePoint::without_dimensions()]);
        }
        points
    }

    fn delete(&self, ids: &[DocumentId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        debug!(count = ids.len(), "deleting indexed variants");
        self.index.delete_documents(ids)
    }

    fn add(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        self.index.add_documents(documents)
    }
}
