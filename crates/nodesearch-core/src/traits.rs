use std::collections::BTreeSet;

use crate::error::Result;
use crate::filter::quote;
use crate::schema::{FulltextExtractor, NodeTypeFilter};
use crate::search::{SearchParameters, SearchResult};
use crate::types::{fields, DimensionSpacePoint, Document, DocumentId, Node, NodeAggregateId, NodeTypeName, WorkspaceName};

/// Upper bound used when listing every document of one aggregate.
const IDENTIFIER_LOOKUP_LIMIT: usize = 10_000;

/// The search index the engine writes documents into.
///
/// Every call is a blocking round trip; failures surface as
/// [`crate::error::Error::Backend`] and are never retried here.
pub trait IndexBackend: Send + Sync {
    fn index_name(&self) -> &str;

    /// Create the index (if missing) and apply its settings.
    fn create_index(&self) -> Result<()>;

    /// Drop the index with its documents and settings, then create it empty.
    fn recreate_index(&self) -> Result<()> {
        self.create_index()?;
        self.delete_all_documents()
    }

    /// Add or fully replace documents, keyed by `id`.
    fn add_documents(&self, documents: &[Document]) -> Result<()>;

    fn delete_documents(&self, ids: &[DocumentId]) -> Result<()>;

    fn delete_all_documents(&self) -> Result<()>;

    fn search(&self, query: &str, parameters: &SearchParameters) -> Result<SearchResult>;

    /// Ids of every indexed variant of an aggregate, regardless of dimension.
    fn find_identifiers_by_aggregate(&self, aggregate_id: &NodeAggregateId) -> Result<Vec<DocumentId>> {
        let parameters = SearchParameters {
            filter: vec![format!("{} = {}", fields::IDENTIFIER, quote(aggregate_id.as_str()))],
            limit: Some(IDENTIFIER_LOOKUP_LIMIT),
            ..SearchParameters::default()
        };
        Ok(self.search("", &parameters)?.document_ids())
    }

    fn find_identifiers_by_aggregate_and_dimension_hash(
        &self,
        aggregate_id: &NodeAggregateId,
        dimensions_hash: &str,
    ) -> Result<Vec<DocumentId>> {
        let parameters = SearchParameters {
            filter: vec![
                format!("{} = {}", fields::IDENTIFIER, quote(aggregate_id.as_str())),
                format!("{} = {}", fields::DIMENSIONS_HASH, quote(dimensions_hash)),
            ],
            limit: Some(IDENTIFIER_LOOKUP_LIMIT),
            ..SearchParameters::default()
        };
        Ok(self.search("", &parameters)?.document_ids())
    }
}

/// Read access to the content tree of one repository.
pub trait TreeAccessor: Send + Sync {
    /// Parent in the same workspace and dimension point; `None` at the top.
    fn find_parent(&self, node: &Node) -> Result<Option<Node>>;

    /// Children in document order, restricted to `filter`.
    fn find_children(&self, node: &Node, filter: &NodeTypeFilter) -> Result<Vec<Node>>;

    fn find_by_aggregate_id_in_dimension(
        &self,
        workspace: &WorkspaceName,
        aggregate_id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Result<Option<Node>>;

    /// Top-level nodes of a workspace in one dimension point.
    fn find_root_nodes(&self, workspace: &WorkspaceName, point: &DimensionSpacePoint) -> Result<Vec<Node>>;
}

/// Per node type search configuration.
pub trait NodeTypeSchema: Send + Sync {
    fn is_fulltext_root(&self, node_type: &NodeTypeName) -> bool;

    fn is_fulltext_enabled(&self, node_type: &NodeTypeName) -> bool;

    /// `(property, extractor)` pairs declared for the type.
    fn extractors_for(&self, node_type: &NodeTypeName) -> Vec<(String, FulltextExtractor)>;

    /// The type itself followed by all of its supertypes.
    fn type_and_supertypes(&self, node_type: &NodeTypeName) -> Vec<NodeTypeName> { vec![node_type.clone()] }

    /// Concrete types that are, or inherit from, any of `types`.
    fn subtypes_of(&self, types: &[NodeTypeName]) -> NodeTypeFilter { NodeTypeFilter::only(types.iter().cloned()) }

    /// Document field a property is written to; `None` excludes it.
    fn property_field(&self, _node_type: &NodeTypeName, property: &str) -> Option<String> { Some(property.to_string()) }
}

/// Resolves the public URI of a node. Failures yield `None`, never an error.
pub trait LinkResolver: Send + Sync {
    fn resolve_uri(&self, node: &Node) -> Option<String>;
}

/// Supplies the dimension points that must be materialized.
pub trait DimensionSource: Send + Sync {
    fn all_dimension_combinations(&self) -> BTreeSet<DimensionSpacePoint>;
}
