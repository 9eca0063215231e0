//! Read-side query builder.
//!
//! Accumulates a fulltext query and Meilisearch-style parameters, runs them
//! against an [`IndexBackend`] and maps hits back to live nodes through a
//! [`TreeAccessor`]. Hits whose node no longer resolves are dropped.

use std::collections::HashSet;
use std::fmt::Display;

use serde_json::Value;
use tracing::debug;

use nodesearch_core::error::Result;
use nodesearch_core::filter::quote;
use nodesearch_core::search::{FacetDistribution, MatchingStrategy, SearchParameters, SearchResult, DEFAULT_CROP_MARKER};
use nodesearch_core::traits::{IndexBackend, TreeAccessor};
use nodesearch_core::types::{fields, DimensionSpacePoint, Hit, Node, NodeAggregateId, WorkspaceName};

use crate::builder::node_paths;

/// Crop length applied by [`QueryBuilder::highlight`].
pub const HIGHLIGHT_CROP_LENGTH: usize = 20;

/// A raw hit together with the node it resolved to.
#[derive(Debug, Clone)]
pub struct ResolvedHit {
    pub node: Node,
    pub hit: Hit,
}

pub struct QueryBuilder<'a> {
    index: &'a dyn IndexBackend,
    tree: &'a dyn TreeAccessor,
    context: Option<Node>,
    query: String,
    parameters: SearchParameters,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(index: &'a dyn IndexBackend, tree: &'a dyn TreeAccessor) -> Self {
        Self { index, tree, context: None, query: String::new(), parameters: SearchParameters::default() }
    }

    /// Restrict results to `context` and its descendants, in the context's
    /// dimension point. Hits are resolved in the context's workspace.
    pub fn query(mut self, context: &Node) -> Result<Self> {
        let (path, _) = node_paths(self.tree, context)?;
        let path = quote(&path);
        self.parameters
            .filter
            .push(format!("({} = {path} OR {} = {path})", fields::PARENT_PATH, fields::PATH));
        self.parameters
            .filter
            .push(format!("{} = {}", fields::DIMENSIONS_HASH, quote(&context.dimension_space_point.hash())));
        self.context = Some(context.clone());
        Ok(self)
    }

    pub fn fulltext(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Raw filter expression, conjoined with the others.
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.parameters.filter.push(expression.into());
        self
    }

    pub fn exact_match(mut self, property: &str, value: impl Display) -> Self {
        self.parameters.filter.push(format!("{property} = {}", quote(&value.to_string())));
        self
    }

    pub fn exact_match_multiple<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Display,
    {
        for (property, value) in pairs {
            self = self.exact_match(property.as_ref(), value);
        }
        self
    }

    /// Match the node type or any of its subtypes.
    pub fn node_type(mut self, node_type: &str) -> Self {
        self.parameters.filter.push(format!("{} = {}", fields::TYPE_AND_SUPERTYPES, quote(node_type)));
        self
    }

    pub fn geo_radius(mut self, lat: f64, lng: f64, meters: f64) -> Self {
        self.parameters.filter.push(format!("_geoRadius({lat}, {lng}, {meters})"));
        self
    }

    pub fn sort_asc(mut self, property: &str) -> Self {
        self.parameters.sort.push(format!("{property}:asc"));
        self
    }

    pub fn sort_desc(mut self, property: &str) -> Self {
        self.parameters.sort.push(format!("{property}:desc"));
        self
    }

    pub fn sort_by_geo(mut self, lat: f64, lng: f64, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.parameters.sort.push(format!("_geoPoint({lat}, {lng}):{direction}"));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.parameters.limit = Some(limit);
        self
    }

    pub fn from(mut self, offset: usize) -> Self {
        self.parameters.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.parameters.page = Some(page);
        self
    }

    pub fn hits_per_page(mut self, hits_per_page: usize) -> Self {
        self.parameters.hits_per_page = Some(hits_per_page);
        self
    }

    /// Highlight and crop `attributes` with the given tags (`<em>` by default).
    pub fn highlight(mut self, attributes: &[&str], tags: Option<(&str, &str)>) -> Self {
        let attributes: Vec<String> = attributes.iter().map(|a| a.to_string()).collect();
        let (pre, post) = tags.unwrap_or(("<em>", "</em>"));
        self.parameters.attributes_to_crop = attributes.clone();
        self.parameters.attributes_to_highlight = attributes;
        self.parameters.crop_length = Some(HIGHLIGHT_CROP_LENGTH);
        self.parameters.highlight_pre_tag = Some(pre.to_string());
        self.parameters.highlight_post_tag = Some(post.to_string());
        self
    }

    pub fn crop(mut self, length: usize, marker: Option<&str>) -> Self {
        self.parameters.crop_length = Some(length);
        self.parameters.crop_marker = Some(marker.unwrap_or(DEFAULT_CROP_MARKER).to_string());
        self
    }

    pub fn matching_strategy(mut self, strategy: MatchingStrategy) -> Self {
        self.parameters.matching_strategy = Some(strategy);
        self
    }

    pub fn parameters(&self) -> &SearchParameters { &self.parameters }

    pub fn query_text(&self) -> &str { &self.query }

    /// The accumulated filters as sent to the backend.
    pub fn filter_string(&self) -> String { self.parameters.filter_expression().unwrap_or_default() }

    /// Matching nodes in hit order, one per aggregate.
    pub fn execute(&self) -> Result<Vec<Node>> { Ok(self.execute_raw()?.into_iter().map(|r| r.node).collect()) }

    /// Hits with their resolved nodes, one per aggregate.
    pub fn execute_raw(&self) -> Result<Vec<ResolvedHit>> {
        let result = self.search()?;
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(result.hits.len());
        for hit in result.hits {
            let Some(node) = self.resolve(&hit) else { continue };
            if seen.insert(node.aggregate_id.clone()) {
                resolved.push(ResolvedHit { node, hit });
            }
        }
        Ok(resolved)
    }

    /// Estimated number of matches.
    pub fn count(&self) -> Result<usize> {
        let result = self.search()?;
        Ok(result.estimated_total_hits.unwrap_or_else(|| result.total()))
    }

    pub fn total_hits(&self) -> Result<usize> { Ok(self.search()?.total()) }

    pub fn total_pages(&self) -> Result<usize> {
        let result = self.search()?;
        if let Some(pages) = result.total_pages {
            return Ok(pages);
        }
        let per_page = result.limit.unwrap_or(result.hits.len()).max(1);
        Ok(result.total().div_ceil(per_page))
    }

    /// Value counts of `facets` among all matches.
    pub fn facets(&mut self, facets: &[&str]) -> Result<FacetDistribution> {
        self.parameters.facets = facets.iter().map(|f| f.to_string()).collect();
        Ok(self.search()?.facet_distribution)
    }

    fn search(&self) -> Result<SearchResult> {
        debug!(index = self.index.index_name(), query = %self.query, filter = %self.filter_string(), "search");
        self.index.search(&self.query, &self.parameters)
    }

    fn resolve(&self, hit: &Hit) -> Option<Node> {
        let aggregate_id = NodeAggregateId::new(hit.get(fields::IDENTIFIER)?.as_str()?);
        let (workspace, point) = match &self.context {
            Some(context) => (context.workspace.clone(), context.dimension_space_point.clone()),
            None => {
                let workspace = hit
                    .get(fields::WORKSPACE)
                    .and_then(Value::as_str)
                    .map_or_else(WorkspaceName::live, WorkspaceName::new);
                let point: DimensionSpacePoint = serde_json::from_value(hit.get(fields::DIMENSIONS)?.clone()).ok()?;
                (workspace, point)
            }
        };
        match self.tree.find_by_aggregate_id_in_dimension(&workspace, &aggregate_id, &point) {
            Ok(Some(node)) => Some(node),
            Ok(None) => {
                debug!(aggregate = %aggregate_id, dimensions = %point, "stale hit dropped");
                None
            }
            Err(e) => {
                debug!(aggregate = %aggregate_id, error = %e, "hit resolution failed");
                None
            }
        }
    }
}
