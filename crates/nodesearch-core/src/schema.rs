//! Typed node-type search configuration.
//!
//! Declarations are read from configuration (see [`crate::config::Settings`])
//! and flattened once into a [`NodeTypeRegistry`]: supertype settings are
//! inherited in declaration order, later supertypes override earlier ones and
//! the type's own settings override everything inherited.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::NodeTypeSchema;
use crate::types::NodeTypeName;

/// How text is pulled out of a property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FulltextExtractor {
    /// Strip markup and append everything under `bucket`.
    Into { bucket: String },
    /// Heading contents go to `h1`..`h6`, the rest to `text`.
    HtmlContent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulltextSettings {
    #[serde(default)]
    pub is_root: Option<bool>,
    #[serde(default)]
    pub enable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeSearch {
    #[serde(default)]
    pub fulltext: FulltextSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySearch {
    #[serde(default)]
    pub fulltext_extractor: Option<FulltextExtractor>,
    /// `false` keeps the property out of the document.
    #[serde(default)]
    pub indexed: Option<bool>,
    /// Write the property under a different document field.
    #[serde(default)]
    pub index_as: Option<String>,
}

impl PropertySearch {
    fn merge(&mut self, other: &PropertySearch) {
        if other.fulltext_extractor.is_some() {
            self.fulltext_extractor = other.fulltext_extractor.clone();
        }
        if other.indexed.is_some() {
            self.indexed = other.indexed;
        }
        if other.index_as.is_some() {
            self.index_as = other.index_as.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(default)]
    pub search: PropertySearch,
}

/// One `[node_types."<Name>"]` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeDefinition {
    #[serde(default)]
    pub super_types: Vec<String>,
    #[serde(default)]
    pub search: NodeTypeSearch,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,
}

/// Restricts child lookups to a set of node types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTypeFilter {
    allowed: Option<BTreeSet<NodeTypeName>>,
}

impl NodeTypeFilter {
    pub fn any() -> Self { Self { allowed: None } }

    pub fn only(types: impl IntoIterator<Item = NodeTypeName>) -> Self {
        Self { allowed: Some(types.into_iter().collect()) }
    }

    pub fn matches(&self, node_type: &NodeTypeName) -> bool {
        self.allowed.as_ref().map_or(true, |set| set.contains(node_type))
    }
}

#[derive(Debug, Clone)]
struct ResolvedNodeType {
    lineage: Vec<NodeTypeName>,
    is_root: Option<bool>,
    enable: Option<bool>,
    properties: BTreeMap<String, PropertySearch>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: BTreeMap<NodeTypeName, ResolvedNodeType>,
}

impl NodeTypeRegistry {
    pub fn from_definitions(definitions: &BTreeMap<String, NodeTypeDefinition>) -> Result<Self> {
        let mut resolved = BTreeMap::new();
        for name in definitions.keys() {
            let mut visiting = BTreeSet::new();
            resolve(name, definitions, &mut resolved, &mut visiting)?;
        }
        debug!(count = resolved.len(), "node type schema resolved");
        Ok(Self { types: resolved.into_iter().map(|(k, v)| (NodeTypeName::new(k), v)).collect() })
    }

    pub fn contains(&self, node_type: &NodeTypeName) -> bool { self.types.contains_key(node_type) }

    pub fn len(&self) -> usize { self.types.len() }

    pub fn is_empty(&self) -> bool { self.types.is_empty() }
}

fn resolve(
    name: &str,
    definitions: &BTreeMap<String, NodeTypeDefinition>,
    resolved: &mut BTreeMap<String, ResolvedNodeType>,
    visiting: &mut BTreeSet<String>,
) -> Result<ResolvedNodeType> {
    if let Some(done) = resolved.get(name) {
        return Ok(done.clone());
    }
    if !visiting.insert(name.to_string()) {
        return Err(Error::InvalidConfig(format!("node type '{name}' inherits from itself")));
    }
    let definition = definitions
        .get(name)
        .ok_or_else(|| Error::InvalidConfig(format!("unknown node type '{name}'")))?;

    let mut node_type = ResolvedNodeType {
        lineage: vec![NodeTypeName::new(name)],
        is_root: None,
        enable: None,
        properties: BTreeMap::new(),
    };
    for super_type in &definition.super_types {
        let parent = resolve(super_type, definitions, resolved, visiting)?;
        for ancestor in parent.lineage {
            if !node_type.lineage.contains(&ancestor) {
                node_type.lineage.push(ancestor);
            }
        }
        node_type.is_root = parent.is_root.or(node_type.is_root);
        node_type.enable = parent.enable.or(node_type.enable);
        for (property, search) in &parent.properties {
            node_type.properties.entry(property.clone()).or_default().merge(search);
        }
    }
    node_type.is_root = definition.search.fulltext.is_root.or(node_type.is_root);
    node_type.enable = definition.search.fulltext.enable.or(node_type.enable);
    for (property, declared) in &definition.properties {
        node_type.properties.entry(property.clone()).or_default().merge(&declared.search);
    }

    visiting.remove(name);
    resolved.insert(name.to_string(), node_type.clone());
    Ok(node_type)
}

impl NodeTypeSchema for NodeTypeRegistry {
    fn is_fulltext_root(&self, node_type: &NodeTypeName) -> bool {
        self.types.get(node_type).and_then(|t| t.is_root).unwrap_or(false)
    }

    fn is_fulltext_enabled(&self, node_type: &NodeTypeName) -> bool {
        self.types.get(node_type).and_then(|t| t.enable).unwrap_or(false)
    }

    fn extractors_for(&self, node_type: &NodeTypeName) -> Vec<(String, FulltextExtractor)> {
        let Some(resolved) = self.types.get(node_type) else { return Vec::new() };
        resolved
            .properties
            .iter()
            .filter_map(|(property, search)| search.fulltext_extractor.clone().map(|e| (property.clone(), e)))
            .collect()
    }

    fn type_and_supertypes(&self, node_type: &NodeTypeName) -> Vec<NodeTypeName> {
        self.types.get(node_type).map_or_else(|| vec![node_type.clone()], |t| t.lineage.clone())
    }

    fn subtypes_of(&self, types: &[NodeTypeName]) -> NodeTypeFilter {
        let mut allowed: BTreeSet<NodeTypeName> = types.iter().cloned().collect();
        for (name, resolved) in &self.types {
            if resolved.lineage.iter().any(|ancestor| types.contains(ancestor)) {
                allowed.insert(name.clone());
            }
        }
        NodeTypeFilter::only(allowed)
    }

    fn property_field(&self, node_type: &NodeTypeName, property: &str) -> Option<String> {
        let search = self.types.get(node_type).and_then(|t| t.properties.get(property));
        match search {
            Some(s) if s.indexed == Some(false) => None,
            Some(s) => Some(s.index_as.clone().unwrap_or_else(|| property.to_string())),
            None => Some(property.to_string()),
        }
    }
}
