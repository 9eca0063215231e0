use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{LinkResolver, TreeAccessor};
use crate::types::{Node, NodeTypeName};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub base_uri: String,
    pub segment_property: String,
    pub site_node_type: String,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            base_uri: "http://localhost".to_string(),
            segment_property: "uriPathSegment".to_string(),
            site_node_type: "Neos.Neos:Site".to_string(),
        }
    }
}

/// Builds absolute URIs from the `uriPathSegment` properties of a node and
/// its ancestors, up to the site node.
pub struct UriPathSegmentResolver {
    tree: Arc<dyn TreeAccessor>,
    settings: LinkSettings,
}

impl UriPathSegmentResolver {
    pub fn new(tree: Arc<dyn TreeAccessor>, settings: LinkSettings) -> Self { Self { tree, settings } }

    fn base(&self) -> &str { self.settings.base_uri.trim_end_matches('/') }

    fn is_site(&self, node: &Node) -> bool { node.node_type == NodeTypeName::new(self.settings.site_node_type.as_str()) }

    fn segment<'a>(&self, node: &'a Node) -> Option<&'a str> {
        node.property(&self.settings.segment_property)
            .and_then(|v| v.as_str())
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
    }
}

impl LinkResolver for UriPathSegmentResolver {
    fn resolve_uri(&self, node: &Node) -> Option<String> {
        if self.is_site(node) {
            return Some(format!("{}/", self.base()));
        }
        let mut segments = vec![self.segment(node)?.to_string()];
        let mut current = node.clone();
        loop {
            let parent = match self.tree.find_parent(&current) {
                Ok(Some(parent)) => parent,
                Ok(None) => break,
                Err(e) => {
                    debug!(aggregate = %node.aggregate_id, error = %e, "uri resolution failed");
                    return None;
                }
            };
            if self.is_site(&parent) {
                break;
            }
            // a document below a segment-less parent has no reachable route
            segments.push(self.segment(&parent)?.to_string());
            current = parent;
        }
        segments.reverse();
        Some(format!("{}/{}", self.base(), segments.join("/")))
    }
}
