use tracing::debug;

use nodesearch_core::traits::{NodeTypeSchema, TreeAccessor};
use nodesearch_core::types::Node;

/// Nearest node, starting with `node` itself, whose type is a fulltext root.
///
/// `None` means the node is not indexable. A parent that cannot be resolved
/// ends the walk with `None` as well.
pub fn find_fulltext_root(node: &Node, tree: &dyn TreeAccessor, schema: &dyn NodeTypeSchema) -> Option<Node> {
    let mut current = node.clone();
    loop {
        if schema.is_fulltext_root(&current.node_type) {
            return Some(current);
        }
        current = match tree.find_parent(&current) {
            Ok(Some(parent)) => parent,
            Ok(None) => return None,
            Err(e) => {
                debug!(aggregate = %node.aggregate_id, error = %e, "parent lookup failed, node not indexable");
                return None;
            }
        };
    }
}
