//! Arena-backed content tree keyed by (workspace, aggregate id, dimension
//! point). Each dimension point holds its own parent/child structure.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema::NodeTypeFilter;
use crate::traits::TreeAccessor;
use crate::types::{DimensionSpacePoint, Node, NodeAggregateId, PropertyValue, WorkspaceName};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    workspace: WorkspaceName,
    aggregate_id: NodeAggregateId,
    point: DimensionSpacePoint,
}

impl NodeKey {
    fn of(node: &Node) -> Self {
        Self {
            workspace: node.workspace.clone(),
            aggregate_id: node.aggregate_id.clone(),
            point: node.dimension_space_point.clone(),
        }
    }

    fn sibling(&self, aggregate_id: &NodeAggregateId) -> Self {
        Self { workspace: self.workspace.clone(), aggregate_id: aggregate_id.clone(), point: self.point.clone() }
    }
}

/// One node of a JSON content snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub parent: Option<NodeAggregateId>,
    #[serde(flatten)]
    pub node: Node,
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<NodeKey, Node>,
    parents: HashMap<NodeKey, NodeAggregateId>,
    children: HashMap<NodeKey, Vec<NodeAggregateId>>,
    roots: BTreeMap<(WorkspaceName, DimensionSpacePoint), Vec<NodeAggregateId>>,
}

#[derive(Debug, Default)]
pub struct ContentGraph {
    state: RwLock<GraphState>,
}

impl ContentGraph {
    pub fn new() -> Self { Self::default() }

    pub fn insert_root(&self, node: Node) -> Result<()> {
        let mut state = self.write()?;
        let key = NodeKey::of(&node);
        if state.nodes.contains_key(&key) {
            return Err(Error::Tree(format!("node {} already exists in {}", node.aggregate_id, node.dimension_space_point)));
        }
        state
            .roots
            .entry((key.workspace.clone(), key.point.clone()))
            .or_default()
            .push(key.aggregate_id.clone());
        state.nodes.insert(key, node);
        Ok(())
    }

    /// Append `node` as last child of `parent` in the node's own workspace
    /// and dimension point.
    pub fn insert_child(&self, parent: &NodeAggregateId, node: Node) -> Result<()> {
        let mut state = self.write()?;
        let key = NodeKey::of(&node);
        let parent_key = key.sibling(parent);
        if !state.nodes.contains_key(&parent_key) {
            return Err(Error::NotFound(format!("parent {parent} in {}", key.point)));
        }
        if state.nodes.contains_key(&key) {
            return Err(Error::Tree(format!("node {} already exists in {}", node.aggregate_id, node.dimension_space_point)));
        }
        state.children.entry(parent_key).or_default().push(key.aggregate_id.clone());
        state.parents.insert(key.clone(), parent.clone());
        state.nodes.insert(key, node);
        Ok(())
    }

    /// Remove a node variant and its whole subtree; returns the removed node.
    pub fn remove(
        &self,
        workspace: &WorkspaceName,
        aggregate_id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Result<Option<Node>> {
        let mut state = self.write()?;
        let key = NodeKey { workspace: workspace.clone(), aggregate_id: aggregate_id.clone(), point: point.clone() };
        let Some(removed) = state.nodes.remove(&key) else { return Ok(None) };

        match state.parents.remove(&key) {
            Some(parent) => {
                if let Some(siblings) = state.children.get_mut(&key.sibling(&parent)) {
                    siblings.retain(|id| id != aggregate_id);
                }
            }
            None => {
                if let Some(roots) = state.roots.get_mut(&(workspace.clone(), point.clone())) {
                    roots.retain(|id| id != aggregate_id);
                }
            }
        }
        let mut stack = state.children.remove(&key).unwrap_or_default();
        while let Some(child) = stack.pop() {
            let child_key = key.sibling(&child);
            state.nodes.remove(&child_key);
            state.parents.remove(&child_key);
            stack.extend(state.children.remove(&child_key).unwrap_or_default());
        }
        Ok(Some(removed))
    }

    /// Set (or, with `Value::Null`, clear) a property on one node variant.
    pub fn set_property(
        &self,
        workspace: &WorkspaceName,
        aggregate_id: &NodeAggregateId,
        point: &DimensionSpacePoint,
        name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let mut state = self.write()?;
        let key = NodeKey { workspace: workspace.clone(), aggregate_id: aggregate_id.clone(), point: point.clone() };
        let node = state
            .nodes
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(format!("node {aggregate_id} in {point}")))?;
        if value.is_null() {
            node.properties.remove(name);
        } else {
            node.properties.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub fn len(&self) -> usize { self.read().map(|s| s.nodes.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Build a graph from snapshot records. Records may come in any order as
    /// long as every parent is present somewhere in the list.
    pub fn from_records(records: Vec<NodeRecord>) -> Result<Self> {
        let graph = Self::new();
        let mut pending = records;
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for record in pending {
                let inserted = match &record.parent {
                    None => graph.insert_root(record.node.clone()).map(|_| true)?,
                    Some(parent) => match graph.insert_child(parent, record.node.clone()) {
                        Ok(()) => true,
                        Err(Error::NotFound(_)) => false,
                        Err(e) => return Err(e),
                    },
                };
                if !inserted {
                    deferred.push(record);
                }
            }
            if deferred.len() == before {
                let missing: Vec<String> = deferred.iter().map(|r| r.node.aggregate_id.to_string()).collect();
                return Err(Error::Tree(format!("unresolvable parents for nodes: {}", missing.join(", "))));
            }
            pending = deferred;
        }
        debug!(nodes = graph.len(), "content graph built");
        Ok(graph)
    }

    pub fn from_json_str(json: &str) -> Result<Self> { Self::from_records(serde_json::from_str(json)?) }

    /// Load a snapshot file, or every `*.json` file below a directory.
    pub fn load(path: &Path) -> Result<Self> {
        let mut files = Vec::new();
        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
                if entry.path().extension().and_then(|s| s.to_str()) == Some("json") {
                    files.push(entry.path().to_path_buf());
                }
            }
            files.sort();
        } else {
            files.push(path.to_path_buf());
        }
        let mut records: Vec<NodeRecord> = Vec::new();
        for file in &files {
            let content = std::fs::read_to_string(file)
                .map_err(|e| Error::NotFound(format!("{}: {e}", file.display())))?;
            records.extend(serde_json::from_str::<Vec<NodeRecord>>(&content)?);
        }
        info!(files = files.len(), records = records.len(), "content snapshot loaded");
        Self::from_records(records)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, GraphState>> {
        self.state.read().map_err(|_| Error::Tree("content graph lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, GraphState>> {
        self.state.write().map_err(|_| Error::Tree("content graph lock poisoned".to_string()))
    }
}

impl TreeAccessor for ContentGraph {
    fn find_parent(&self, node: &Node) -> Result<Option<Node>> {
        let state = self.read()?;
        let key = NodeKey::of(node);
        let Some(parent) = state.parents.get(&key) else { return Ok(None) };
        match state.nodes.get(&key.sibling(parent)) {
            Some(found) => Ok(Some(found.clone())),
            None => Err(Error::Tree(format!("parent {parent} of {} is missing", node.aggregate_id))),
        }
    }

    fn find_children(&self, node: &Node, filter: &NodeTypeFilter) -> Result<Vec<Node>> {
        let state = self.read()?;
        let key = NodeKey::of(node);
        let Some(children) = state.children.get(&key) else { return Ok(Vec::new()) };
        Ok(children
            .iter()
            .filter_map(|id| state.nodes.get(&key.sibling(id)))
            .filter(|child| filter.matches(&child.node_type))
            .cloned()
            .collect())
    }

    fn find_by_aggregate_id_in_dimension(
        &self,
        workspace: &WorkspaceName,
        aggregate_id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Result<Option<Node>> {
        let key = NodeKey { workspace: workspace.clone(), aggregate_id: aggregate_id.clone(), point: point.clone() };
        Ok(self.read()?.nodes.get(&key).cloned())
    }

    fn find_root_nodes(&self, workspace: &WorkspaceName, point: &DimensionSpacePoint) -> Result<Vec<Node>> {
        let state = self.read()?;
        let Some(roots) = state.roots.get(&(workspace.clone(), point.clone())) else { return Ok(Vec::new()) };
        Ok(roots
            .iter()
            .filter_map(|id| {
                state.nodes.get(&NodeKey { workspace: workspace.clone(), aggregate_id: id.clone(), point: point.clone() })
            })
            .cloned()
            .collect())
    }
}
