//! Destination filter tree
//!
//! Sources are roots; each data node hangs under the source it was imported
//! from. Reload identity is an explicit map from `(source node, sub-unit name)`
//! to node id, maintained as nodes are created, so a reload never has to walk
//! children comparing display names.

mod node;

pub use node::{FilterNode, NodeId, NodeKind};

use crate::error::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

/// Shared handle to a tree node
pub type NodeHandle<G> = Arc<FilterNode<G>>;

struct TreeInner<G> {
    nodes: Vec<NodeHandle<G>>,
    children: Vec<Vec<NodeId>>,
    roots: Vec<NodeId>,
    sources: HashMap<String, NodeId>,
    by_name: HashMap<(NodeId, String), NodeId>,
    selection: Option<NodeId>,
}

/// Thread-safe filter tree
pub struct FilterTree<G> {
    inner: RwLock<TreeInner<G>>,
}

impl<G> FilterTree<G> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TreeInner {
                nodes: Vec::new(),
                children: Vec::new(),
                roots: Vec::new(),
                sources: HashMap::new(),
                by_name: HashMap::new(),
                selection: None,
            }),
        }
    }

    /// Append a new root for `source_id`.
    ///
    /// Importing the same source twice creates a second root; lookups by
    /// source id resolve to the most recent one.
    pub fn add_source(&self, source_id: &str) -> NodeHandle<G> {
        let mut inner = self.inner.write();
        let id = inner.nodes.len();
        let node = Arc::new(FilterNode::source(id, source_id));
        inner.nodes.push(Arc::clone(&node));
        inner.children.push(Vec::new());
        inner.roots.push(id);
        inner.sources.insert(source_id.to_string(), id);
        node
    }

    /// Append a data node as the last child of `parent`
    pub fn add_child(&self, parent: NodeId, name: String, staged: G) -> Option<NodeHandle<G>> {
        let mut inner = self.inner.write();
        let source_id = inner.nodes.get(parent)?.name().to_string();
        let id = inner.nodes.len();
        let node = Arc::new(FilterNode::data(id, parent, name.clone(), &source_id, staged));
        inner.nodes.push(Arc::clone(&node));
        inner.children.push(Vec::new());
        inner.children[parent].push(id);
        inner.by_name.insert((parent, name), id);
        Some(node)
    }

    /// Most recent root imported for `source_id`
    pub fn source(&self, source_id: &str) -> Option<NodeHandle<G>> {
        let inner = self.inner.read();
        inner
            .sources
            .get(source_id)
            .map(|&id| Arc::clone(&inner.nodes[id]))
    }

    /// Child of `parent` created for the sub-unit called `name`
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeHandle<G>> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(&(parent, name.to_string()))
            .map(|&id| Arc::clone(&inner.nodes[id]))
    }

    pub fn node(&self, id: NodeId) -> Option<NodeHandle<G>> {
        self.inner.read().nodes.get(id).cloned()
    }

    /// Children of `id` in attachment order
    pub fn children(&self, id: NodeId) -> Vec<NodeHandle<G>> {
        let inner = self.inner.read();
        inner
            .children
            .get(id)
            .map(|ids| ids.iter().map(|&c| Arc::clone(&inner.nodes[c])).collect())
            .unwrap_or_default()
    }

    /// Root nodes in creation order
    pub fn roots(&self) -> Vec<NodeHandle<G>> {
        let inner = self.inner.read();
        inner
            .roots
            .iter()
            .map(|&id| Arc::clone(&inner.nodes[id]))
            .collect()
    }

    /// Total node count, roots included
    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make `id` the active selection
    pub fn select(&self, id: NodeId) {
        let mut inner = self.inner.write();
        if id < inner.nodes.len() {
            inner.selection = Some(id);
        }
    }

    pub fn selection(&self) -> Option<NodeHandle<G>> {
        let inner = self.inner.read();
        inner.selection.map(|id| Arc::clone(&inner.nodes[id]))
    }

    /// Describe the tree without its geometry
    pub fn snapshot(&self) -> TreeSnapshot {
        let inner = self.inner.read();
        let roots = inner
            .roots
            .iter()
            .map(|&id| snapshot_node(&inner, id))
            .collect();
        TreeSnapshot {
            generated_at: chrono::Utc::now(),
            node_count: inner.nodes.len(),
            selection: inner.selection.map(|id| inner.nodes[id].name().to_string()),
            roots,
        }
    }
}

impl<G> Default for FilterTree<G> {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_node<G>(inner: &TreeInner<G>, id: NodeId) -> NodeSnapshot {
    let node = &inner.nodes[id];
    NodeSnapshot {
        name: node.name().to_string(),
        kind: node.kind(),
        tooltip: node.tooltip().to_string(),
        applied: node.is_applied(),
        generation: node.generation(),
        children: inner.children[id]
            .iter()
            .map(|&c| snapshot_node(inner, c))
            .collect(),
    }
}

/// Serializable description of a [`FilterTree`]
#[derive(Debug, Clone, Serialize)]
pub struct TreeSnapshot {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub node_count: usize,
    pub selection: Option<String>,
    pub roots: Vec<NodeSnapshot>,
}

/// Serializable description of one node and its subtree
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub kind: NodeKind,
    pub tooltip: String,
    pub applied: bool,
    pub generation: u64,
    pub children: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
    /// Write the snapshot as pretty-printed JSON
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
