//! HNSW layer adjacency, mutable while building.

use parking_lot::RwLock;

/// Unique identifier for a node in the graph.
pub type NodeId = usize;

/// A single layer in the HNSW hierarchy during construction.
///
/// Every node owns its own lock, so concurrent inserts only contend when they
/// touch the same adjacency list.
#[derive(Debug)]
pub(crate) struct Layer {
    pub(crate) neighbors: Vec<RwLock<Vec<NodeId>>>,
}

impl Layer {
    /// Creates a layer with an empty adjacency list for `capacity` nodes.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            neighbors: (0..capacity).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    /// Copies the neighbors of `node_id` into `out`, clearing it first.
    pub(crate) fn neighbors_into(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        out.clear();
        if let Some(list) = self.neighbors.get(node_id) {
            out.extend_from_slice(&list.read());
        }
    }

    /// Sets the neighbors for a node.
    pub(crate) fn set_neighbors(&self, node_id: NodeId, neighbors: Vec<NodeId>) {
        if let Some(list) = self.neighbors.get(node_id) {
            *list.write() = neighbors;
        }
    }

    /// Drops the locks and narrows ids to `u32` for the read-only graph.
    pub(crate) fn freeze(self) -> Vec<Vec<u32>> {
        self.neighbors
            .into_iter()
            .map(|list| list.into_inner().into_iter().map(|n| n as u32).collect())
            .collect()
    }
}
