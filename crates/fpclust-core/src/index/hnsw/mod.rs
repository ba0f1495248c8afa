//! Native HNSW graph over binary fingerprints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  build: Builder                         │
//! │    layers: Vec<Layer>  (RwLock per node)│
//! │    entry:  RwLock<(NodeId, level)>      │
//! ├─────────────────────────────────────────┤
//! │  frozen: HnswGraph                      │
//! │    layers: Vec<Vec<Vec<u32>>>  (no locks)│
//! │    entry_point, max_layer               │
//! └─────────────────────────────────────────┘
//! ```

mod graph;
mod layer;
mod ordered_float;

pub(crate) use graph::HnswGraph;
pub use layer::NodeId;

#[cfg(test)]
mod graph_tests;
