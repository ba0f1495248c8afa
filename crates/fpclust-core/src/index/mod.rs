//! Approximate nearest-neighbor index over binary fingerprints.
//!
//! # Module Organization
//!
//! - `metric`: Angular and Tanimoto similarity on bit vectors
//! - `params`: Build parameters of the proximity graph
//! - `hnsw`: Native layered graph (construction, greedy search)
//! - `ann_index`: Public stage → build → query wrapper
//! - `persistence`: Save/load of a built index

mod ann_index;
mod hnsw;
mod metric;
mod params;
mod persistence;


pub use ann_index::{AnnIndex, Neighbor};
pub use hnsw::NodeId;
pub use metric::Metric;
pub use params::IndexParams;
