//! # `fpclust` Core
//!
//! Hierarchical clustering of large collections of binary fingerprints.
//!
//! The pipeline never materializes a full distance matrix:
//!
//! 1. [`FingerprintStore`] persists fixed-length bit vectors, 8 bits per byte.
//! 2. [`AnnIndex`] builds an HNSW proximity graph for approximate k-NN queries.
//! 3. [`GraphBuilder`] turns the index into a sparse kNN [`NeighborGraph`] and
//!    audits it against fresh queries.
//! 4. [`HierarchicalClusterer`] merges along graph edges into a [`Dendrogram`].
//! 5. [`straight_cut`] and [`balanced_cut`] flatten the dendrogram.
//!
//! ## Quick Start
//!
//! ```rust
//! use fpclust_core::{straight_cut, FpclustConfig, Fingerprint, Pipeline};
//!
//! let fingerprints = (0..6)
//!     .map(|i| {
//!         let base = if i < 3 { 0 } else { 4 };
//!         Fingerprint::from_positions(8, &[base, base + 1, base + 2 + i % 2])
//!     })
//!     .collect::<Result<Vec<_>, _>>()?;
//!
//! let mut config = FpclustConfig::default();
//! config.graph.k = 3;
//! let artifacts = Pipeline::new(config)?.run(fingerprints)?;
//!
//! let clusters = straight_cut(&artifacts.dendrogram, Some(2), None)?;
//! assert_eq!(clusters.sizes(), &[3, 3]);
//! # Ok::<(), fpclust_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// =============================================================================
// NUMERIC CAST LINTS
// =============================================================================
// Item ids are stored as u32 in graph structures; the index rejects more
// than u32::MAX items before any narrowing cast happens.
// =============================================================================
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
// =============================================================================
// STYLISTIC LINTS - Safe to allow globally (no bug risk)
// =============================================================================
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::similar_names)]

pub mod cluster;
pub mod config;
#[cfg(test)]
mod config_tests;
pub mod cut;
pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod index;
pub mod pipeline;
pub mod store;

pub use cluster::{Dendrogram, HierarchicalClusterer, Linkage, Merge};
pub use config::{
    ClusterConfig, ConfigError, FpclustConfig, GraphConfig, IndexConfig, LoggingConfig,
};
pub use cut::{balanced_cut, straight_cut, ClusterAssignment, CutPolicy};
pub use error::{Error, Result};
pub use fingerprint::{FeatureEncoder, Fingerprint};
pub use graph::{GraphBuilder, NeighborGraph};
pub use index::{AnnIndex, IndexParams, Metric, Neighbor, NodeId};
pub use pipeline::{Pipeline, PipelineArtifacts};
pub use store::FingerprintStore;
