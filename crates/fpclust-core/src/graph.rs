//! Sparse k-nearest-neighbor similarity graph.
//!
//! [`GraphBuilder`] asks an [`AnnIndex`] for every item's nearest neighbors
//! and packs the answers into a compressed sparse row layout with `f16`
//! weights. A sampled consistency audit re-queries the index and rejects the
//! graph if any stored row disagrees with a fresh answer.
//!
//! # Layout
//!
//! ```text
//! indptr:  [0, 3, 5, ...]            row i spans indptr[i]..indptr[i + 1]
//! indices: [4, 9, 1, 0, 7, ...]      neighbor ids, in query order
//! data:    [0.93, 0.88, 0.71, ...]   similarities as f16
//! ```

use crate::error::{Error, Result};
use crate::index::{AnnIndex, Neighbor};
use half::f16;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Neighbors requested per item when nothing else is configured.
pub const DEFAULT_K: usize = 25;

/// Lower bound on the search width used for graph queries.
pub const DEFAULT_SEARCH_FLOOR: usize = 50;

/// Rows re-checked by the consistency audit.
pub const DEFAULT_AUDIT_SAMPLES: usize = 50;

/// Largest accepted difference between a stored and a fresh similarity.
///
/// `f16` keeps 11 significant bits, so values in `[0.5, 1]` round by at most
/// `2^-12`.
pub const DEFAULT_TOLERANCE: f32 = 1e-3;

/// Directed, weighted kNN graph over item ids `0..N` in CSR form.
///
/// Row `i` lists the neighbors of item `i` in the order the index returned
/// them, so rows are sorted by descending similarity. Rows hold at most `k`
/// entries and never contain `i` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborGraph {
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f16>,
}

impl NeighborGraph {
    /// Builds a graph from explicit `(neighbor, similarity)` rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a row references an id outside
    /// `0..rows.len()`, links a node to itself, or carries a similarity that
    /// is not a finite value in `[0, 1]`.
    pub fn from_rows(rows: &[Vec<(usize, f32)>]) -> Result<Self> {
        let n = rows.len();
        if u32::try_from(n).is_err() {
            return Err(Error::InvalidArgument(format!("{n} nodes exceed u32 ids")));
        }

        let nnz = rows.iter().map(Vec::len).sum();
        let mut indptr = Vec::with_capacity(n + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        indptr.push(0);

        for (node, row) in rows.iter().enumerate() {
            for &(neighbor, similarity) in row {
                if neighbor >= n {
                    return Err(Error::InvalidArgument(format!(
                        "node {node} links to {neighbor}, graph has {n} nodes"
                    )));
                }
                if neighbor == node {
                    return Err(Error::InvalidArgument(format!("node {node} links to itself")));
                }
                if !(0.0..=1.0).contains(&similarity) {
                    return Err(Error::InvalidArgument(format!(
                        "similarity {similarity} of edge {node} -> {neighbor} is outside [0, 1]"
                    )));
                }
                indices.push(neighbor as u32);
                data.push(f16::from_f32(similarity));
            }
            indptr.push(indices.len());
        }

        Ok(Self {
            indptr,
            indices,
            data,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    /// Number of stored edges.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// `(neighbor, similarity)` pairs of `node`, empty for unknown nodes.
    pub fn row(&self, node: usize) -> impl ExactSizeIterator<Item = (usize, f32)> + '_ {
        let span = match (self.indptr.get(node), self.indptr.get(node + 1)) {
            (Some(&start), Some(&end)) => start..end,
            _ => 0..0,
        };
        self.indices[span.clone()]
            .iter()
            .zip(&self.data[span])
            .map(|(&j, &w)| (j as usize, w.to_f32()))
    }

    /// Every edge as `(node, neighbor, similarity)`, row by row.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.n_nodes()).flat_map(move |i| self.row(i).map(move |(j, w)| (i, j, w)))
    }

    /// Row offsets, `n_nodes() + 1` entries.
    #[must_use]
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    /// Neighbor ids of all rows, concatenated.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Stored similarities, aligned with [`indices`](Self::indices).
    #[must_use]
    pub fn weights(&self) -> &[f16] {
        &self.data
    }

    fn from_neighbor_rows(rows: Vec<Vec<Neighbor>>) -> Self {
        let nnz = rows.iter().map(Vec::len).sum();
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut data = Vec::with_capacity(nnz);
        indptr.push(0);
        for row in rows {
            for neighbor in row {
                indices.push(neighbor.id as u32);
                data.push(f16::from_f32(neighbor.similarity));
            }
            indptr.push(indices.len());
        }
        Self {
            indptr,
            indices,
            data,
        }
    }
}

/// Turns a built index into a [`NeighborGraph`] and audits the result.
///
/// # Example
///
/// ```rust
/// use fpclust_core::{AnnIndex, Fingerprint, GraphBuilder, IndexParams, Metric};
///
/// let fps = (0..8)
///     .map(|i| Fingerprint::from_positions(16, &[i % 4, 4 + i % 2, 8]))
///     .collect::<Result<Vec<_>, _>>()?;
/// let index = AnnIndex::from_fingerprints(fps, 16, Metric::Angular, IndexParams::fast(), 1)?;
///
/// let graph = GraphBuilder::new(3).build_and_audit(&index)?;
/// assert_eq!(graph.n_nodes(), 8);
/// # Ok::<(), fpclust_core::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphBuilder {
    /// Neighbors per item.
    pub k: usize,
    /// Minimum search width; queries use `max(2k, search_floor)`.
    pub search_floor: usize,
    /// Number of rows re-checked by [`audit`](Self::audit).
    pub audit_samples: usize,
    /// Accepted absolute difference between stored and fresh similarities.
    pub tolerance: f32,
    /// Seed for picking audited rows.
    pub seed: u64,
    /// Query workers. Memory per worker is one search beam.
    pub parallelism: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl GraphBuilder {
    /// Creates a builder for `k` neighbors per item with default settings.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            search_floor: DEFAULT_SEARCH_FLOOR,
            audit_samples: DEFAULT_AUDIT_SAMPLES,
            tolerance: DEFAULT_TOLERANCE,
            seed: 0,
            parallelism: 1,
        }
    }

    /// Sets the number of query workers.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets the audit seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Search width used for every graph query.
    #[must_use]
    pub fn search_width(&self) -> usize {
        self.k.saturating_mul(2).max(self.search_floor)
    }

    /// Queries every item and assembles the graph.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for `k == 0` or `parallelism == 0`.
    /// - [`Error::NotBuilt`] / [`Error::EmptyIndex`] for an unusable index.
    pub fn build(&self, index: &AnnIndex) -> Result<NeighborGraph> {
        self.build_with_progress(index, || {})
    }

    /// Like [`build`](Self::build), calling `on_row` once per finished row.
    ///
    /// `on_row` runs on the worker threads.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_with_progress<F>(&self, index: &AnnIndex, on_row: F) -> Result<NeighborGraph>
    where
        F: Fn() + Sync,
    {
        self.check_args()?;
        if !index.is_built() {
            return Err(Error::NotBuilt);
        }
        let n = index.len();
        if n == 0 {
            return Err(Error::EmptyIndex);
        }

        let width = self.search_width();
        debug!(
            items = n,
            k = self.k,
            search_width = width,
            parallelism = self.parallelism,
            "Building kNN graph"
        );
        let start = Instant::now();

        let query_row = |node: usize| -> Result<Vec<Neighbor>> {
            let row = index.query_by_id(node, self.k, width)?;
            on_row();
            Ok(row)
        };

        let rows: Vec<_> = if self.parallelism == 1 {
            (0..n).map(query_row).collect::<Result<_>>()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.parallelism)
                .thread_name(|i| format!("fpclust-graph-{i}"))
                .build()
                .map_err(|e| Error::Internal(format!("failed to start graph pool: {e}")))?;
            pool.install(|| (0..n).into_par_iter().map(query_row).collect::<Result<_>>())?
        };

        let graph = NeighborGraph::from_neighbor_rows(rows);
        info!(
            nodes = graph.n_nodes(),
            edges = graph.nnz(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built kNN graph"
        );
        Ok(graph)
    }

    /// Re-queries a seeded sample of rows and compares them to `graph`.
    ///
    /// A row passes when its neighbor ids equal the fresh result as a set and
    /// every stored similarity is within `tolerance` of the fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Consistency`] for the first row that fails, or if
    /// graph and index disagree on the number of items.
    /// [`Error::InvalidArgument`] if `audit_samples` is zero.
    pub fn audit(&self, graph: &NeighborGraph, index: &AnnIndex) -> Result<()> {
        self.check_audit_args()?;
        let n = graph.n_nodes();
        if n != index.len() {
            return Err(Error::Consistency {
                node: n.min(index.len()),
                reason: format!("graph has {n} nodes, index has {} items", index.len()),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sample =
            rand::seq::index::sample(&mut rng, n, self.audit_samples.min(n)).into_vec();
        sample.sort_unstable();

        let width = self.search_width();
        for &node in &sample {
            let fresh: FxHashMap<usize, f32> = index
                .query_by_id(node, self.k, width)?
                .into_iter()
                .map(|nb| (nb.id, nb.similarity))
                .collect();

            let stored = graph.row(node);
            if stored.len() != fresh.len() {
                return Err(Error::Consistency {
                    node,
                    reason: format!(
                        "stored row has {} neighbors, fresh query returns {}",
                        stored.len(),
                        fresh.len()
                    ),
                });
            }
            for (neighbor, similarity) in stored {
                let Some(&expected) = fresh.get(&neighbor) else {
                    return Err(Error::Consistency {
                        node,
                        reason: format!("neighbor {neighbor} is missing from a fresh query"),
                    });
                };
                if (similarity - expected).abs() > self.tolerance {
                    return Err(Error::Consistency {
                        node,
                        reason: format!(
                            "similarity to {neighbor} is {similarity}, fresh query gives {expected}"
                        ),
                    });
                }
            }
        }

        debug!(sampled = sample.len(), "kNN graph audit passed");
        Ok(())
    }

    /// [`build`](Self::build) followed by [`audit`](Self::audit).
    ///
    /// # Errors
    ///
    /// Any error of either step; on audit failure no graph is returned.
    pub fn build_and_audit(&self, index: &AnnIndex) -> Result<NeighborGraph> {
        self.check_audit_args()?;
        let graph = self.build(index)?;
        self.audit(&graph, index)?;
        Ok(graph)
    }

    fn check_args(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::InvalidArgument("k must be >= 1".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidArgument("parallelism must be >= 1".into()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "tolerance must be a finite value >= 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    fn check_audit_args(&self) -> Result<()> {
        self.check_args()?;
        if self.audit_samples == 0 {
            return Err(Error::InvalidArgument(
                "audit_samples must be >= 1, the audit cannot be skipped".into(),
            ));
        }
        Ok(())
    }
}
