//! Approximate nearest-neighbor index over fingerprints.

use super::hnsw::{HnswGraph, NodeId};
use super::metric::Metric;
use super::params::IndexParams;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use std::time::Instant;
use tracing::{debug, info};

/// One query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Item id.
    pub id: usize,
    /// Similarity to the query in `[0, 1]`.
    pub similarity: f32,
}

/// HNSW index with an explicit stage → build → query lifecycle.
///
/// Items are staged with [`insert`](Self::insert) under dense ids `0..N`.
/// [`build`](Self::build) links them into a graph that is read-only
/// afterwards; further inserts fail with [`Error::AlreadyBuilt`], and calling
/// `build` again rebuilds from the same items.
///
/// # Example
///
/// ```rust
/// use fpclust_core::{AnnIndex, Fingerprint, IndexParams, Metric};
///
/// let mut index = AnnIndex::new(16, Metric::Angular, IndexParams::fast());
/// for (id, pos) in [[0, 1, 2], [0, 1, 3], [8, 9, 10]].iter().enumerate() {
///     index.insert(id, Fingerprint::from_positions(16, pos)?)?;
/// }
/// index.build(1)?;
///
/// let hits = index.query_by_id(0, 1, 50)?;
/// assert_eq!(hits[0].id, 1);
/// # Ok::<(), fpclust_core::Error>(())
/// ```
#[derive(Debug)]
pub struct AnnIndex {
    fpsize: usize,
    metric: Metric,
    params: IndexParams,
    /// Items staged since the last build.
    staged: Vec<Option<Fingerprint>>,
    /// Items owned by the built graph.
    vectors: Vec<Fingerprint>,
    graph: Option<HnswGraph>,
}

impl AnnIndex {
    /// Creates an empty, unbuilt index for `fpsize`-bit fingerprints.
    #[must_use]
    pub fn new(fpsize: usize, metric: Metric, params: IndexParams) -> Self {
        Self {
            fpsize,
            metric,
            params,
            staged: Vec::new(),
            vectors: Vec::new(),
            graph: None,
        }
    }

    /// Creates an index, stages every fingerprint under its position and builds it.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert) and [`build`](Self::build).
    pub fn from_fingerprints(
        fingerprints: Vec<Fingerprint>,
        fpsize: usize,
        metric: Metric,
        params: IndexParams,
        parallelism: usize,
    ) -> Result<Self> {
        let mut index = Self::new(fpsize, metric, params);
        index.staged.reserve(fingerprints.len());
        for (id, fp) in fingerprints.into_iter().enumerate() {
            index.insert(id, fp)?;
        }
        index.build(parallelism)?;
        Ok(index)
    }

    pub(super) fn from_parts(
        fpsize: usize,
        metric: Metric,
        params: IndexParams,
        vectors: Vec<Fingerprint>,
        graph: HnswGraph,
    ) -> Self {
        Self {
            fpsize,
            metric,
            params,
            staged: Vec::new(),
            vectors,
            graph: Some(graph),
        }
    }

    /// Fingerprint size in bits.
    #[must_use]
    pub fn fpsize(&self) -> usize {
        self.fpsize
    }

    /// Similarity metric.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Build parameters.
    #[must_use]
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Number of items (built items once built, staged slots before).
    #[must_use]
    pub fn len(&self) -> usize {
        if self.is_built() {
            self.vectors.len()
        } else {
            self.staged.len()
        }
    }

    /// True if no item has been staged or built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once [`build`](Self::build) has succeeded.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.graph.is_some()
    }

    /// Built fingerprint for `id`, if any.
    #[must_use]
    pub fn vector(&self, id: usize) -> Option<&Fingerprint> {
        self.vectors.get(id)
    }

    /// Stages `vector` under `id`. Re-staging an id replaces the vector.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyBuilt`] if the index has been built.
    /// - [`Error::DimensionMismatch`] if the vector length is not `fpsize`.
    pub fn insert(&mut self, id: usize, vector: Fingerprint) -> Result<()> {
        if self.is_built() {
            return Err(Error::AlreadyBuilt);
        }
        if vector.len() != self.fpsize {
            return Err(Error::DimensionMismatch {
                expected: self.fpsize,
                actual: vector.len(),
            });
        }
        if id >= self.staged.len() {
            self.staged.resize(id + 1, None);
        }
        self.staged[id] = Some(vector);
        Ok(())
    }

    /// Links all staged items into the proximity graph.
    ///
    /// `parallelism` is the number of insertion workers. Each worker carries
    /// its own search buffers, so memory grows roughly with the worker
    /// count; use 1 for large corpora on constrained machines. With 1 worker
    /// the resulting graph is reproducible for a given seed.
    ///
    /// On failure the index is left as it was before the call.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyIndex`] if nothing was staged.
    /// - [`Error::InvalidArgument`] if an id in `0..N` was never staged,
    ///   `parallelism` is 0 or the parameters are invalid.
    pub fn build(&mut self, parallelism: usize) -> Result<()> {
        if parallelism == 0 {
            return Err(Error::InvalidArgument("parallelism must be >= 1".into()));
        }
        self.params.validate()?;

        let rebuilding = self.staged.is_empty();
        if rebuilding && self.vectors.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if let Some(missing) = self.staged.iter().position(Option::is_none) {
            return Err(Error::InvalidArgument(format!(
                "item {missing} was never inserted; ids must cover 0..{}",
                self.staged.len()
            )));
        }

        let vectors: Vec<Fingerprint> = if rebuilding {
            std::mem::take(&mut self.vectors)
        } else {
            std::mem::take(&mut self.staged).into_iter().flatten().collect()
        };

        debug!(
            items = vectors.len(),
            fpsize = self.fpsize,
            metric = %self.metric,
            max_connections = self.params.max_connections,
            ef_construction = self.params.ef_construction,
            parallelism,
            "Building HNSW index"
        );
        let start = Instant::now();

        match HnswGraph::build(&vectors, self.metric, &self.params, parallelism) {
            Ok(graph) => {
                info!(
                    items = vectors.len(),
                    layers = graph.max_layer + 1,
                    edges = graph.edge_count(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Built HNSW index"
                );
                self.vectors = vectors;
                self.graph = Some(graph);
                Ok(())
            }
            Err(e) => {
                if rebuilding {
                    self.vectors = vectors;
                } else {
                    self.staged = vectors.into_iter().map(Some).collect();
                }
                Err(e)
            }
        }
    }

    /// Up to `k` nearest items to item `id`, excluding `id` itself.
    ///
    /// `search_width` bounds the candidate beam (raised to at least `k + 1`);
    /// wider beams trade latency for recall. Results are ordered by
    /// descending similarity, ties by ascending id, and are identical for
    /// repeated calls on the same built index.
    ///
    /// # Errors
    ///
    /// - [`Error::NotBuilt`] before [`build`](Self::build).
    /// - [`Error::InvalidArgument`] if `id` is not indexed.
    pub fn query_by_id(&self, id: usize, k: usize, search_width: usize) -> Result<Vec<Neighbor>> {
        let graph = self.graph.as_ref().ok_or(Error::NotBuilt)?;
        let query = self.vectors.get(id).ok_or_else(|| {
            Error::InvalidArgument(format!("item {id} is not in the index of {}", self.vectors.len()))
        })?;
        Ok(self.collect(graph, query, Some(id), k, search_width))
    }

    /// Up to `k` nearest items to an arbitrary fingerprint.
    ///
    /// # Errors
    ///
    /// - [`Error::NotBuilt`] before [`build`](Self::build).
    /// - [`Error::DimensionMismatch`] if `query` has the wrong length.
    pub fn query_by_vector(
        &self,
        query: &Fingerprint,
        k: usize,
        search_width: usize,
    ) -> Result<Vec<Neighbor>> {
        let graph = self.graph.as_ref().ok_or(Error::NotBuilt)?;
        if query.len() != self.fpsize {
            return Err(Error::DimensionMismatch {
                expected: self.fpsize,
                actual: query.len(),
            });
        }
        Ok(self.collect(graph, query, None, k, search_width))
    }

    pub(super) fn graph(&self) -> Option<&HnswGraph> {
        self.graph.as_ref()
    }

    pub(super) fn vectors(&self) -> &[Fingerprint] {
        &self.vectors
    }

    fn collect(
        &self,
        graph: &HnswGraph,
        query: &Fingerprint,
        exclude: Option<NodeId>,
        k: usize,
        search_width: usize,
    ) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        let ef = search_width.max(k + 1);

        let mut neighbors: Vec<Neighbor> = graph
            .search(&self.vectors, self.metric, query, ef)
            .into_iter()
            .filter(|&(id, _)| Some(id) != exclude)
            .map(|(id, _)| Neighbor {
                id,
                similarity: self.metric.similarity(query, &self.vectors[id]),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.id.cmp(&b.id))
        });
        neighbors.truncate(k);
        neighbors
    }
}
