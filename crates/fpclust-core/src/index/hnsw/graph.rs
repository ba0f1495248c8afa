//! HNSW Graph Structure
//!
//! Hierarchical navigable small world graph as described in the Malkov &
//! Yashunin paper, specialised for packed binary fingerprints. The graph is
//! built once over a fixed set of vectors and then frozen into plain
//! adjacency lists that are read without locks.
//!
//! # References
//!
//! - "Efficient and robust approximate nearest neighbor search using
//!   Hierarchical Navigable Small World graphs" (Malkov & Yashunin, 2016)
//! - arXiv: <https://arxiv.org/abs/1603.09320>

use super::layer::{Layer, NodeId};
use super::ordered_float::OrderedFloat;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::index::metric::Metric;
use crate::index::params::IndexParams;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Highest layer a node can be assigned to.
const MAX_LEVEL: usize = 15;

/// Read access to adjacency lists.
///
/// Implemented by the lock-protected build-time layers and by the frozen
/// graph, so both share one search routine.
pub(crate) trait Adjacency {
    /// Copies the neighbors of `node` on `layer` into `out`.
    fn neighbors_into(&self, layer: usize, node: NodeId, out: &mut Vec<NodeId>);
}

/// Read-only HNSW graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HnswGraph {
    /// `layers[l][node]` lists the neighbors of `node` on layer `l`.
    pub(crate) layers: Vec<Vec<Vec<u32>>>,
    /// Entry point for search (a node on the highest layer).
    pub(crate) entry_point: u32,
    /// Index of the highest layer.
    pub(crate) max_layer: usize,
}

impl Adjacency for HnswGraph {
    fn neighbors_into(&self, layer: usize, node: NodeId, out: &mut Vec<NodeId>) {
        out.clear();
        if let Some(list) = self.layers.get(layer).and_then(|l| l.get(node)) {
            out.extend(list.iter().map(|&n| n as NodeId));
        }
    }
}

impl HnswGraph {
    /// Links every vector into a new graph.
    ///
    /// With `parallelism > 1` a dedicated rayon pool inserts nodes
    /// concurrently. Every worker keeps its own visited set and candidate
    /// heaps (each up to `ef_construction` entries), so peak memory grows
    /// with the worker count on top of the shared adjacency lists. A
    /// single-threaded build is fully reproducible for a given seed;
    /// parallel builds depend on scheduling.
    pub(crate) fn build(
        vectors: &[Fingerprint],
        metric: Metric,
        params: &IndexParams,
        parallelism: usize,
    ) -> Result<Self> {
        let n = vectors.len();
        if n == 0 {
            return Err(Error::EmptyIndex);
        }
        if u32::try_from(n).is_err() {
            return Err(Error::InvalidArgument(format!(
                "{n} items exceed the index capacity of {}",
                u32::MAX
            )));
        }

        let levels = assign_levels(n, params);
        let top = levels.iter().copied().max().unwrap_or(0);

        let builder = Builder {
            vectors,
            metric,
            params: *params,
            layers: (0..=top).map(|_| Layer::new(n)).collect(),
            entry: RwLock::new((0, levels[0])),
            levels,
        };

        if parallelism <= 1 {
            for node in 1..n {
                builder.insert(node);
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(parallelism)
                .thread_name(|i| format!("fpclust-build-{i}"))
                .build()
                .map_err(|e| Error::Internal(format!("failed to start build pool: {e}")))?;
            pool.install(|| (1..n).into_par_iter().for_each(|node| builder.insert(node)));
        }

        let (entry_point, max_layer) = builder.entry.into_inner();
        Ok(Self {
            layers: builder.layers.into_iter().map(Layer::freeze).collect(),
            entry_point: entry_point as u32,
            max_layer,
        })
    }

    /// Beam search for the `ef` nodes closest to `query`.
    ///
    /// Returns `(node, distance)` pairs sorted by ascending distance, ties by
    /// ascending node id. The result depends only on the frozen graph, so
    /// repeated queries are identical.
    pub(crate) fn search(
        &self,
        vectors: &[Fingerprint],
        metric: Metric,
        query: &Fingerprint,
        ef: usize,
    ) -> Vec<(NodeId, f32)> {
        let dist = |n: NodeId| metric.distance(query, &vectors[n]);

        let mut current = self.entry_point as NodeId;
        for layer in (1..=self.max_layer).rev() {
            current = greedy_closest(self, &dist, current, layer);
        }
        search_layer(self, &dist, &[current], ef, 0)
    }

    /// Total number of directed links across all layers.
    pub(crate) fn edge_count(&self) -> usize {
        self.layers.iter().flatten().map(Vec::len).sum()
    }

    /// Structural check used when loading a persisted graph.
    pub(crate) fn validate(&self, n: usize) -> Result<()> {
        if self.layers.len() != self.max_layer + 1 {
            return Err(Error::Format(format!(
                "graph declares top layer {} but stores {} layers",
                self.max_layer,
                self.layers.len()
            )));
        }
        if self.entry_point as usize >= n {
            return Err(Error::Format(format!(
                "entry point {} out of range for {n} nodes",
                self.entry_point
            )));
        }
        for (l, layer) in self.layers.iter().enumerate() {
            if layer.len() != n {
                return Err(Error::Format(format!(
                    "layer {l} has {} adjacency lists, expected {n}",
                    layer.len()
                )));
            }
            if layer.iter().flatten().any(|&nb| nb as usize >= n) {
                return Err(Error::Format(format!("layer {l} links to a missing node")));
            }
        }
        Ok(())
    }
}

/// Draws an exponentially distributed level for every node.
fn assign_levels(n: usize, params: &IndexParams) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mult = params.level_mult();
    (0..n)
        .map(|_| {
            // 1 - U lies in (0, 1], keeping ln() finite
            let uniform: f64 = 1.0 - rng.gen::<f64>();
            ((-uniform.ln() * mult).floor() as usize).min(MAX_LEVEL)
        })
        .collect()
}

/// Build-time state: immutable vectors, lock-protected adjacency.
struct Builder<'a> {
    vectors: &'a [Fingerprint],
    metric: Metric,
    params: IndexParams,
    levels: Vec<usize>,
    layers: Vec<Layer>,
    /// Current entry point and its level.
    entry: RwLock<(NodeId, usize)>,
}

impl Adjacency for Builder<'_> {
    fn neighbors_into(&self, layer: usize, node: NodeId, out: &mut Vec<NodeId>) {
        self.layers[layer].neighbors_into(node, out);
    }
}

impl Builder<'_> {
    fn insert(&self, node: NodeId) {
        let level = self.levels[node];
        let (entry, top) = *self.entry.read();
        let query = &self.vectors[node];
        let dist = |n: NodeId| self.metric.distance(query, &self.vectors[n]);

        let mut current = entry;
        for layer in (level + 1..=top).rev() {
            current = greedy_closest(self, &dist, current, layer);
        }

        for layer in (0..=level.min(top)).rev() {
            let mut candidates =
                search_layer(self, &dist, &[current], self.params.ef_construction, layer);
            candidates.retain(|&(id, _)| id != node);

            let max_conn = if layer == 0 {
                self.params.max_connections_0()
            } else {
                self.params.max_connections
            };
            let selected = self.select_neighbors(&candidates, max_conn);
            self.layers[layer].set_neighbors(node, selected.clone());

            for &neighbor in &selected {
                self.connect(neighbor, node, layer, max_conn);
            }

            if let Some(&(best, _)) = candidates.first() {
                current = best;
            }
        }

        if level > top {
            let mut entry = self.entry.write();
            if level > entry.1 {
                *entry = (node, level);
            }
        }
    }

    /// Neighbor selection with alpha diversification.
    ///
    /// `candidates` must be sorted by ascending distance. A candidate is kept
    /// only if `alpha * d(q, c) <= d(c, s)` for every already selected `s`;
    /// remaining slots are back-filled with the closest rejected candidates.
    fn select_neighbors(&self, candidates: &[(NodeId, f32)], max_neighbors: usize) -> Vec<NodeId> {
        if candidates.len() <= max_neighbors {
            return candidates.iter().map(|&(id, _)| id).collect();
        }

        let mut selected: Vec<NodeId> = Vec::with_capacity(max_neighbors);
        for &(candidate, candidate_dist) in candidates {
            if selected.len() >= max_neighbors {
                break;
            }
            let candidate_vec = &self.vectors[candidate];
            let is_diverse = selected.iter().all(|&s| {
                let dist_to_selected = self.metric.distance(candidate_vec, &self.vectors[s]);
                self.params.alpha * candidate_dist <= dist_to_selected
            });
            if is_diverse || selected.is_empty() {
                selected.push(candidate);
            }
        }

        if selected.len() < max_neighbors {
            for &(candidate, _) in candidates {
                if selected.len() >= max_neighbors {
                    break;
                }
                if !selected.contains(&candidate) {
                    selected.push(candidate);
                }
            }
        }

        selected
    }

    /// Adds the reverse link `neighbor -> new_node`, pruning when full.
    ///
    /// Holds only the write lock of `neighbor`'s list; vectors are immutable
    /// during the build so no other lock is taken.
    fn connect(&self, neighbor: NodeId, new_node: NodeId, layer: usize, max_conn: usize) {
        let mut list = self.layers[layer].neighbors[neighbor].write();
        if list.contains(&new_node) {
            return;
        }
        if list.len() < max_conn {
            list.push(new_node);
            return;
        }

        let base = &self.vectors[neighbor];
        let mut with_dist: Vec<(NodeId, f32)> = list
            .iter()
            .copied()
            .chain(std::iter::once(new_node))
            .map(|n| (n, self.metric.distance(base, &self.vectors[n])))
            .collect();
        with_dist.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        *list = self.select_neighbors(&with_dist, max_conn);
    }
}

/// Greedy walk to the closest node on a single layer.
fn greedy_closest<A, D>(adjacency: &A, dist: &D, entry: NodeId, layer: usize) -> NodeId
where
    A: Adjacency + ?Sized,
    D: Fn(NodeId) -> f32,
{
    let mut best = entry;
    let mut best_dist = dist(entry);
    let mut neighbors = Vec::new();

    loop {
        adjacency.neighbors_into(layer, best, &mut neighbors);
        let mut improved = false;

        for &neighbor in &neighbors {
            let d = dist(neighbor);
            if d < best_dist {
                best = neighbor;
                best_dist = d;
                improved = true;
            }
        }

        if !improved {
            return best;
        }
    }
}

/// Beam search over one layer with `ef` candidates.
fn search_layer<A, D>(
    adjacency: &A,
    dist: &D,
    entry_points: &[NodeId],
    ef: usize,
    layer: usize,
) -> Vec<(NodeId, f32)>
where
    A: Adjacency + ?Sized,
    D: Fn(NodeId) -> f32,
{
    let ef = ef.max(1);
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();
    let mut candidates: BinaryHeap<Reverse<(OrderedFloat, NodeId)>> = BinaryHeap::new();
    let mut results: BinaryHeap<(OrderedFloat, NodeId)> = BinaryHeap::new();
    let mut neighbors = Vec::new();

    for &ep in entry_points {
        if visited.insert(ep) {
            let d = dist(ep);
            candidates.push(Reverse((OrderedFloat(d), ep)));
            results.push((OrderedFloat(d), ep));
        }
    }

    while let Some(Reverse((OrderedFloat(c_dist), c_node))) = candidates.pop() {
        let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
        if c_dist > furthest && results.len() >= ef {
            break;
        }

        adjacency.neighbors_into(layer, c_node, &mut neighbors);
        for &neighbor in &neighbors {
            if !visited.insert(neighbor) {
                continue;
            }
            let d = dist(neighbor);
            let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
            if d < furthest || results.len() < ef {
                candidates.push(Reverse((OrderedFloat(d), neighbor)));
                results.push((OrderedFloat(d), neighbor));
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    let mut out: Vec<(NodeId, f32)> = results.into_iter().map(|(d, n)| (n, d.0)).collect();
    out.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    out
}
