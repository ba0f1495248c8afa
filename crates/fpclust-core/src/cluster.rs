//! Agglomerative clustering restricted to the edges of a kNN graph.
//!
//! The clusterer never looks at pairs that are not connected in the
//! [`NeighborGraph`]. Starting from N singletons it repeatedly merges the
//! pair joined by the most similar edge and recomputes the merged cluster's
//! edges with a reducible [`Linkage`], which keeps merge heights
//! non-decreasing.
//!
//! # Algorithm
//!
//! ```text
//! heap ← every undirected edge (similarity, min id, max id)
//! while heap not empty:
//!     pop best pair (a, b); skip if a or b is already merged
//!     c ← new cluster N + t, height 1 − similarity
//!     for each neighbor x of a or b:
//!         s(c, x) ← linkage(s(a, x), s(b, x)), clamped to the merge similarity
//!         push (s(c, x), c, x)
//! chain the remaining roots in ascending id order at height max(1, last)
//! ```

use crate::error::{Error, Result};
use crate::graph::NeighborGraph;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

/// Rule for the similarity between a merged cluster and a third cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Size-weighted mean of both sides, a missing edge counting as 0.
    #[default]
    Average,
    /// Most similar side.
    Single,
    /// Least similar side, a missing edge counting as 0.
    ///
    /// A merged cluster keeps an edge only to clusters that every member
    /// links to. On a sparse kNN graph that is rarely true, so most of the
    /// upper tree ends up as implicit component joins at height 1.0.
    Complete,
}

impl Linkage {
    /// Lowercase name as used in config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Single => "single",
            Self::Complete => "complete",
        }
    }

    fn combine(
        self,
        left: Option<f64>,
        right: Option<f64>,
        left_size: f64,
        right_size: f64,
    ) -> f64 {
        match self {
            Self::Average => {
                (left_size * left.unwrap_or(0.0) + right_size * right.unwrap_or(0.0))
                    / (left_size + right_size)
            }
            Self::Single => left.unwrap_or(0.0).max(right.unwrap_or(0.0)),
            Self::Complete => match (left, right) {
                (Some(l), Some(r)) => l.min(r),
                _ => 0.0,
            },
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Linkage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(Self::Average),
            "single" => Ok(Self::Single),
            "complete" => Ok(Self::Complete),
            other => Err(Error::InvalidArgument(format!(
                "unknown linkage '{other}', expected average, single or complete"
            ))),
        }
    }
}

/// One merge event of a [`Dendrogram`].
///
/// Ids below `n_leaves` are items; merge `t` creates cluster `n_leaves + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    /// Smaller of the two merged ids.
    pub left: usize,
    /// Larger of the two merged ids.
    pub right: usize,
    /// Dissimilarity at which the merge happened.
    pub height: f64,
    /// Number of items in the new cluster.
    pub size: usize,
}

/// Binary merge tree with exactly `n_leaves - 1` merges and non-decreasing
/// heights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDendrogram")]
pub struct Dendrogram {
    n_leaves: usize,
    merges: Vec<Merge>,
}

#[derive(Deserialize)]
struct RawDendrogram {
    n_leaves: usize,
    merges: Vec<Merge>,
}

impl TryFrom<RawDendrogram> for Dendrogram {
    type Error = Error;

    fn try_from(raw: RawDendrogram) -> Result<Self> {
        Self::from_merges(raw.n_leaves, raw.merges)
    }
}

impl Dendrogram {
    /// Builds a dendrogram from an explicit merge list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless `n_leaves >= 1`, there are
    /// exactly `n_leaves - 1` merges, every merge joins two distinct existing
    /// roots, sizes add up, and heights are finite, non-negative and
    /// non-decreasing.
    pub fn from_merges(n_leaves: usize, merges: Vec<Merge>) -> Result<Self> {
        if n_leaves == 0 {
            return Err(Error::InvalidArgument("dendrogram needs at least one leaf".into()));
        }
        if merges.len() != n_leaves - 1 {
            return Err(Error::InvalidArgument(format!(
                "{n_leaves} leaves need {} merges, got {}",
                n_leaves - 1,
                merges.len()
            )));
        }

        let mut sizes = vec![1usize; n_leaves];
        let mut consumed = vec![false; 2 * n_leaves - 1];
        let mut last = 0.0f64;

        for (t, merge) in merges.iter().enumerate() {
            let next_id = n_leaves + t;
            for id in [merge.left, merge.right] {
                if id >= next_id {
                    return Err(Error::InvalidArgument(format!(
                        "merge {t} references {id}, which does not exist yet"
                    )));
                }
                if consumed[id] {
                    return Err(Error::InvalidArgument(format!(
                        "merge {t} reuses cluster {id}"
                    )));
                }
            }
            if merge.left == merge.right {
                return Err(Error::InvalidArgument(format!(
                    "merge {t} joins cluster {} with itself",
                    merge.left
                )));
            }
            if !merge.height.is_finite() || merge.height < last {
                return Err(Error::InvalidArgument(format!(
                    "merge {t} has height {} after {last}",
                    merge.height
                )));
            }
            let size = sizes[merge.left] + sizes[merge.right];
            if merge.size != size {
                return Err(Error::InvalidArgument(format!(
                    "merge {t} declares size {}, children add up to {size}",
                    merge.size
                )));
            }
            consumed[merge.left] = true;
            consumed[merge.right] = true;
            sizes.push(size);
            last = merge.height;
        }

        Ok(Self { n_leaves, merges })
    }

    /// Number of items.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Merges in the order they happened.
    #[must_use]
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Id of the cluster holding every item.
    #[must_use]
    pub fn root(&self) -> usize {
        self.n_leaves + self.merges.len() - 1
    }

    /// Children of cluster `id`, or `None` for leaves and unknown ids.
    #[must_use]
    pub fn children(&self, id: usize) -> Option<(usize, usize)> {
        let t = id.checked_sub(self.n_leaves)?;
        self.merges.get(t).map(|m| (m.left, m.right))
    }

    /// Number of items under `id` (0 for unknown ids).
    #[must_use]
    pub fn size(&self, id: usize) -> usize {
        if id < self.n_leaves {
            1
        } else {
            self.merges.get(id - self.n_leaves).map_or(0, |m| m.size)
        }
    }

    /// Merge heights in order.
    pub fn heights(&self) -> impl Iterator<Item = f64> + '_ {
        self.merges.iter().map(|m| m.height)
    }
}

/// Candidate pair in the merge heap; the best pair compares greatest.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    similarity: f64,
    a: usize,
    b: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.a.cmp(&self.a))
            .then_with(|| other.b.cmp(&self.b))
    }
}

impl Candidate {
    fn new(similarity: f64, x: usize, y: usize) -> Self {
        Self {
            similarity,
            a: x.min(y),
            b: x.max(y),
        }
    }
}

/// Builds a [`Dendrogram`] from a [`NeighborGraph`].
///
/// Equal-similarity pairs are merged lowest `(min id, max id)` first.
/// Components that share no edge are joined after all edges are used up, in
/// ascending cluster-id order, at height `max(1.0, last height)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchicalClusterer {
    linkage: Linkage,
}

impl HierarchicalClusterer {
    /// Creates a clusterer with the given linkage.
    #[must_use]
    pub fn new(linkage: Linkage) -> Self {
        Self { linkage }
    }

    /// Configured linkage.
    #[must_use]
    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Clusters `graph` into a full merge tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyGraph`] for a graph without nodes.
    pub fn fit(&self, graph: &NeighborGraph) -> Result<Dendrogram> {
        let n = graph.n_nodes();
        if n == 0 {
            return Err(Error::EmptyGraph);
        }
        info!(nodes = n, edges = graph.nnz(), linkage = %self.linkage, "Clustering kNN graph");
        let start = Instant::now();

        let total = 2 * n - 1;
        let mut adjacency: Vec<FxHashMap<usize, f64>> = vec![FxHashMap::default(); total];
        for (i, j, w) in graph.edges() {
            let w = f64::from(w);
            if i == j || w.is_nan() || w <= 0.0 {
                continue;
            }
            for (x, y) in [(i, j), (j, i)] {
                let entry = adjacency[x].entry(y).or_insert(w);
                *entry = entry.max(w);
            }
        }

        let mut heap: BinaryHeap<Candidate> = adjacency
            .iter()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .filter(move |&(&j, _)| i < j)
                    .map(move |(&j, &w)| Candidate::new(w, i, j))
            })
            .collect();

        let mut sizes = vec![1usize; total];
        let mut active = vec![false; total];
        active[..n].fill(true);
        let mut merges = Vec::with_capacity(n - 1);
        let mut last_height = 0.0f64;

        while let Some(Candidate { similarity, a, b }) = heap.pop() {
            if !active[a] || !active[b] {
                continue;
            }
            let c = n + merges.len();
            let height = (1.0 - similarity).max(last_height);

            let left = std::mem::take(&mut adjacency[a]);
            let right = std::mem::take(&mut adjacency[b]);
            let (size_a, size_b) = (sizes[a] as f64, sizes[b] as f64);

            let mut linked: FxHashMap<usize, f64> = FxHashMap::default();
            for &x in left.keys().chain(right.keys()) {
                if x == a || x == b || linked.contains_key(&x) {
                    continue;
                }
                adjacency[x].remove(&a);
                adjacency[x].remove(&b);
                let s = self
                    .linkage
                    .combine(left.get(&x).copied(), right.get(&x).copied(), size_a, size_b)
                    .min(similarity);
                linked.insert(x, s);
            }
            linked.retain(|_, s| *s > 0.0);
            for (&x, &s) in &linked {
                adjacency[x].insert(c, s);
                heap.push(Candidate::new(s, c, x));
            }
            adjacency[c] = linked;

            active[a] = false;
            active[b] = false;
            active[c] = true;
            sizes[c] = sizes[a] + sizes[b];
            merges.push(Merge {
                left: a,
                right: b,
                height,
                size: sizes[c],
            });
            last_height = height;
        }

        let roots: Vec<usize> = (0..total).filter(|&id| active[id]).collect();
        if roots.len() > 1 {
            let height = last_height.max(1.0);
            warn!(
                components = roots.len(),
                height, "kNN graph is disconnected, joining components at maximal height"
            );
            let mut current = roots[0];
            for &root in &roots[1..] {
                let c = n + merges.len();
                sizes[c] = sizes[current] + sizes[root];
                merges.push(Merge {
                    left: current.min(root),
                    right: current.max(root),
                    height,
                    size: sizes[c],
                });
                current = c;
            }
        }

        info!(
            merges = merges.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Clustering finished"
        );
        Ok(Dendrogram {
            n_leaves: n,
            merges,
        })
    }
}
