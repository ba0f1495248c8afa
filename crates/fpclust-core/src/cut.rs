//! Flattening a [`Dendrogram`] into clusters.
//!
//! - [`straight_cut`]: drop the highest merges, by count or by height.
//! - [`balanced_cut`]: descend from the root until clusters fit a size cap.
//!
//! Both return labels numbered by decreasing cluster size, ties broken by
//! the smallest item id in the cluster, so identical inputs always produce
//! identical labels.

use crate::cluster::Dendrogram;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Flat partition of items `0..N` into clusters `0..n_clusters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
    sizes: Vec<usize>,
}

impl ClusterAssignment {
    /// Builds an assignment from disjoint groups covering `0..n`.
    fn from_groups(n: usize, mut groups: Vec<Vec<usize>>) -> Self {
        for group in &mut groups {
            group.sort_unstable();
        }
        groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.first().cmp(&b.first())));

        let mut labels = vec![0; n];
        for (label, group) in groups.iter().enumerate() {
            for &item in group {
                labels[item] = label;
            }
        }
        Self {
            labels,
            sizes: groups.iter().map(Vec::len).collect(),
        }
    }

    /// Cluster label of every item.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Cluster label of `item`.
    #[must_use]
    pub fn label(&self, item: usize) -> Option<usize> {
        self.labels.get(item).copied()
    }

    /// Number of clusters.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.sizes.len()
    }

    /// Cluster sizes indexed by label, non-increasing.
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Items of every cluster, ascending, indexed by label.
    #[must_use]
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members: Vec<Vec<usize>> =
            self.sizes.iter().map(|&s| Vec::with_capacity(s)).collect();
        for (item, &label) in self.labels.iter().enumerate() {
            members[label].push(item);
        }
        members
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if no item is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// How to flatten a dendrogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutPolicy {
    /// Exactly this many clusters.
    Clusters(usize),
    /// Keep merges with height at most this value.
    Threshold(f64),
    /// No cluster larger than this many items.
    MaxSize(usize),
}

impl CutPolicy {
    /// Applies the policy to `dendrogram`.
    ///
    /// # Errors
    ///
    /// Same as [`straight_cut`] and [`balanced_cut`].
    pub fn apply(&self, dendrogram: &Dendrogram) -> Result<ClusterAssignment> {
        match *self {
            Self::Clusters(k) => straight_cut(dendrogram, Some(k), None),
            Self::Threshold(t) => straight_cut(dendrogram, None, Some(t)),
            Self::MaxSize(m) => balanced_cut(dendrogram, m),
        }
    }
}

/// Cuts the dendrogram into `n_clusters` clusters or at `threshold`.
///
/// With `n_clusters = k` the last `k - 1` merges are undone, which yields
/// exactly `k` clusters. With `threshold = t` every merge higher than `t` is
/// undone, leaving any number of clusters of unbounded size.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] unless exactly one of `n_clusters` and
/// `threshold` is given, `n_clusters` is in `1..=N`, and `threshold` is not
/// NaN.
pub fn straight_cut(
    dendrogram: &Dendrogram,
    n_clusters: Option<usize>,
    threshold: Option<f64>,
) -> Result<ClusterAssignment> {
    let n = dendrogram.n_leaves();
    let kept = match (n_clusters, threshold) {
        (Some(k), None) => {
            if k == 0 || k > n {
                return Err(Error::InvalidArgument(format!(
                    "n_clusters must be in 1..={n}, got {k}"
                )));
            }
            n - k
        }
        (None, Some(t)) => {
            if t.is_nan() {
                return Err(Error::InvalidArgument("threshold must not be NaN".into()));
            }
            dendrogram.heights().take_while(|&h| h <= t).count()
        }
        _ => {
            return Err(Error::InvalidArgument(
                "exactly one of n_clusters and threshold must be set".into(),
            ))
        }
    };

    let mut sets = DisjointSet::new(n + dendrogram.merges().len());
    for (t, merge) in dendrogram.merges()[..kept].iter().enumerate() {
        sets.union(n + t, merge.left);
        sets.union(n + t, merge.right);
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of_root = vec![usize::MAX; n + dendrogram.merges().len()];
    for item in 0..n {
        let root = sets.find(item);
        if group_of_root[root] == usize::MAX {
            group_of_root[root] = groups.len();
            groups.push(Vec::new());
        }
        groups[group_of_root[root]].push(item);
    }

    debug!(kept_merges = kept, clusters = groups.len(), "Straight cut");
    Ok(ClusterAssignment::from_groups(n, groups))
}

/// Splits the dendrogram top-down until every cluster has at most
/// `max_size` items.
///
/// The number of clusters follows from the data. Lowering `max_size` only
/// splits clusters further; `max_size >= N` keeps a single cluster.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for `max_size == 0`.
pub fn balanced_cut(dendrogram: &Dendrogram, max_size: usize) -> Result<ClusterAssignment> {
    if max_size == 0 {
        return Err(Error::InvalidArgument("max_size must be >= 1".into()));
    }

    let n = dendrogram.n_leaves();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut pending = vec![dendrogram.root()];

    while let Some(node) = pending.pop() {
        match dendrogram.children(node) {
            Some((left, right)) if dendrogram.size(node) > max_size => {
                pending.push(right);
                pending.push(left);
            }
            _ => groups.push(leaves_under(dendrogram, node)),
        }
    }

    debug!(max_size, clusters = groups.len(), "Balanced cut");
    Ok(ClusterAssignment::from_groups(n, groups))
}

fn leaves_under(dendrogram: &Dendrogram, node: usize) -> Vec<usize> {
    let mut leaves = Vec::with_capacity(dendrogram.size(node));
    let mut pending = vec![node];
    while let Some(id) = pending.pop() {
        match dendrogram.children(id) {
            Some((left, right)) => {
                pending.push(right);
                pending.push(left);
            }
            None => leaves.push(id),
        }
    }
    leaves
}

/// Union-find with path halving.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}
