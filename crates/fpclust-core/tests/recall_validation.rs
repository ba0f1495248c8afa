//! Recall quality validation for the fingerprint HNSW index.
//!
//! The index is compared against brute-force search on synthetic clustered
//! fingerprints. Construction is randomized, so quality is checked against
//! a recall floor rather than exact equality.
//!
//! # Recall Definition
//!
//! Recall@k = fraction of the k returned neighbors that are at least as
//! similar as the true k-th nearest neighbor. Counting by similarity instead
//! of by id keeps ties between identical fingerprints from skewing results.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test recall_validation
//! ```

use fpclust_core::{AnnIndex, Fingerprint, IndexParams, Metric};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Noisy copies of `centroids` random base fingerprints.
fn clustered(count: usize, nbits: usize, centroids: usize, seed: u64) -> Vec<Fingerprint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bases: Vec<Vec<bool>> = (0..centroids)
        .map(|_| (0..nbits).map(|_| rng.gen_bool(0.15)).collect())
        .collect();
    (0..count)
        .map(|i| {
            let bits: Vec<bool> = bases[i % centroids]
                .iter()
                .map(|&b| if rng.gen_bool(0.08) { !b } else { b })
                .collect();
            Fingerprint::from_bits(&bits)
        })
        .collect()
}

/// Brute-force similarity of the k-th nearest neighbor of `query`, self excluded.
fn kth_similarity(vectors: &[Fingerprint], metric: Metric, query: usize, k: usize) -> f32 {
    let mut sims: Vec<f32> = vectors
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != query)
        .map(|(_, v)| metric.similarity(&vectors[query], v))
        .collect();
    sims.sort_by(|a, b| b.total_cmp(a));
    sims[k - 1]
}

#[allow(clippy::cast_precision_loss)]
fn measure_recall(metric: Metric, parallelism: usize, search_width: usize) -> f64 {
    // Arrange
    let vectors = clustered(1500, 512, 30, 42);
    let index = AnnIndex::from_fingerprints(
        vectors.clone(),
        512,
        metric,
        IndexParams::default(),
        parallelism,
    )
    .expect("build index");
    let k = 10;

    // Act
    let queries: Vec<usize> = (0..vectors.len()).step_by(15).collect();
    let mut hits = 0usize;
    for &q in &queries {
        let floor = kth_similarity(&vectors, metric, q, k);
        let found = index.query_by_id(q, k, search_width).expect("query");
        hits += found.iter().filter(|n| n.similarity >= floor - 1e-6).count();
    }

    hits as f64 / (queries.len() * k) as f64
}

#[test]
fn test_recall_angular_single_threaded() {
    let recall = measure_recall(Metric::Angular, 1, 50);

    assert!(recall >= 0.95, "recall@10 {recall:.3} below 0.95");
}

#[test]
fn test_recall_angular_parallel_build() {
    let recall = measure_recall(Metric::Angular, 4, 50);

    assert!(recall >= 0.95, "recall@10 {recall:.3} below 0.95");
}

#[test]
fn test_recall_tanimoto() {
    let recall = measure_recall(Metric::Tanimoto, 2, 50);

    assert!(recall >= 0.95, "recall@10 {recall:.3} below 0.95");
}

#[test]
fn test_wide_search_recall() {
    let recall = measure_recall(Metric::Angular, 1, 200);

    assert!(recall >= 0.98, "recall@10 with width 200 is {recall:.3}");
}
