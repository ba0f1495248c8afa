//! Tests for `graph` module - native HNSW over fingerprints.

use super::graph::HnswGraph;
use crate::error::Error;
use crate::fingerprint::Fingerprint;
use crate::index::metric::Metric;
use crate::index::params::IndexParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Noisy copies of a few random centroids.
fn clustered(n: usize, nbits: usize, centroids: usize, seed: u64) -> Vec<Fingerprint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bases: Vec<Vec<bool>> = (0..centroids)
        .map(|_| (0..nbits).map(|_| rng.gen_bool(0.2)).collect())
        .collect();
    (0..n)
        .map(|i| {
            let bits: Vec<bool> = bases[i % centroids]
                .iter()
                .map(|&b| if rng.gen_bool(0.05) { !b } else { b })
                .collect();
            Fingerprint::from_bits(&bits)
        })
        .collect()
}

#[test]
fn test_build_empty_fails() {
    let err = HnswGraph::build(&[], Metric::Angular, &IndexParams::default(), 1).unwrap_err();

    assert!(matches!(err, Error::EmptyIndex));
}

#[test]
fn test_single_node_graph() {
    let vectors = clustered(1, 64, 1, 1);

    let graph = HnswGraph::build(&vectors, Metric::Angular, &IndexParams::default(), 1)
        .expect("build");

    assert_eq!(graph.entry_point, 0);
    let results = graph.search(&vectors, Metric::Angular, &vectors[0], 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 0);
}

#[test]
fn test_search_finds_exact_match_first() {
    let vectors = clustered(200, 256, 8, 7);
    let graph = HnswGraph::build(&vectors, Metric::Angular, &IndexParams::fast(), 1)
        .expect("build");

    for query in [0usize, 57, 199] {
        let results = graph.search(&vectors, Metric::Angular, &vectors[query], 32);
        assert!(results[0].1.abs() < 1e-6, "query {query} should find itself");
    }
}

#[test]
fn test_results_sorted_and_bounded_by_ef() {
    let vectors = clustered(150, 128, 5, 3);
    let graph = HnswGraph::build(&vectors, Metric::Tanimoto, &IndexParams::fast(), 1)
        .expect("build");

    let results = graph.search(&vectors, Metric::Tanimoto, &vectors[10], 20);

    assert!(results.len() <= 20);
    for pair in results.windows(2) {
        assert!(
            pair[0].1 < pair[1].1 || (pair[0].1 == pair[1].1 && pair[0].0 < pair[1].0),
            "results must be ordered by (distance, id)"
        );
    }
}

#[test]
fn test_degree_bounds_respected() {
    let params = IndexParams::fast();
    let vectors = clustered(300, 128, 6, 11);

    let graph = HnswGraph::build(&vectors, Metric::Angular, &params, 1).expect("build");

    for (l, layer) in graph.layers.iter().enumerate() {
        let bound = if l == 0 {
            params.max_connections_0()
        } else {
            params.max_connections
        };
        assert!(layer.iter().all(|list| list.len() <= bound), "layer {l}");
    }
    graph.validate(vectors.len()).expect("valid structure");
}

#[test]
fn test_single_threaded_build_is_reproducible() {
    let vectors = clustered(120, 64, 4, 5);
    let params = IndexParams::fast();

    let a = HnswGraph::build(&vectors, Metric::Angular, &params, 1).expect("build a");
    let b = HnswGraph::build(&vectors, Metric::Angular, &params, 1).expect("build b");

    assert_eq!(a.layers, b.layers);
    assert_eq!(a.entry_point, b.entry_point);
}

#[allow(clippy::cast_precision_loss)]
#[test]
fn test_parallel_build_recall() {
    // Arrange
    let vectors = clustered(400, 256, 10, 21);
    let graph = HnswGraph::build(&vectors, Metric::Angular, &IndexParams::default(), 4)
        .expect("parallel build");
    let k = 10;

    // Act - count results at least as close as the brute-force k-th neighbor
    let mut hits = 0usize;
    let queries: Vec<usize> = (0..vectors.len()).step_by(20).collect();
    for &q in &queries {
        let mut exact: Vec<f32> = vectors
            .iter()
            .map(|v| Metric::Angular.distance(&vectors[q], v))
            .collect();
        exact.sort_by(f32::total_cmp);
        let kth = exact[k - 1];

        let found = graph.search(&vectors, Metric::Angular, &vectors[q], 64);
        hits += found.iter().take(k).filter(|(_, d)| *d <= kth + 1e-6).count();
    }

    // Assert
    let recall = hits as f64 / (queries.len() * k) as f64;
    assert!(recall >= 0.9, "recall {recall:.3} below 0.9");
}

#[test]
fn test_validate_rejects_dangling_link() {
    let vectors = clustered(20, 64, 2, 9);
    let mut graph =
        HnswGraph::build(&vectors, Metric::Angular, &IndexParams::fast(), 1).expect("build");

    graph.layers[0][0].push(99);

    assert!(matches!(graph.validate(20), Err(Error::Format(_))));
}
