//! End-to-end clustering scenarios.
//!
//! Each test drives the public API stage by stage: store → index → kNN
//! graph → dendrogram → cut.

use fpclust_core::{
    balanced_cut, straight_cut, AnnIndex, Dendrogram, Error, Fingerprint, FingerprintStore,
    GraphBuilder, HierarchicalClusterer, IndexParams, Linkage, Merge, Metric, NeighborGraph,
};
use tempfile::tempdir;

fn fp(positions: &[usize]) -> Fingerprint {
    Fingerprint::from_positions(8, positions).expect("valid positions")
}

/// Two well separated groups of three 8-bit fingerprints.
fn two_groups() -> Vec<Fingerprint> {
    vec![
        fp(&[0, 1, 2]),
        fp(&[0, 1, 3]),
        fp(&[0, 2, 3]),
        fp(&[4, 5, 6]),
        fp(&[4, 5, 7]),
        fp(&[4, 6, 7]),
    ]
}

fn dendrogram(n: usize, merges: &[(usize, usize, f64)]) -> Dendrogram {
    let mut sizes = vec![1usize; n];
    let merges = merges
        .iter()
        .map(|&(left, right, height)| {
            let size = sizes[left] + sizes[right];
            sizes.push(size);
            Merge {
                left,
                right,
                height,
                size,
            }
        })
        .collect();
    Dendrogram::from_merges(n, merges).expect("valid dendrogram")
}

#[test]
fn test_two_groups_are_separated_by_straight_cut() {
    // Arrange - persist and reload the fingerprints
    let dir = tempdir().expect("tempdir");
    let store = FingerprintStore::new(dir.path().join("fps.bin"), 8).expect("store");
    store.write(&two_groups()).expect("write");
    let fingerprints = store.read(6).expect("read");
    assert_eq!(fingerprints, two_groups());

    // Act
    let index =
        AnnIndex::from_fingerprints(fingerprints, 8, Metric::Angular, IndexParams::default(), 1)
            .expect("index");
    let graph = GraphBuilder::new(3).build_and_audit(&index).expect("graph");
    let dendrogram = HierarchicalClusterer::default().fit(&graph).expect("cluster");
    let clusters = straight_cut(&dendrogram, Some(2), None).expect("cut");

    // Assert
    assert_eq!(dendrogram.merges().len(), 5);
    assert_eq!(clusters.n_clusters(), 2);
    assert_eq!(clusters.members(), vec![vec![0, 1, 2], vec![3, 4, 5]]);
}

#[test]
fn test_two_groups_with_every_linkage_and_metric() {
    for metric in [Metric::Angular, Metric::Tanimoto] {
        for linkage in [Linkage::Average, Linkage::Single, Linkage::Complete] {
            let index =
                AnnIndex::from_fingerprints(two_groups(), 8, metric, IndexParams::fast(), 2)
                    .expect("index");
            let graph = GraphBuilder::new(3)
                .with_parallelism(2)
                .build_and_audit(&index)
                .expect("graph");
            let dendrogram = HierarchicalClusterer::new(linkage)
                .fit(&graph)
                .expect("cluster");

            let clusters = straight_cut(&dendrogram, Some(2), None).expect("cut");

            assert_eq!(
                clusters.members(),
                vec![vec![0, 1, 2], vec![3, 4, 5]],
                "{metric} / {linkage}"
            );
            assert_eq!(balanced_cut(&dendrogram, 3).expect("balanced").n_clusters(), 2);
        }
    }
}

#[test]
fn test_threshold_cut_removes_only_merges_above_threshold() {
    // Heights [0.1, 0.2, 0.2, 0.5] over five items: one merge lies above 0.3
    let d = dendrogram(5, &[(0, 1, 0.1), (2, 3, 0.2), (4, 5, 0.2), (6, 7, 0.5)]);

    let clusters = straight_cut(&d, None, Some(0.3)).expect("cut");

    assert_eq!(clusters.n_clusters(), 2);
    assert_eq!(clusters.members(), vec![vec![0, 1, 4], vec![2, 3]]);
}

#[test]
fn test_threshold_cut_with_two_merges_above_threshold() {
    let d = dendrogram(5, &[(0, 1, 0.1), (2, 3, 0.2), (4, 5, 0.4), (6, 7, 0.5)]);

    let clusters = straight_cut(&d, None, Some(0.3)).expect("cut");

    assert_eq!(clusters.n_clusters(), 3);
}

#[test]
fn test_balanced_cut_on_pipeline_output() {
    let index =
        AnnIndex::from_fingerprints(two_groups(), 8, Metric::Angular, IndexParams::fast(), 1)
            .expect("index");
    let graph = GraphBuilder::new(5).build_and_audit(&index).expect("graph");
    let dendrogram = HierarchicalClusterer::default().fit(&graph).expect("cluster");

    for max_size in 1..=6 {
        let clusters = balanced_cut(&dendrogram, max_size).expect("cut");
        assert!(clusters.sizes().iter().all(|&s| s <= max_size));
    }
    assert_eq!(balanced_cut(&dendrogram, 6).expect("cut").n_clusters(), 1);
}

#[test]
fn test_corrupted_graph_never_reaches_clustering() {
    // Arrange - a graph that contradicts the index
    let index =
        AnnIndex::from_fingerprints(two_groups(), 8, Metric::Angular, IndexParams::fast(), 1)
            .expect("index");
    let builder = GraphBuilder::new(2);
    let mut rows: Vec<Vec<(usize, f32)>> = (0..6)
        .map(|i| index.query_by_id(i, 2, 50).expect("query"))
        .map(|row| row.iter().map(|n| (n.id, n.similarity)).collect())
        .collect();
    rows[0] = vec![(5, 0.9), (4, 0.9)];
    let forged = NeighborGraph::from_rows(&rows).expect("rows");

    // Act
    let err = builder.audit(&forged, &index).unwrap_err();

    // Assert
    assert!(matches!(err, Error::Consistency { node: 0, .. }));
}

#[test]
fn test_index_survives_save_and_load_between_stages() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("fps.hnsw");
    let index =
        AnnIndex::from_fingerprints(two_groups(), 8, Metric::Angular, IndexParams::fast(), 1)
            .expect("index");
    index.save(&path).expect("save");

    let loaded = AnnIndex::load(&path, 8, Metric::Angular).expect("load");
    let builder = GraphBuilder::new(3);

    assert_eq!(
        builder.build(&loaded).expect("loaded graph"),
        builder.build(&index).expect("original graph")
    );
    assert!(matches!(
        AnnIndex::load(&path, 16, Metric::Angular),
        Err(Error::DimensionMismatch { .. })
    ));
}
