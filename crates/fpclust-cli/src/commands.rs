//! Subcommand implementations.

use crate::progress::create_progress_bar;
use anyhow::{Context, Result};
use fpclust_core::pipeline::{
    load_dendrogram, save_dendrogram, write_assignment, write_assignment_csv,
};
use fpclust_core::{
    AnnIndex, ClusterAssignment, CutPolicy, Dendrogram, Fingerprint, FingerprintStore,
    FpclustConfig, Pipeline,
};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Summary of `fpclust index`.
#[derive(Debug)]
pub struct IndexStats {
    pub items: usize,
    pub duration_ms: u64,
}

/// Summary of `fpclust cluster`.
#[derive(Debug)]
pub struct ClusterStats {
    pub items: usize,
    pub edges: usize,
    pub duration_ms: u64,
}

/// Summary of a cut.
#[derive(Debug)]
pub struct CutStats {
    pub items: usize,
    pub clusters: usize,
    pub largest: usize,
}

impl CutStats {
    fn from_assignment(assignment: &ClusterAssignment) -> Self {
        Self {
            items: assignment.len(),
            clusters: assignment.n_clusters(),
            largest: assignment.sizes().first().copied().unwrap_or(0),
        }
    }
}

/// Files touched by `fpclust run`.
pub struct RunPaths<'a> {
    pub fingerprints: &'a Path,
    pub output: Option<&'a Path>,
    pub dendrogram: Option<&'a Path>,
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn read_fingerprints(path: &Path, fpsize: usize) -> Result<Vec<Fingerprint>> {
    let store = FingerprintStore::new(path, fpsize)?;
    store
        .read_all()
        .with_context(|| format!("Failed to read fingerprints from {}", path.display()))
}

fn build_dendrogram(
    pipeline: &Pipeline,
    index: &AnnIndex,
    show_progress: bool,
) -> Result<(usize, Dendrogram)> {
    let pb = create_progress_bar(index.len(), show_progress)?;
    let graph = pipeline.build_graph_with_progress(index, || pb.inc(1))?;
    pb.finish_and_clear();

    let dendrogram = pipeline.cluster(&graph)?;
    Ok((graph.nnz(), dendrogram))
}

fn write_labels(assignment: &ClusterAssignment, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => write_assignment_csv(path, assignment)
            .with_context(|| format!("Failed to write labels to {}", path.display()))?,
        None => {
            let mut out = BufWriter::new(io::stdout().lock());
            write_assignment(&mut out, assignment)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Reads fingerprints, builds the index and saves it.
pub fn index(
    config: FpclustConfig,
    fingerprints: &Path,
    fpsize: usize,
    output: &Path,
) -> Result<IndexStats> {
    let start = Instant::now();
    let pipeline = Pipeline::new(config)?;

    let vectors = read_fingerprints(fingerprints, fpsize)?;
    let index = pipeline.build_index(vectors)?;
    index
        .save(output)
        .with_context(|| format!("Failed to write index to {}", output.display()))?;

    Ok(IndexStats {
        items: index.len(),
        duration_ms: elapsed_ms(start),
    })
}

/// Loads an index, builds and audits the kNN graph, then clusters it.
pub fn cluster(
    config: FpclustConfig,
    index_path: &Path,
    fpsize: usize,
    output: &Path,
    show_progress: bool,
) -> Result<ClusterStats> {
    let start = Instant::now();
    let metric = config.index.metric;
    let pipeline = Pipeline::new(config)?;

    let index = AnnIndex::load(index_path, fpsize, metric)
        .with_context(|| format!("Failed to load index from {}", index_path.display()))?;
    let (edges, dendrogram) = build_dendrogram(&pipeline, &index, show_progress)?;
    save_dendrogram(output, &dendrogram)
        .with_context(|| format!("Failed to write dendrogram to {}", output.display()))?;

    Ok(ClusterStats {
        items: dendrogram.n_leaves(),
        edges,
        duration_ms: elapsed_ms(start),
    })
}

/// Flattens a saved dendrogram.
pub fn cut(path: &Path, policy: CutPolicy, output: Option<&Path>) -> Result<CutStats> {
    let dendrogram = load_dendrogram(path)
        .with_context(|| format!("Failed to load dendrogram from {}", path.display()))?;
    let assignment = policy.apply(&dendrogram)?;
    write_labels(&assignment, output)?;
    Ok(CutStats::from_assignment(&assignment))
}

/// Runs every stage and writes the labels.
pub fn run(
    config: FpclustConfig,
    paths: &RunPaths<'_>,
    fpsize: usize,
    policy: CutPolicy,
    show_progress: bool,
) -> Result<CutStats> {
    let pipeline = Pipeline::new(config)?;

    let vectors = read_fingerprints(paths.fingerprints, fpsize)?;
    let index = pipeline.build_index(vectors)?;
    let (_, dendrogram) = build_dendrogram(&pipeline, &index, show_progress)?;
    if let Some(path) = paths.dendrogram {
        save_dendrogram(path, &dendrogram)
            .with_context(|| format!("Failed to write dendrogram to {}", path.display()))?;
    }

    let assignment = policy.apply(&dendrogram)?;
    write_labels(&assignment, paths.output)?;
    Ok(CutStats::from_assignment(&assignment))
}
