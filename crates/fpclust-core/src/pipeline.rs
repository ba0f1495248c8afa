//! End-to-end clustering: fingerprints → index → kNN graph → dendrogram.
//!
//! Every stage returns its complete artifact or an error, never a partial
//! result. A failed graph audit stops the run before clustering.

use crate::cluster::Dendrogram;
use crate::config::FpclustConfig;
use crate::cut::ClusterAssignment;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::graph::NeighborGraph;
use crate::index::AnnIndex;
use crate::store::write_atomically;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Outputs of a full [`Pipeline::run`].
#[derive(Debug)]
pub struct PipelineArtifacts {
    /// Built neighbor index.
    pub index: AnnIndex,
    /// Audited kNN graph.
    pub graph: NeighborGraph,
    /// Merge tree over all items.
    pub dendrogram: Dendrogram,
}

/// Runs the clustering stages with one validated configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: FpclustConfig,
}

impl Pipeline {
    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn new(config: FpclustConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &FpclustConfig {
        &self.config
    }

    /// Builds the neighbor index over `fingerprints`; item `i` is the i-th
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyIndex`] for no fingerprints, [`Error::DimensionMismatch`]
    /// if lengths differ, or any index build error.
    pub fn build_index(&self, fingerprints: Vec<Fingerprint>) -> Result<AnnIndex> {
        let fpsize = fingerprints.first().map(Fingerprint::len).ok_or(Error::EmptyIndex)?;
        AnnIndex::from_fingerprints(
            fingerprints,
            fpsize,
            self.config.index.metric,
            self.config.index_params(),
            self.config.index.parallelism,
        )
    }

    /// Builds and audits the kNN graph.
    ///
    /// # Errors
    ///
    /// [`Error::Consistency`] if the audit fails, or any build error.
    pub fn build_graph(&self, index: &AnnIndex) -> Result<NeighborGraph> {
        self.config.graph_builder().build_and_audit(index)
    }

    /// Like [`build_graph`](Self::build_graph), reporting each finished row.
    ///
    /// # Errors
    ///
    /// Same as [`build_graph`](Self::build_graph).
    pub fn build_graph_with_progress<F>(
        &self,
        index: &AnnIndex,
        on_row: F,
    ) -> Result<NeighborGraph>
    where
        F: Fn() + Sync,
    {
        let builder = self.config.graph_builder();
        let graph = builder.build_with_progress(index, on_row)?;
        builder.audit(&graph, index)?;
        Ok(graph)
    }

    /// Clusters the graph into a dendrogram.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyGraph`] for a graph without nodes.
    pub fn cluster(&self, graph: &NeighborGraph) -> Result<Dendrogram> {
        self.config.clusterer().fit(graph)
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// The first stage error; later stages do not run.
    pub fn run(&self, fingerprints: Vec<Fingerprint>) -> Result<PipelineArtifacts> {
        let start = Instant::now();
        let items = fingerprints.len();

        let index = self.build_index(fingerprints)?;
        let graph = self.build_graph(&index)?;
        let dendrogram = self.cluster(&graph)?;

        info!(
            items,
            edges = graph.nnz(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline finished"
        );
        Ok(PipelineArtifacts {
            index,
            graph,
            dendrogram,
        })
    }
}

/// Writes `dendrogram` as JSON.
///
/// # Errors
///
/// Returns an IO or serialization error.
pub fn save_dendrogram<P: AsRef<Path>>(path: P, dendrogram: &Dendrogram) -> Result<()> {
    write_atomically(path.as_ref(), |w| {
        serde_json::to_writer(&mut *w, dendrogram)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(())
    })
}

/// Reads a dendrogram written by [`save_dendrogram`].
///
/// # Errors
///
/// Returns [`Error::Format`] if the file is not a valid dendrogram.
pub fn load_dendrogram<P: AsRef<Path>>(path: P) -> Result<Dendrogram> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    serde_json::from_reader(reader).map_err(|e| Error::Format(e.to_string()))
}

/// Writes `item,cluster` CSV rows, one per item.
///
/// # Errors
///
/// Returns an IO error.
pub fn write_assignment_csv<P: AsRef<Path>>(
    path: P,
    assignment: &ClusterAssignment,
) -> Result<()> {
    write_atomically(path.as_ref(), |w| write_assignment(w, assignment))
}

/// Writes `item,cluster` CSV rows to any writer.
///
/// # Errors
///
/// Returns an IO error.
pub fn write_assignment<W: Write>(mut out: W, assignment: &ClusterAssignment) -> Result<()> {
    writeln!(out, "item,cluster")?;
    for (item, label) in assignment.labels().iter().enumerate() {
        writeln!(out, "{item},{label}")?;
    }
    Ok(())
}
