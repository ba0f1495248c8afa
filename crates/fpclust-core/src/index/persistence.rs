//! Index persistence (save/load).
//!
//! # File Layout
//!
//! ```text
//! index.hnsw
//! ├── IndexHeader   magic, format version, N, fpsize, metric, params
//! └── IndexBody     fingerprints, HNSW layers, entry point
//! ```
//!
//! Both parts are bincode-encoded back to back. The header is decoded and
//! checked before the body is read, so a size or metric mismatch is reported
//! without loading the whole graph.

use super::ann_index::AnnIndex;
use super::hnsw::HnswGraph;
use super::metric::Metric;
use super::params::IndexParams;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::store::write_atomically;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

const MAGIC: [u8; 8] = *b"FPCHNSW\0";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexHeader {
    magic: [u8; 8],
    version: u32,
    len: usize,
    fpsize: usize,
    metric: Metric,
    params: IndexParams,
}

#[derive(Serialize)]
struct IndexBodyRef<'a> {
    vectors: &'a [Fingerprint],
    graph: &'a HnswGraph,
}

#[derive(Deserialize)]
struct IndexBody {
    vectors: Vec<Fingerprint>,
    graph: HnswGraph,
}

impl AnnIndex {
    /// Persists the built index to `path`.
    ///
    /// The file is written to a temporary sibling and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`] for an unbuilt index, or an IO or
    /// serialization error.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let graph = self.graph().ok_or(Error::NotBuilt)?;
        let path = path.as_ref();

        let header = IndexHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            len: self.len(),
            fpsize: self.fpsize(),
            metric: self.metric(),
            params: *self.params(),
        };
        let body = IndexBodyRef {
            vectors: self.vectors(),
            graph,
        };

        write_atomically(path, |w| {
            bincode::serialize_into(&mut *w, &header)?;
            bincode::serialize_into(&mut *w, &body)?;
            Ok(())
        })?;

        info!(path = %path.display(), items = self.len(), "Saved index");
        Ok(())
    }

    /// Loads an index saved with [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] if the file holds another fingerprint size.
    /// - [`Error::MetricMismatch`] if the file was built with another metric.
    /// - [`Error::Format`] for a foreign file, unknown version or inconsistent structure.
    pub fn load<P: AsRef<Path>>(path: P, fpsize: usize, metric: Metric) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);

        let header: IndexHeader = bincode::deserialize_from(&mut reader)
            .map_err(|e| Error::Format(format!("unreadable index header: {e}")))?;
        if header.magic != MAGIC {
            return Err(Error::Format(format!("{} is not an fpclust index", path.display())));
        }
        if header.version != FORMAT_VERSION {
            return Err(Error::Format(format!(
                "unsupported index format version {} (expected {FORMAT_VERSION})",
                header.version
            )));
        }
        if header.fpsize != fpsize {
            return Err(Error::DimensionMismatch {
                expected: fpsize,
                actual: header.fpsize,
            });
        }
        if header.metric != metric {
            return Err(Error::MetricMismatch {
                expected: metric.to_string(),
                actual: header.metric.to_string(),
            });
        }

        let body: IndexBody = bincode::deserialize_from(&mut reader)
            .map_err(|e| Error::Format(format!("unreadable index body: {e}")))?;
        if body.vectors.len() != header.len {
            return Err(Error::Format(format!(
                "header declares {} items, body holds {}",
                header.len,
                body.vectors.len()
            )));
        }
        if let Some(bad) = body
            .vectors
            .iter()
            .find(|v| v.len() != fpsize || !v.is_well_formed())
        {
            return Err(Error::Format(format!(
                "stored fingerprint of {} bits is malformed (expected {fpsize})",
                bad.len()
            )));
        }
        body.graph.validate(header.len)?;

        info!(path = %path.display(), items = header.len, "Loaded index");
        Ok(Self::from_parts(
            fpsize,
            metric,
            header.params,
            body.vectors,
            body.graph,
        ))
    }
}
