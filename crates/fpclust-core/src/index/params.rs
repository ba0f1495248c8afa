//! HNSW build parameters.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters controlling the shape of the proximity graph.
///
/// Layer 0 keeps up to `2 * max_connections` links per node, upper layers
/// keep `max_connections`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Number of links per node on upper layers (M parameter).
    /// Higher = better recall, more memory, slower build.
    pub max_connections: usize,
    /// Beam width while linking a new node.
    /// Higher = better graph quality, slower build.
    pub ef_construction: usize,
    /// Diversity factor of the neighbor pruning heuristic.
    /// `1.0` is the classic HNSW heuristic, larger values keep more spread-out links.
    pub alpha: f32,
    /// Seed for level assignment. The same seed and single-threaded build
    /// produce an identical graph.
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            alpha: 1.0,
            seed: 0x5DEE_CE66_D1A4_B5B5,
        }
    }
}

impl IndexParams {
    /// Cheaper parameters for small collections and tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_connections: 12,
            ef_construction: 100,
            ..Self::default()
        }
    }

    /// Maximum links per node on layer 0.
    #[must_use]
    pub const fn max_connections_0(&self) -> usize {
        self.max_connections * 2
    }

    /// Level multiplier `1 / ln(M)`.
    #[must_use]
    pub fn level_mult(&self) -> f64 {
        1.0 / (self.max_connections as f64).ln()
    }

    /// Checks that the parameters describe a usable graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for `max_connections < 2`,
    /// `ef_construction == 0` or a non-finite `alpha` below 1.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections < 2 {
            return Err(Error::InvalidArgument(format!(
                "max_connections must be >= 2, got {}",
                self.max_connections
            )));
        }
        if self.ef_construction == 0 {
            return Err(Error::InvalidArgument("ef_construction must be > 0".into()));
        }
        if !self.alpha.is_finite() || self.alpha < 1.0 {
            return Err(Error::InvalidArgument(format!(
                "alpha must be a finite value >= 1.0, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}
