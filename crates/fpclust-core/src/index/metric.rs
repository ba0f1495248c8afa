//! Similarity metrics over binary fingerprints.

use crate::error::Error;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Similarity metric used by the neighbor index.
///
/// Both metrics return values in `[0, 1]`, higher meaning more similar. The
/// graph search works on `1 - similarity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine similarity of the bit vectors: `|a ∧ b| / sqrt(|a| · |b|)`.
    ///
    /// Tracks set-overlap similarity closely for sparse fingerprints.
    #[default]
    Angular,

    /// Tanimoto (Jaccard) similarity: `|a ∧ b| / |a ∨ b|`.
    Tanimoto,
}

impl Metric {
    /// Similarity between two fingerprints of equal length.
    ///
    /// An all-zero fingerprint has similarity 0 to everything, itself included.
    #[inline]
    #[must_use]
    pub fn similarity(self, a: &Fingerprint, b: &Fingerprint) -> f32 {
        let common = a.intersection_count(b);
        match self {
            Self::Angular => {
                let (ca, cb) = (a.count_ones(), b.count_ones());
                if ca == 0 || cb == 0 {
                    return 0.0;
                }
                (f64::from(common) / (f64::from(ca) * f64::from(cb)).sqrt()) as f32
            }
            Self::Tanimoto => {
                let union = a.union_count(b);
                if union == 0 {
                    return 0.0;
                }
                (f64::from(common) / f64::from(union)) as f32
            }
        }
    }

    /// Graph distance, `1 - similarity`.
    #[inline]
    #[must_use]
    pub fn distance(self, a: &Fingerprint, b: &Fingerprint) -> f32 {
        1.0 - self.similarity(a, b)
    }

    /// Lowercase name as used in config files and index headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Angular => "angular",
            Self::Tanimoto => "tanimoto",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "angular" | "cosine" => Ok(Self::Angular),
            "tanimoto" | "jaccard" => Ok(Self::Tanimoto),
            other => Err(Error::InvalidArgument(format!(
                "unknown metric '{other}', expected 'angular' or 'tanimoto'"
            ))),
        }
    }
}
