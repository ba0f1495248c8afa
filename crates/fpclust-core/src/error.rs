//! Error types for `fpclust`.
//!
//! A single error enum covers every pipeline stage. Each variant carries a
//! stable code of the form `FPC-XXX` so failures can be matched in logs.

use thiserror::Error;

/// Result type alias for `fpclust` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the clustering pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Persisted data is truncated, corrupt or has an invalid layout (FPC-001).
    #[error("[FPC-001] Format error: {0}")]
    Format(String),

    /// Fingerprint length does not match the configured size (FPC-002).
    #[error("[FPC-002] Fingerprint size mismatch: expected {expected} bits, got {actual}")]
    DimensionMismatch {
        /// Expected number of bits.
        expected: usize,
        /// Actual number of bits.
        actual: usize,
    },

    /// The index was queried before `build` (FPC-003).
    #[error("[FPC-003] Index has not been built")]
    NotBuilt,

    /// `build` was called with no staged items (FPC-004).
    #[error("[FPC-004] Cannot build an empty index")]
    EmptyIndex,

    /// A stored graph row disagrees with a fresh index query (FPC-005).
    #[error("[FPC-005] Graph consistency check failed at node {node}: {reason}")]
    Consistency {
        /// Node whose row failed the audit.
        node: usize,
        /// What differed.
        reason: String,
    },

    /// Clustering was asked to run on a graph with no nodes (FPC-006).
    #[error("[FPC-006] Cannot cluster an empty graph")]
    EmptyGraph,

    /// Malformed caller-supplied argument (FPC-007).
    #[error("[FPC-007] Invalid argument: {0}")]
    InvalidArgument(String),

    /// Items were staged into an index that is already built (FPC-008).
    #[error("[FPC-008] Index is already built; call build() again to rebuild")]
    AlreadyBuilt,

    /// A persisted index uses a different similarity metric (FPC-009).
    #[error("[FPC-009] Metric mismatch: expected {expected}, found {actual}")]
    MetricMismatch {
        /// Metric requested by the caller.
        expected: String,
        /// Metric recorded in the file.
        actual: String,
    },

    /// IO error (FPC-010).
    #[error("[FPC-010] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding a persisted structure failed (FPC-011).
    #[error("[FPC-011] Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (FPC-012).
    #[error("[FPC-012] Configuration error: {0}")]
    Config(String),

    /// Internal error (FPC-013).
    ///
    /// Indicates an unexpected internal state. Please report if encountered.
    #[error("[FPC-013] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code (e.g., "FPC-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Format(_) => "FPC-001",
            Self::DimensionMismatch { .. } => "FPC-002",
            Self::NotBuilt => "FPC-003",
            Self::EmptyIndex => "FPC-004",
            Self::Consistency { .. } => "FPC-005",
            Self::EmptyGraph => "FPC-006",
            Self::InvalidArgument(_) => "FPC-007",
            Self::AlreadyBuilt => "FPC-008",
            Self::MetricMismatch { .. } => "FPC-009",
            Self::Io(_) => "FPC-010",
            Self::Serialization(_) => "FPC-011",
            Self::Config(_) => "FPC-012",
            Self::Internal(_) => "FPC-013",
        }
    }

    /// Returns true if the caller can fix the input and retry.
    ///
    /// Corrupt data, failed audits and internal errors are not recoverable:
    /// the artifact that produced them has to be regenerated.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Format(_) | Self::Consistency { .. } | Self::Internal(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
