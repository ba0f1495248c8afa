//! `fpclust` Configuration Module
//!
//! Provides configuration file support via `fpclust.toml` and environment
//! variables.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`FPCLUST_<SECTION>__<KEY>`, e.g. `FPCLUST_GRAPH__K=30`)
//! 2. Configuration file (`fpclust.toml`)
//! 3. Default values
//!
//! # Example
//!
//! ```toml
//! [index]
//! m = 16
//! ef_construction = 200
//! metric = "angular"
//!
//! [graph]
//! k = 25
//!
//! [cluster]
//! linkage = "average"
//! ```

use crate::cluster::{HierarchicalClusterer, Linkage};
use crate::graph::{
    GraphBuilder, DEFAULT_AUDIT_SAMPLES, DEFAULT_K, DEFAULT_SEARCH_FLOOR, DEFAULT_TOLERANCE,
};
use crate::index::{IndexParams, Metric};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "fpclust.toml";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },

    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Neighbor index section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Links per node on upper layers (M).
    pub m: usize,
    /// Beam width while linking a new node.
    pub ef_construction: usize,
    /// Diversity factor of the pruning heuristic.
    pub alpha: f32,
    /// Seed for level assignment.
    pub seed: u64,
    /// Insertion workers. Peak memory grows with this value.
    pub parallelism: usize,
    /// Similarity metric.
    pub metric: Metric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let params = IndexParams::default();
        Self {
            m: params.max_connections,
            ef_construction: params.ef_construction,
            alpha: params.alpha,
            seed: params.seed,
            parallelism: 1,
            metric: Metric::default(),
        }
    }
}

/// kNN graph section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Neighbors per item.
    pub k: usize,
    /// Minimum search width of graph queries.
    pub search_floor: usize,
    /// Rows re-checked by the consistency audit.
    pub audit_samples: usize,
    /// Accepted difference between stored and fresh similarities.
    pub tolerance: f32,
    /// Seed for picking audited rows.
    pub seed: u64,
    /// Query workers.
    pub parallelism: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            search_floor: DEFAULT_SEARCH_FLOOR,
            audit_samples: DEFAULT_AUDIT_SAMPLES,
            tolerance: DEFAULT_TOLERANCE,
            seed: 0,
            parallelism: 1,
        }
    }
}

/// Clustering section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Linkage rule for merged clusters.
    pub linkage: Linkage,
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main `fpclust` configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FpclustConfig {
    /// Neighbor index configuration.
    pub index: IndexConfig,
    /// kNN graph configuration.
    pub graph: GraphConfig,
    /// Clustering configuration.
    pub cluster: ClusterConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl FpclustConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < `fpclust.toml` (if present) < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment(Toml::file(DEFAULT_CONFIG_FILE))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Loads configuration from a specific file path, then the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if `path` does not exist, or an
    /// error if parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        Self::figment(Toml::file(path))
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn figment(file: figment::providers::Data<Toml>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(file)
            .merge(Env::prefixed("FPCLUST_").split("__"))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Index
        if !(2..=128).contains(&self.index.m) {
            return Err(invalid(
                "index.m",
                format!("value {} is out of range [2, 128]", self.index.m),
            ));
        }
        if !(1..=4096).contains(&self.index.ef_construction) {
            return Err(invalid(
                "index.ef_construction",
                format!(
                    "value {} is out of range [1, 4096]",
                    self.index.ef_construction
                ),
            ));
        }
        if !self.index.alpha.is_finite() || self.index.alpha < 1.0 {
            return Err(invalid(
                "index.alpha",
                format!("value {} must be a finite number >= 1.0", self.index.alpha),
            ));
        }
        if self.index.parallelism == 0 {
            return Err(invalid("index.parallelism", "value must be >= 1".to_string()));
        }

        // Graph
        if !(1..=1000).contains(&self.graph.k) {
            return Err(invalid(
                "graph.k",
                format!("value {} is out of range [1, 1000]", self.graph.k),
            ));
        }
        if self.graph.search_floor == 0 {
            return Err(invalid("graph.search_floor", "value must be >= 1".to_string()));
        }
        if self.graph.audit_samples == 0 {
            return Err(invalid(
                "graph.audit_samples",
                "value must be >= 1, the audit cannot be disabled".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.graph.tolerance) {
            return Err(invalid(
                "graph.tolerance",
                format!("value {} is out of range [0, 1)", self.graph.tolerance),
            ));
        }
        if self.graph.parallelism == 0 {
            return Err(invalid("graph.parallelism", "value must be >= 1".to_string()));
        }

        // Logging
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging.level",
                format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            ));
        }
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid(
                "logging.format",
                format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.format, valid_formats
                ),
            ));
        }

        Ok(())
    }

    /// Index build parameters from the `[index]` section.
    #[must_use]
    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            max_connections: self.index.m,
            ef_construction: self.index.ef_construction,
            alpha: self.index.alpha,
            seed: self.index.seed,
        }
    }

    /// Graph builder from the `[graph]` section.
    #[must_use]
    pub fn graph_builder(&self) -> GraphBuilder {
        GraphBuilder {
            k: self.graph.k,
            search_floor: self.graph.search_floor,
            audit_samples: self.graph.audit_samples,
            tolerance: self.graph.tolerance,
            seed: self.graph.seed,
            parallelism: self.graph.parallelism,
        }
    }

    /// Clusterer from the `[cluster]` section.
    #[must_use]
    pub fn clusterer(&self) -> HierarchicalClusterer {
        HierarchicalClusterer::new(self.cluster.linkage)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

fn invalid(key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    }
}
