//! Tests for config module

use crate::cluster::Linkage;
use crate::config::*;
use crate::index::Metric;
use figment::Jail;

// ========================================================================
// Defaults
// ========================================================================

#[test]
fn test_config_default_values() {
    // Arrange & Act
    let config = FpclustConfig::default();

    // Assert
    assert_eq!(config.index.m, 16);
    assert_eq!(config.index.ef_construction, 200);
    assert_eq!(config.index.parallelism, 1);
    assert_eq!(config.index.metric, Metric::Angular);
    assert_eq!(config.graph.k, 25);
    assert_eq!(config.graph.search_floor, 50);
    assert_eq!(config.graph.audit_samples, 50);
    assert_eq!(config.cluster.linkage, Linkage::Average);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
fn test_default_index_params_match_index_defaults() {
    let config = FpclustConfig::default();

    assert_eq!(config.index_params(), crate::index::IndexParams::default());
}

// ========================================================================
// TOML parsing
// ========================================================================

#[test]
fn test_config_from_toml_partial_sections() {
    // Arrange
    let toml = r#"
        [index]
        m = 24
        metric = "tanimoto"

        [graph]
        k = 10
        parallelism = 4

        [cluster]
        linkage = "single"
    "#;

    // Act
    let config = FpclustConfig::from_toml(toml).expect("parse");

    // Assert
    assert_eq!(config.index.m, 24);
    assert_eq!(config.index.metric, Metric::Tanimoto);
    assert_eq!(config.index.ef_construction, 200);
    assert_eq!(config.graph.k, 10);
    assert_eq!(config.graph.parallelism, 4);
    assert_eq!(config.graph.audit_samples, 50);
    assert_eq!(config.cluster.linkage, Linkage::Single);
}

#[test]
fn test_config_from_toml_rejects_bad_metric() {
    let result = FpclustConfig::from_toml("[index]\nmetric = \"euclidean\"\n");

    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_config_to_toml_roundtrip() {
    // Arrange
    let mut config = FpclustConfig::default();
    config.graph.k = 7;
    config.cluster.linkage = Linkage::Complete;

    // Act
    let toml = config.to_toml().expect("serialize");
    let parsed = FpclustConfig::from_toml(&toml).expect("parse");

    // Assert
    assert_eq!(parsed, config);
}

// ========================================================================
// Validation
// ========================================================================

fn invalid_key(config: &FpclustConfig) -> Option<String> {
    match config.validate() {
        Err(ConfigError::InvalidValue { key, .. }) => Some(key),
        _ => None,
    }
}

fn with(mutate: impl FnOnce(&mut FpclustConfig)) -> FpclustConfig {
    let mut config = FpclustConfig::default();
    mutate(&mut config);
    config
}

#[test]
fn test_validate_rejects_out_of_range_values() {
    let cases = [
        ("index.m", with(|c| c.index.m = 1)),
        ("index.ef_construction", with(|c| c.index.ef_construction = 0)),
        ("index.alpha", with(|c| c.index.alpha = 0.9)),
        ("index.parallelism", with(|c| c.index.parallelism = 0)),
        ("graph.k", with(|c| c.graph.k = 0)),
        ("graph.search_floor", with(|c| c.graph.search_floor = 0)),
        ("graph.audit_samples", with(|c| c.graph.audit_samples = 0)),
        ("graph.tolerance", with(|c| c.graph.tolerance = -0.5)),
        ("graph.parallelism", with(|c| c.graph.parallelism = 0)),
        ("logging.level", with(|c| c.logging.level = "verbose".into())),
        ("logging.format", with(|c| c.logging.format = "xml".into())),
    ];

    for (key, config) in cases {
        assert_eq!(invalid_key(&config).as_deref(), Some(key));
    }
}

#[test]
fn test_config_error_into_crate_error() {
    let err: crate::Error = ConfigError::FileNotFound("x.toml".into()).into();

    assert_eq!(err.code(), "FPC-012");
}

// ========================================================================
// Derived components
// ========================================================================

#[test]
fn test_graph_builder_from_config() {
    let mut config = FpclustConfig::default();
    config.graph.k = 12;
    config.graph.seed = 7;

    let builder = config.graph_builder();

    assert_eq!(builder.k, 12);
    assert_eq!(builder.seed, 7);
    assert_eq!(builder.search_width(), 50);
}

#[test]
fn test_clusterer_from_config() {
    let mut config = FpclustConfig::default();
    config.cluster.linkage = Linkage::Complete;

    assert_eq!(config.clusterer().linkage(), Linkage::Complete);
}

// ========================================================================
// File and environment sources
// ========================================================================

#[test]
fn test_load_reads_default_file_and_env() {
    Jail::expect_with(|jail| {
        jail.create_file(
            DEFAULT_CONFIG_FILE,
            r#"
                [graph]
                k = 11
                audit_samples = 20
            "#,
        )?;
        jail.set_env("FPCLUST_GRAPH__K", "33");
        jail.set_env("FPCLUST_INDEX__EF_CONSTRUCTION", "64");

        let config = FpclustConfig::load().expect("load");

        assert_eq!(config.graph.k, 33);
        assert_eq!(config.graph.audit_samples, 20);
        assert_eq!(config.index.ef_construction, 64);
        Ok(())
    });
}

#[test]
fn test_load_without_file_uses_defaults() {
    Jail::expect_with(|_jail| {
        let config = FpclustConfig::load().expect("load");

        assert_eq!(config, FpclustConfig::default());
        Ok(())
    });
}

#[test]
fn test_load_from_missing_path_fails() {
    Jail::expect_with(|_jail| {
        let result = FpclustConfig::load_from_path("nope.toml");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
        Ok(())
    });
}

#[test]
fn test_load_from_path() {
    Jail::expect_with(|jail| {
        jail.create_file("custom.toml", "[logging]\nlevel = \"debug\"\n")?;

        let config = FpclustConfig::load_from_path("custom.toml").expect("load");

        assert_eq!(config.logging.level, "debug");
        Ok(())
    });
}
