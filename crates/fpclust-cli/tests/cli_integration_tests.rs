//! CLI Integration Tests
//!
//! Tests for `fpclust` commands using `assert_cmd`.

use assert_cmd::Command;
use fpclust_core::{Fingerprint, FingerprintStore};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get the CLI binary command
#[allow(deprecated)]
fn fpclust_cmd() -> Command {
    let mut cmd = Command::cargo_bin("fpclust").unwrap();
    cmd.env_remove("RUST_LOG").arg("--quiet");
    cmd
}

/// Two groups of 10 fingerprints over disjoint bits, written to `dir`.
fn write_two_groups(dir: &Path) -> PathBuf {
    let path = dir.join("fps.bin");
    let fps: Vec<Fingerprint> = (0..20)
        .map(|i| {
            let base = if i < 10 { 0 } else { 32 };
            Fingerprint::from_positions(64, &[base, base + 1, base + 2, base + 3 + i % 4]).unwrap()
        })
        .collect();
    FingerprintStore::new(&path, 64).unwrap().write(&fps).unwrap();
    path
}

// =============================================================================
// Help & Version Tests
// =============================================================================

#[test]
fn test_help_displays_usage() {
    fpclust_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fingerprints"))
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_displays_version() {
    fpclust_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fpclust"));
}

#[test]
fn test_invalid_command_shows_error() {
    fpclust_cmd()
        .arg("invalid_command_xyz")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// =============================================================================
// Run Command Tests
// =============================================================================

#[test]
fn test_run_writes_labels_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());

    fpclust_cmd()
        .args(["run", "--fpsize", "64", "-k", "4", "--n-clusters", "2"])
        .arg("--fingerprints")
        .arg(&fps)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("item,cluster\n0,0\n"))
        .stdout(predicate::str::contains("\n10,1\n"))
        .stderr(predicate::str::contains("20 items in 2 clusters"));
}

#[test]
fn test_run_with_max_size_writes_csv_and_dendrogram() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());
    let labels = temp_dir.path().join("labels.csv");
    let tree = temp_dir.path().join("tree.json");

    fpclust_cmd()
        .args(["run", "--fpsize", "64", "-k", "4", "--max-size", "10"])
        .arg("--fingerprints")
        .arg(&fps)
        .arg("--output")
        .arg(&labels)
        .arg("--dendrogram")
        .arg(&tree)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let csv = fs::read_to_string(&labels).unwrap();
    assert_eq!(csv.lines().count(), 21);
    assert!(csv.lines().skip(1).take(10).all(|l| l.ends_with(",0")));
    assert!(csv.lines().skip(11).all(|l| l.ends_with(",1")));
    assert!(tree.exists());
}

#[test]
fn test_run_requires_a_cut_policy() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());

    fpclust_cmd()
        .args(["run", "--fpsize", "64"])
        .arg("--fingerprints")
        .arg(&fps)
        .assert()
        .failure();
}

#[test]
fn test_run_rejects_two_cut_policies() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());

    fpclust_cmd()
        .args(["run", "--fpsize", "64", "--n-clusters", "2", "--max-size", "5"])
        .arg("--fingerprints")
        .arg(&fps)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_run_with_wrong_fpsize_fails() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());

    // 20 records of 8 bytes are not a whole number of 24-byte records.
    fpclust_cmd()
        .args(["run", "--fpsize", "192", "--n-clusters", "2"])
        .arg("--fingerprints")
        .arg(&fps)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FPC-001"));
}

#[test]
fn test_run_with_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    fpclust_cmd()
        .args(["run", "--fpsize", "64", "--n-clusters", "2"])
        .arg("--fingerprints")
        .arg(temp_dir.path().join("missing.bin"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read fingerprints"));
}

// =============================================================================
// Staged Commands Tests
// =============================================================================

#[test]
fn test_index_cluster_cut_stages() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());
    let index = temp_dir.path().join("fps.idx");
    let tree = temp_dir.path().join("tree.json");
    let labels = temp_dir.path().join("labels.csv");

    fpclust_cmd()
        .args(["index", "--fpsize", "64"])
        .arg("--fingerprints")
        .arg(&fps)
        .arg("--output")
        .arg(&index)
        .assert()
        .success()
        .stderr(predicate::str::contains("Indexed 20 fingerprints"));

    fpclust_cmd()
        .args(["cluster", "--fpsize", "64", "-k", "4", "--linkage", "single"])
        .arg("--index")
        .arg(&index)
        .arg("--output")
        .arg(&tree)
        .assert()
        .success()
        .stderr(predicate::str::contains("Clustered 20 items"));

    fpclust_cmd()
        .args(["cut", "--threshold", "0.99"])
        .arg("--dendrogram")
        .arg(&tree)
        .arg("--output")
        .arg(&labels)
        .assert()
        .success()
        .stderr(predicate::str::contains("20 items in 2 clusters (largest: 10)"));

    let csv = fs::read_to_string(&labels).unwrap();
    assert!(csv.starts_with("item,cluster\n0,0\n"));
}

#[test]
fn test_cluster_with_other_metric_than_index_fails() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());
    let index = temp_dir.path().join("fps.idx");

    fpclust_cmd()
        .args(["index", "--fpsize", "64", "--metric", "angular"])
        .arg("--fingerprints")
        .arg(&fps)
        .arg("--output")
        .arg(&index)
        .assert()
        .success();

    fpclust_cmd()
        .args(["cluster", "--fpsize", "64", "--metric", "tanimoto"])
        .arg("--index")
        .arg(&index)
        .arg("--output")
        .arg(temp_dir.path().join("tree.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("FPC-009"));
}

#[test]
fn test_cut_rejects_invalid_dendrogram() {
    let temp_dir = TempDir::new().unwrap();
    let tree = temp_dir.path().join("tree.json");
    fs::write(&tree, r#"{"n_leaves":3,"merges":[]}"#).unwrap();

    fpclust_cmd()
        .args(["cut", "--n-clusters", "2"])
        .arg("--dendrogram")
        .arg(&tree)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FPC-001"));
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_invalid_config_value_fails() {
    let temp_dir = TempDir::new().unwrap();
    let fps = write_two_groups(temp_dir.path());
    let config = temp_dir.path().join("fpclust.toml");
    fs::write(&config, "[graph]\nk = 0\n").unwrap();

    fpclust_cmd()
        .args(["run", "--fpsize", "64", "--n-clusters", "2"])
        .arg("--config")
        .arg(&config)
        .arg("--fingerprints")
        .arg(&fps)
        .assert()
        .failure()
        .stderr(predicate::str::contains("graph.k"));
}

#[test]
fn test_missing_config_file_fails() {
    let temp_dir = TempDir::new().unwrap();

    fpclust_cmd()
        .args(["cut", "--n-clusters", "1", "--dendrogram", "tree.json"])
        .arg("--config")
        .arg(temp_dir.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
