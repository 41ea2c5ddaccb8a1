//! End-to-end integration tests for the Tessera CLI.
//!
//! These tests invoke the `tessera` binary the way a user would and check the
//! artifacts it leaves behind.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// Get a Command for the tessera binary, running inside `dir`
fn tessera_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tessera").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn export_synthetic(dir: &Path) {
    tessera_cmd(dir)
        .args(["export", "--synthetic", "--output-dir"])
        .arg(dir)
        .assert()
        .success();
}

// =============================================================================
// Test 1: Help and Version
// =============================================================================

#[test]
fn test_cli_help() {
    let temp = TempDir::new().unwrap();
    tessera_cmd(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("quantize"))
        .stdout(predicate::str::contains("compare"));
}

#[test]
fn test_cli_version() {
    let temp = TempDir::new().unwrap();
    tessera_cmd(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tessera"));
}

// =============================================================================
// Test 2: Export
// =============================================================================

#[test]
fn test_export_json_reports_interface() {
    let temp = TempDir::new().unwrap();
    let json = json_stdout(
        tessera_cmd(temp.path())
            .args(["export", "--synthetic", "--json", "--output-dir"])
            .arg(temp.path()),
    );

    assert_eq!(json["name"], "model_prequantized");
    assert_eq!(json["input"]["name"], "preprocessed_image");
    assert_eq!(json["input"]["shape"], "[batch_size, 3, 224, 224]");
    assert_eq!(json["output"]["name"], "embeddings");
    assert_eq!(json["output"]["shape"], "[batch_size, 768]");
    assert!(temp.path().join("model_prequantized.graph").exists());
}

#[test]
fn test_export_text_output() {
    let temp = TempDir::new().unwrap();
    tessera_cmd(temp.path())
        .args(["export", "--synthetic", "--model-name", "float", "--output-dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported float"))
        .stdout(predicate::str::contains("preprocessed_image float32 [batch_size, 3, 224, 224]"));
    assert!(temp.path().join("float.graph").exists());
}

#[test]
fn test_export_bad_image_fails() {
    let temp = TempDir::new().unwrap();
    let bogus = temp.path().join("not_an_image.png");
    fs::write(&bogus, b"definitely not a png").unwrap();

    tessera_cmd(temp.path())
        .args(["export", "--image"])
        .arg(&bogus)
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("Tensor source error"));
    assert!(!temp.path().join("model_prequantized.graph").exists());
}

// =============================================================================
// Test 3: Quantize
// =============================================================================

#[test]
fn test_quantize_after_export() {
    let temp = TempDir::new().unwrap();
    export_synthetic(temp.path());

    let json = json_stdout(
        tessera_cmd(temp.path())
            .args(["quantize", "--json", "--dir"])
            .arg(temp.path()),
    );
    assert_eq!(json["name"], "model");
    assert_eq!(json["report"]["tensors"].as_array().unwrap().len(), 14);
    assert!(json["bytes"].as_u64().unwrap() < json["source_bytes"].as_u64().unwrap());
    assert!(temp.path().join("model.graph").exists());
}

#[test]
fn test_quantize_qdq_per_channel() {
    let temp = TempDir::new().unwrap();
    export_synthetic(temp.path());

    tessera_cmd(temp.path())
        .args(["quantize", "--format", "qdq", "--per-channel", "--model-name", "model_qdq", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Inserted nodes"));

    let info = json_stdout(
        tessera_cmd(temp.path())
            .args(["inspect", "--json"])
            .arg(temp.path().join("model_qdq.graph")),
    );
    assert_eq!(info["op_histogram"]["DequantizeLinear"], 14);
    assert!(info["quantization"][0]["axis"].is_number());
}

#[test]
fn test_quantize_missing_original_fails() {
    let temp = TempDir::new().unwrap();
    tessera_cmd(temp.path())
        .args(["quantize", "--dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Load error"));
}

#[test]
fn test_quantize_rejects_bad_weight_type() {
    let temp = TempDir::new().unwrap();
    tessera_cmd(temp.path())
        .args(["quantize", "--weight-type", "int4", "--dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_quantize_refuses_same_name() {
    let temp = TempDir::new().unwrap();
    export_synthetic(temp.path());
    let original = temp.path().join("model_prequantized.graph");
    let before = fs::read(&original).unwrap();

    tessera_cmd(temp.path())
        .args(["quantize", "--model-name", "model_prequantized", "--dir"])
        .arg(temp.path())
        .assert()
        .failure();
    assert_eq!(fs::read(&original).unwrap(), before);
}

#[test]
fn test_quantize_twice_rejected() {
    let temp = TempDir::new().unwrap();
    export_synthetic(temp.path());
    tessera_cmd(temp.path())
        .args(["quantize", "--dir"])
        .arg(temp.path())
        .assert()
        .success();

    tessera_cmd(temp.path())
        .args(["quantize", "--original", "model", "--model-name", "again", "--dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already quantized"));
    assert!(!temp.path().join("again.graph").exists());
}

// =============================================================================
// Test 4: Pipeline, Inspect, Compare
// =============================================================================

#[test]
fn test_pipeline_inspect_compare() {
    let temp = TempDir::new().unwrap();
    tessera_cmd(temp.path())
        .args(["pipeline", "--synthetic", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[1/2]"))
        .stdout(predicate::str::contains("[2/2]"));

    let original = temp.path().join("model_prequantized.graph");
    let quantized = temp.path().join("model.graph");

    let info = json_stdout(tessera_cmd(temp.path()).args(["inspect", "--json"]).arg(&quantized));
    assert_eq!(info["quantized"], true);
    assert!(info["op_histogram"]["DequantMatMul"].as_u64().unwrap() > 0);
    assert_eq!(info["inputs"][0]["shape"], "[batch_size, 3, 224, 224]");
    assert!(info["initializers"]["int8"]["count"].as_u64().unwrap() >= 14);

    tessera_cmd(temp.path())
        .arg("inspect")
        .arg(&original)
        .assert()
        .success()
        .stdout(predicate::str::contains("Operators"))
        .stdout(predicate::str::contains("embeddings"));

    let cmp = json_stdout(
        tessera_cmd(temp.path())
            .args(["compare", "--batch-size", "4", "--json"])
            .arg(&original)
            .arg(&quantized),
    );
    assert_eq!(cmp["batch_size"], 4);
    assert!(cmp["relative_l2"].as_f64().unwrap() < 0.1);
}

#[test]
fn test_pipeline_reads_config_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("tessera.toml");
    fs::write(
        &config,
        "[export]\nmodel_name = \"float\"\n\n[quantize]\nmodel_name = \"small\"\nweight_type = \"uint8\"\n",
    )
    .unwrap();

    tessera_cmd(temp.path())
        .args(["pipeline", "--synthetic", "--dir"])
        .arg(temp.path())
        .assert()
        .success();
    assert!(temp.path().join("float.graph").exists());
    assert!(temp.path().join("small.graph").exists());

    tessera_cmd(temp.path())
        .args(["--config", "missing.toml", "inspect"])
        .arg(temp.path().join("small.graph"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn test_inspect_missing_file_fails() {
    let temp = TempDir::new().unwrap();
    tessera_cmd(temp.path())
        .args(["inspect", "nope.graph"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
