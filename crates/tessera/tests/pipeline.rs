//! End-to-end tests of export, quantization and the artifact contract.

use std::path::Path;

use tessera::prelude::*;
use tessera::{sha256_file, DEFAULT_ORIGINAL_NAME, DEFAULT_QUANTIZED_NAME};
use tessera_graph::{artifact_path, metadata_keys, ElementType, TensorData, TensorProto};
use tessera_quant::QuantMode;

fn tower() -> VisionTower {
    VisionTower::new(VisionTowerConfig::tiny()).unwrap()
}

fn sample() -> Tensor<f32> {
    prepare_sample(None, &ClipPreprocessor::default(), 7).unwrap()
}

fn export_to(dir: &Path) -> tessera_trace::ExportedGraph {
    let options = ExportOptions::default().with_output_dir(dir);
    prepare_graph(&tower(), &sample(), &options).unwrap()
}

fn export_and_quantize(dir: &Path, config: &QuantConfig) -> QuantizedArtifact {
    export_to(dir);
    quantize_graph(dir, DEFAULT_ORIGINAL_NAME, DEFAULT_QUANTIZED_NAME, config).unwrap()
}

fn load(dir: &Path, name: &str) -> ModelProto {
    GraphLoader::load_named(dir, name).unwrap().into_model()
}

fn int_codes(t: &TensorProto) -> Vec<i32> {
    match &t.data {
        TensorData::Int8(v) => v.iter().map(|&x| i32::from(x)).collect(),
        TensorData::Uint8(v) => v.iter().map(|&x| i32::from(x)).collect(),
        other => panic!("{} is not an 8-bit tensor: {:?}", t.name, other.elem_type()),
    }
}

/// Test 1: export declares a dynamic batch and the projection width
#[test]
fn test_export_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let exported = export_to(dir.path());

    assert_eq!(exported.name, "model_prequantized");
    assert_eq!(exported.path, artifact_path(dir.path(), "model_prequantized"));
    assert_eq!(exported.input_shape.to_string(), "[batch_size, 3, 224, 224]");
    assert_eq!(exported.output_shape.to_string(), "[batch_size, 768]");

    let model = load(dir.path(), "model_prequantized");
    assert_eq!(model.graph.input.len(), 1);
    assert_eq!(model.graph.output.len(), 1);
    assert_eq!(model.graph.input[0].name, "preprocessed_image");
    assert_eq!(model.graph.output[0].name, "embeddings");
    assert!(!model.is_quantized());
}

/// Test 2: every weight of an allow-listed operator is integer-encoded
#[test]
fn test_default_quantization_encodes_weights() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = export_and_quantize(dir.path(), &QuantConfig::default());
    let original = load(dir.path(), "model_prequantized");
    let quantized = load(dir.path(), "model");

    // patch conv + 6 projections per layer + visual projection
    assert_eq!(artifact.report.tensors.len(), 1 + 2 * 6 + 1);
    assert!(artifact.bytes < artifact.source_bytes);
    assert_eq!(quantized.metadata(metadata_keys::QUANTIZED), Some("true"));

    for ann in &quantized.graph.quantization_annotation {
        let q = quantized.graph.get_initializer(&ann.quantized_name).unwrap();
        assert_eq!(q.elem_type(), ElementType::Int8);
        let scale = quantized.graph.get_initializer(&ann.scale_name).unwrap();
        assert!(scale.as_f32().unwrap().iter().all(|s| s.is_finite() && *s > 0.0));
        assert!(quantized.graph.get_initializer(&ann.tensor_name).is_none());
        assert!(original.graph.get_initializer(&ann.tensor_name).is_some());
    }

    // everything not annotated is carried over unchanged
    let annotated: Vec<&str> = quantized
        .graph
        .quantization_annotation
        .iter()
        .map(|a| a.tensor_name.as_str())
        .collect();
    for init in &original.graph.initializer {
        if !annotated.contains(&init.name.as_str()) {
            assert_eq!(quantized.graph.get_initializer(&init.name), Some(init));
        }
    }
}

/// Test 3: quantized and original graphs agree on a batch of four
#[test]
fn test_batch_agreement() {
    let dir = tempfile::tempdir().unwrap();
    export_and_quantize(dir.path(), &QuantConfig::default());
    let original = load(dir.path(), "model_prequantized");
    let quantized = load(dir.path(), "model");

    let batch = random_batch(&original.graph.input[0].shape, 4, 42).unwrap();
    let cmp = compare_models(&original, &quantized, &batch).unwrap();
    assert_eq!(cmp.output_shape, vec![4, 768]);
    assert!(cmp.relative_l2 < 0.1, "relative L2 {}", cmp.relative_l2);

    let qdq = QuantConfig::default().with_format(QuantFormat::Qdq);
    quantize_graph(dir.path(), "model_prequantized", "model_qdq", &qdq).unwrap();
    let cmp = compare_models(&original, &load(dir.path(), "model_qdq"), &batch).unwrap();
    assert!(cmp.relative_l2 < 0.1, "relative L2 {}", cmp.relative_l2);
}

/// Test 4: identical inputs produce byte-identical artifacts
#[test]
fn test_determinism() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    export_and_quantize(a.path(), &QuantConfig::default());
    export_and_quantize(b.path(), &QuantConfig::default());

    for name in ["model_prequantized", "model"] {
        assert_eq!(
            sha256_file(artifact_path(a.path(), name)).unwrap(),
            sha256_file(artifact_path(b.path(), name)).unwrap(),
            "{name} differs between runs"
        );
    }

    quantize_graph(a.path(), "model_prequantized", "model_again", &QuantConfig::default()).unwrap();
    assert_eq!(
        sha256_file(artifact_path(a.path(), "model")).unwrap(),
        sha256_file(artifact_path(a.path(), "model_again")).unwrap()
    );
}

/// Test 5: quantization never modifies the original artifact
#[test]
fn test_original_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let exported = export_to(dir.path());
    let before = sha256_file(&exported.path).unwrap();

    for config in [
        QuantConfig::default(),
        QuantConfig::default().with_per_channel(true),
        QuantConfig::default().with_format(QuantFormat::Qdq),
    ] {
        quantize_graph(dir.path(), "model_prequantized", "model", &config).unwrap();
        assert_eq!(sha256_file(&exported.path).unwrap(), before);
    }
}

/// Test 6: declared inputs and outputs keep shape and element type
#[test]
fn test_interface_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let config = QuantConfig::default()
        .with_per_channel(true)
        .with_weight_type(WeightType::QUInt8);
    export_and_quantize(dir.path(), &config);
    let original = load(dir.path(), "model_prequantized");
    let quantized = load(dir.path(), "model");

    assert_eq!(original.graph.input, quantized.graph.input);
    assert_eq!(original.graph.output, quantized.graph.output);
    assert_eq!(quantized.graph.input[0].elem_type, ElementType::Float);
}

/// Test 7: nodes that do not read a quantized weight are identical
#[test]
fn test_topology_minimal() {
    let dir = tempfile::tempdir().unwrap();
    export_and_quantize(dir.path(), &QuantConfig::default());
    let original = load(dir.path(), "model_prequantized");
    let quantized = load(dir.path(), "model");

    assert_eq!(original.graph.node.len(), quantized.graph.node.len());
    let mut rewritten = 0;
    for (before, after) in original.graph.node.iter().zip(&quantized.graph.node) {
        if before == after {
            continue;
        }
        rewritten += 1;
        assert_eq!(after.op_type, format!("Dequant{}", before.op_type));
        assert_eq!(after.output, before.output);
        assert_eq!(after.attribute, before.attribute);
        assert!(after.input.iter().any(|i| i.ends_with("_quantized")));
    }
    assert_eq!(rewritten, 14);
}

/// Test 8: a quantized artifact cannot be quantized again
#[test]
fn test_rejects_quantized_input() {
    let dir = tempfile::tempdir().unwrap();
    export_and_quantize(dir.path(), &QuantConfig::default());

    let err = quantize_graph(dir.path(), "model", "model_twice", &QuantConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Quantize(tessera_quant::QuantError::AlreadyQuantized(_))
    ));
    assert!(!artifact_path(dir.path(), "model_twice").exists());
}

/// Test 9: unsupported settings fail before any file is written
#[test]
fn test_unsupported_config_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let exported = export_to(dir.path());
    let before = sha256_file(&exported.path).unwrap();

    let static_mode = QuantConfig {
        mode: QuantMode::Static,
        ..QuantConfig::default()
    };
    let activations = QuantConfig {
        activation_quantization: true,
        ..QuantConfig::default()
    };
    for config in [static_mode, activations] {
        let err = quantize_graph(dir.path(), "model_prequantized", "model", &config).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Quantize(tessera_quant::QuantError::UnsupportedOperator(_))
        ));
    }
    assert!(!artifact_path(dir.path(), "model").exists());
    assert_eq!(sha256_file(&exported.path).unwrap(), before);

    let err = quantize_graph(dir.path(), "model_prequantized", "model_prequantized", &QuantConfig::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}

/// Test 10: dequantized weights stay within one step of the originals
#[test]
fn test_round_trip_bound() {
    let dir = tempfile::tempdir().unwrap();
    export_and_quantize(dir.path(), &QuantConfig::default());
    let original = load(dir.path(), "model_prequantized");
    let quantized = load(dir.path(), "model");

    for ann in &quantized.graph.quantization_annotation {
        assert_eq!(ann.axis, None);
        let weights = original.graph.get_initializer(&ann.tensor_name).unwrap().as_f32().unwrap();
        let codes = int_codes(quantized.graph.get_initializer(&ann.quantized_name).unwrap());
        let scale = quantized.graph.get_initializer(&ann.scale_name).unwrap().as_f32().unwrap()[0];
        let zp = int_codes(quantized.graph.get_initializer(&ann.zero_point_name).unwrap())[0];

        assert_eq!(codes.len(), weights.len());
        for (w, q) in weights.iter().zip(&codes) {
            let restored = (q - zp) as f32 * scale;
            assert!((restored - w).abs() <= scale, "{}: {w} -> {restored}", ann.tensor_name);
        }
    }
}

/// Test 11: the one-call pipeline writes both artifacts
#[test]
fn test_run_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::default().with_dir(dir.path());
    let outcome = run_pipeline(&tower(), &sample(), &config).unwrap();

    assert!(outcome.exported.path.exists());
    assert!(outcome.quantized.path.exists());
    assert_eq!(outcome.quantized.source_path, outcome.exported.path);
    assert_eq!(outcome.quantized.name, "model");
    assert!(outcome.quantized.report.compression_ratio() > 1.0);
}
