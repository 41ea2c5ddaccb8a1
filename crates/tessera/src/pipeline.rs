//! Export and Quantization Pipeline
//!
//! Chains the stages by artifact name: a model is exported to
//! `<dir>/<original>.graph`, which is then loaded, copied, quantized and
//! written to `<dir>/<quantized>.graph`. The original artifact is only ever
//! read after export.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_graph::{artifact_path, write_model, GraphError, GraphLoader};
use tessera_quant::{GraphQuantizer, QuantConfig, QuantReport};
use tessera_tensor::Tensor;
use tessera_trace::{ExportOptions, ExportedGraph, GraphExporter, Module, TraceError};
use tessera_vision::{load_image, synthetic_image, ClipPreprocessor, ImageSource};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// Default name of the exported float artifact.
pub const DEFAULT_ORIGINAL_NAME: &str = "model_prequantized";

/// Default name of the quantized artifact.
pub const DEFAULT_QUANTIZED_NAME: &str = "model";

// =============================================================================
// Configuration
// =============================================================================

/// Settings for a full export-then-quantize run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Export settings; `model_name` is the original artifact name.
    pub export: ExportOptions,
    /// Quantization settings.
    pub quantize: QuantConfig,
    /// Name of the quantized artifact, written next to the original.
    pub quantized_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            export: ExportOptions::default(),
            quantize: QuantConfig::default(),
            quantized_name: DEFAULT_QUANTIZED_NAME.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Sets the directory both artifacts are written to.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export.output_dir = dir.into();
        self
    }

    /// Rejects configurations that would overwrite the original artifact.
    pub fn validate(&self) -> PipelineResult<()> {
        check_names(&self.export.model_name, &self.quantized_name)
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// A quantized artifact on disk.
#[derive(Debug, Clone)]
pub struct QuantizedArtifact {
    /// Artifact name.
    pub name: String,
    /// Path of the written artifact.
    pub path: PathBuf,
    /// Path of the original it was derived from.
    pub source_path: PathBuf,
    /// Size of the original artifact in bytes.
    pub source_bytes: usize,
    /// Size of the written artifact in bytes.
    pub bytes: usize,
    /// What the quantizer did.
    pub report: QuantReport,
}

/// Both artifacts of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The exported float graph.
    pub exported: ExportedGraph,
    /// The quantized graph.
    pub quantized: QuantizedArtifact,
}

// =============================================================================
// Stages
// =============================================================================

fn check_names(original: &str, quantized: &str) -> PipelineResult<()> {
    if original.is_empty() || quantized.is_empty() {
        return Err(PipelineError::InvalidConfig("artifact names must not be empty".to_string()));
    }
    if original == quantized {
        return Err(PipelineError::InvalidConfig(format!(
            "quantized name '{quantized}' equals the original name; the original would be overwritten"
        )));
    }
    Ok(())
}

/// Produces the sample tensor: the preprocessed image at `source`, or a
/// preprocessed synthetic image drawn from `seed` when no source is given.
pub fn prepare_sample(
    source: Option<&ImageSource>,
    preprocessor: &ClipPreprocessor,
    seed: u64,
) -> PipelineResult<Tensor<f32>> {
    let image = match source {
        Some(source) => load_image(source)?,
        None => {
            let side = preprocessor.shortest_edge;
            synthetic_image(side, side, seed)
        }
    };
    let sample = preprocessor.preprocess(&image)?;
    info!(
        shape = ?sample.shape(),
        precision = %preprocessor.precision,
        source = %source.map_or_else(|| format!("synthetic(seed={seed})"), ToString::to_string),
        "prepared sample tensor"
    );
    Ok(sample)
}

/// Exports `model` traced over `sample` to `<output_dir>/<model_name>.graph`.
pub fn prepare_graph<M: Module + ?Sized>(
    model: &M,
    sample: &Tensor<f32>,
    options: &ExportOptions,
) -> PipelineResult<ExportedGraph> {
    let exported = GraphExporter::new(options.clone())
        .export(model, sample)
        .map_err(|e| match e {
            TraceError::Graph(e @ GraphError::Write { .. }) => PipelineError::Write(e),
            other => PipelineError::Trace(other),
        })?;
    info!(
        name = %exported.name,
        input = %exported.input_shape,
        output = %exported.output_shape,
        "graph prepared"
    );
    Ok(exported)
}

/// Quantizes the artifact at `source` into `target`.
///
/// The quantizer is configured before anything is read, so an unsupported
/// configuration touches no files. The original is loaded once and only a
/// working copy is rewritten.
pub fn quantize_artifact(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    config: &QuantConfig,
) -> PipelineResult<QuantizedArtifact> {
    let (source, target) = (source.as_ref(), target.as_ref());
    if source == target {
        return Err(PipelineError::InvalidConfig(format!(
            "refusing to overwrite {} with its quantized form",
            source.display()
        )));
    }

    let quantizer = GraphQuantizer::new(config.clone())?;
    let loaded = GraphLoader::load(source).map_err(PipelineError::Load)?;
    let quantized = quantizer.quantize(loaded.working_copy())?;
    let written = write_model(&quantized.model, target).map_err(PipelineError::Write)?;

    let name = target
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    info!(
        source = %source.display(),
        path = %written.path.display(),
        bytes_before = loaded.byte_len(),
        bytes_after = written.bytes,
        "graph quantized"
    );

    Ok(QuantizedArtifact {
        name,
        path: written.path,
        source_path: source.to_path_buf(),
        source_bytes: loaded.byte_len(),
        bytes: written.bytes,
        report: quantized.report,
    })
}

/// Quantizes `<dir>/<original_name>.graph` into `<dir>/<model_name>.graph`.
pub fn quantize_graph(
    dir: impl AsRef<Path>,
    original_name: &str,
    model_name: &str,
    config: &QuantConfig,
) -> PipelineResult<QuantizedArtifact> {
    check_names(original_name, model_name)?;
    let dir = dir.as_ref();
    quantize_artifact(
        artifact_path(dir, original_name),
        artifact_path(dir, model_name),
        config,
    )
}

/// Exports `model` and quantizes the result.
pub fn run_pipeline<M: Module + ?Sized>(
    model: &M,
    sample: &Tensor<f32>,
    config: &PipelineConfig,
) -> PipelineResult<PipelineOutcome> {
    config.validate()?;
    let exported = prepare_graph(model, sample, &config.export)?;
    let quantized = quantize_graph(
        &config.export.output_dir,
        &exported.name,
        &config.quantized_name,
        &config.quantize,
    )?;
    Ok(PipelineOutcome { exported, quantized })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_must_differ() {
        assert!(check_names("a", "b").is_ok());
        assert!(matches!(check_names("a", "a"), Err(PipelineError::InvalidConfig(_))));
        assert!(check_names("", "b").is_err());

        let config = PipelineConfig {
            quantized_name: DEFAULT_ORIGINAL_NAME.to_string(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_original_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = quantize_graph(dir.path(), "absent", "model", &QuantConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Load(_)));
        assert!(!artifact_path(dir.path(), "model").exists());
    }

    #[test]
    fn test_export_storage_failure_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();

        let weight = Tensor::from_vec(vec![1.0, 0.5, -0.5, 2.0, 0.0, 1.5], &[3, 2]).unwrap();
        let layer = tessera_trace::Linear::from_weights("proj", weight, None).unwrap();
        let sample = Tensor::from_vec(vec![0.25, -1.0], &[1, 2]).unwrap();
        let options = ExportOptions::default().with_output_dir(blocker.clone());

        let err = prepare_graph(&layer, &sample, &options).unwrap_err();
        assert!(matches!(err, PipelineError::Write(GraphError::Write { .. })), "{err}");
        assert_eq!(err.stage(), "write");
    }

    #[test]
    fn test_synthetic_sample() {
        let preprocessor = ClipPreprocessor::default().with_size(32);
        let a = prepare_sample(None, &preprocessor, 5).unwrap();
        let b = prepare_sample(None, &preprocessor, 5).unwrap();
        assert_eq!(a.shape(), &[1, 3, 32, 32]);
        assert_eq!(a, b);
    }
}
