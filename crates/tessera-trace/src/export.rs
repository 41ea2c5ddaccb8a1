//! Graph Export
//!
//! Traces a module over one sample input, verifies that the recorded graph
//! reproduces the eager computation and generalizes over the batch
//! dimension, then writes it as a graph artifact.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tessera_graph::{artifact_path, write_model, ModelProto, Session, TensorShape};
use tessera_tensor::Tensor;
use tracing::{debug, info};

use crate::error::{TraceError, TraceResult};
use crate::module::Module;
use crate::tracer::Tracer;

// =============================================================================
// Options
// =============================================================================

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Artifact name; the file is `<output_dir>/<model_name>.graph`.
    pub model_name: String,
    /// Name of the declared graph input.
    pub input_name: String,
    /// Name of the declared graph output.
    pub output_name: String,
    /// Declare the leading dimension as a symbolic batch size.
    pub dynamic_batch: bool,
    /// Verify the graph against eager execution before writing.
    pub check_trace: bool,
    /// Batch size used to check batch generalization.
    pub check_batch_size: usize,
    /// Allowed element-wise difference, relative to the output magnitude.
    pub tolerance: f32,
    /// Directory the artifact is written to.
    pub output_dir: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            model_name: "model_prequantized".to_string(),
            input_name: "preprocessed_image".to_string(),
            output_name: "embeddings".to_string(),
            dynamic_batch: true,
            check_trace: true,
            check_batch_size: 2,
            tolerance: 1e-4,
            output_dir: PathBuf::from("."),
        }
    }
}

impl ExportOptions {
    /// Sets the artifact name.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Sets the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Enables or disables trace checking.
    pub fn with_check_trace(mut self, check: bool) -> Self {
        self.check_trace = check;
        self
    }
}

// =============================================================================
// Results
// =============================================================================

/// One traced execution.
#[derive(Debug, Clone)]
pub struct TracedGraph {
    /// The recorded model.
    pub model: ModelProto,
    /// Output computed eagerly during the trace.
    pub output: Tensor<f32>,
    /// Operator types in recording order.
    pub op_sequence: Vec<String>,
}

/// A graph written to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedGraph {
    /// Artifact name, usable as the original name for quantization.
    pub name: String,
    /// Path of the written artifact.
    pub path: PathBuf,
    /// Declared input shape.
    pub input_shape: TensorShape,
    /// Declared output shape.
    pub output_shape: TensorShape,
    /// Number of nodes.
    pub node_count: usize,
    /// Artifact size in bytes.
    pub bytes: usize,
}

// =============================================================================
// Exporter
// =============================================================================

/// Traces modules into graphs and writes them.
#[derive(Debug, Clone, Default)]
pub struct GraphExporter {
    options: ExportOptions,
}

impl GraphExporter {
    /// Creates an exporter.
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    /// Export options.
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Traces `model` once over `input`.
    pub fn trace<M: Module + ?Sized>(&self, model: &M, input: &Tensor<f32>) -> TraceResult<TracedGraph> {
        let tracer = Tracer::new(&self.options.model_name);
        let tracer = if self.options.dynamic_batch {
            tracer
        } else {
            tracer.with_fixed_batch()
        };

        let traced_input = tracer.input(&self.options.input_name, input.clone())?;
        let output = model.forward(&traced_input)?;
        let op_sequence = tracer.op_sequence();
        let graph = tracer.finish(&output, &self.options.output_name)?;

        Ok(TracedGraph {
            model: graph,
            output: output.into_value(),
            op_sequence,
        })
    }

    /// Traces `model` over `sample`, checks the trace when enabled, and
    /// writes the artifact.
    pub fn export<M: Module + ?Sized>(&self, model: &M, sample: &Tensor<f32>) -> TraceResult<ExportedGraph> {
        validate_sample(sample)?;
        info!(
            model = %self.options.model_name,
            module = model.name(),
            input_shape = ?sample.shape(),
            parameters = model.num_parameters(),
            "tracing model"
        );

        let traced = self.trace(model, sample)?;
        if self.options.check_trace {
            self.check(model, sample, &traced)?;
        }

        let path = artifact_path(&self.options.output_dir, &self.options.model_name);
        let report = write_model(&traced.model, &path)?;
        let graph = &traced.model.graph;

        info!(
            path = %report.path.display(),
            nodes = graph.node.len(),
            initializers = graph.initializer.len(),
            bytes = report.bytes,
            "exported graph"
        );

        Ok(ExportedGraph {
            name: self.options.model_name.clone(),
            path: report.path,
            input_shape: graph.input[0].shape.clone(),
            output_shape: graph.output[0].shape.clone(),
            node_count: graph.node.len(),
            bytes: report.bytes,
        })
    }

    /// Verifies a trace: the graph reproduces the sample output, and a
    /// re-trace on a larger batch records the same operators and agrees
    /// with the graph run on that batch.
    pub fn check<M: Module + ?Sized>(
        &self,
        model: &M,
        sample: &Tensor<f32>,
        traced: &TracedGraph,
    ) -> TraceResult<()> {
        let session = Session::new(&traced.model)?;
        let replay = session.run_single(sample.clone())?;
        self.compare(&replay, &traced.output)?;
        debug!(nodes = traced.op_sequence.len(), "graph reproduces traced output");

        if !self.options.dynamic_batch {
            return Ok(());
        }

        let batch_size = self.options.check_batch_size.max(2);
        let batch = distinct_batch(sample, batch_size)?;
        let retraced = self.trace(model, &batch)?;

        if retraced.op_sequence != traced.op_sequence {
            let position = traced
                .op_sequence
                .iter()
                .zip(&retraced.op_sequence)
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| traced.op_sequence.len().min(retraced.op_sequence.len()));
            return Err(TraceError::ControlFlowDivergence(format!(
                "batch {batch_size} recorded {} nodes vs {} (first difference at node {position})",
                retraced.op_sequence.len(),
                traced.op_sequence.len()
            )));
        }

        let generalization = |message: String| TraceError::BatchGeneralization {
            batch_size,
            message,
        };
        if retraced.output.shape().first() != Some(&batch_size) {
            return Err(generalization(format!(
                "eager output has shape {:?}",
                retraced.output.shape()
            )));
        }
        let from_graph = session
            .run_single(batch)
            .map_err(|e| generalization(e.to_string()))?;
        if from_graph.shape() != retraced.output.shape() {
            return Err(generalization(format!(
                "graph output has shape {:?}, expected {:?}",
                from_graph.shape(),
                retraced.output.shape()
            )));
        }
        let max_diff = from_graph.max_abs_diff(&retraced.output)?;
        if max_diff > self.allowed(&retraced.output) {
            return Err(generalization(format!(
                "graph and eager outputs differ by {max_diff}"
            )));
        }

        debug!(batch_size, max_diff, "trace generalizes over batch");
        Ok(())
    }

    fn allowed(&self, reference: &Tensor<f32>) -> f32 {
        self.options.tolerance * reference.max_abs().max(1.0)
    }

    fn compare(&self, actual: &Tensor<f32>, expected: &Tensor<f32>) -> TraceResult<()> {
        let max_diff = if actual.shape() == expected.shape() {
            actual.max_abs_diff(expected)?
        } else {
            f32::INFINITY
        };
        let tolerance = self.allowed(expected);
        if max_diff > tolerance {
            return Err(TraceError::OutputMismatch { max_diff, tolerance });
        }
        Ok(())
    }
}

/// Rejects samples that cannot seed a batch-generic trace.
fn validate_sample(sample: &Tensor<f32>) -> TraceResult<()> {
    match sample.shape().first() {
        None => Err(TraceError::InvalidSample(
            "sample must have a leading batch dimension".to_string(),
        )),
        Some(&1) => Ok(()),
        Some(&n) => Err(TraceError::InvalidSample(format!(
            "sample batch size must be 1, got {n}"
        ))),
    }
}

/// Builds a batch of distinct inputs by scaling copies of the sample.
fn distinct_batch(sample: &Tensor<f32>, batch_size: usize) -> TraceResult<Tensor<f32>> {
    let copies: Vec<Tensor<f32>> = (0..batch_size)
        .map(|i| sample.mul_scalar(1.0 + 0.1 * i as f32))
        .collect();
    let refs: Vec<&Tensor<f32>> = copies.iter().collect();
    Ok(Tensor::concat(&refs, 0)?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{LayerNorm, Linear};
    use crate::module::Parameter;
    use crate::tracer::TracedTensor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tessera_graph::LoadedGraph;

    struct TinyEncoder {
        fc: Linear,
        ln: LayerNorm,
    }

    impl TinyEncoder {
        fn new() -> Self {
            let mut rng = StdRng::seed_from_u64(11);
            Self {
                fc: Linear::new("fc", 6, 4, true, &mut rng).unwrap(),
                ln: LayerNorm::new("ln", 4, 1e-5),
            }
        }
    }

    impl Module for TinyEncoder {
        fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
            let h = input.flatten(1)?;
            let h = self.fc.forward(&h)?.relu()?;
            self.ln.forward(&h)
        }

        fn parameters(&self) -> Vec<&Parameter> {
            let mut p = self.fc.parameters();
            p.extend(self.ln.parameters());
            p
        }
    }

    /// Uses the batch size in control flow, which a trace cannot capture.
    struct BatchDependent;

    impl Module for BatchDependent {
        fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
            if input.shape()[0] == 1 {
                input.relu()
            } else {
                input.sigmoid()
            }
        }
    }

    /// Hard-codes the batch size into a reshape.
    struct FixedReshape;

    impl Module for FixedReshape {
        fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
            let n = input.shape()[0] as i64;
            input.reshape(&[n, -1])?.reshape(&[1, -1])
        }
    }

    struct ReadsValues;

    impl Module for ReadsValues {
        fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
            if input.values().iter().sum::<f32>() > 0.0 {
                input.relu()
            } else {
                input.tanh()
            }
        }
    }

    fn sample() -> Tensor<f32> {
        Tensor::from_vec((0..6).map(|i| i as f32 * 0.3 - 0.7).collect(), &[1, 2, 3]).unwrap()
    }

    #[test]
    fn test_export_writes_dynamic_graph() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = GraphExporter::new(ExportOptions::default().with_output_dir(dir.path()));
        let exported = exporter.export(&TinyEncoder::new(), &sample()).unwrap();

        assert_eq!(exported.name, "model_prequantized");
        assert!(exported.path.ends_with("model_prequantized.graph"));
        assert_eq!(exported.input_shape.to_string(), "[batch_size, 2, 3]");
        assert_eq!(exported.output_shape.to_string(), "[batch_size, 4]");

        let loaded = LoadedGraph::load(&exported.path).unwrap();
        let graph = &loaded.model().graph;
        assert_eq!(graph.input[0].name, "preprocessed_image");
        assert_eq!(graph.output[0].name, "embeddings");
        assert!(graph.get_initializer("fc.weight").is_some());
    }

    #[test]
    fn test_rejects_batched_sample() {
        let exporter = GraphExporter::default();
        let batched = Tensor::zeros(&[2, 2, 3]);
        assert!(matches!(
            exporter.export(&TinyEncoder::new(), &batched),
            Err(TraceError::InvalidSample(_))
        ));
        assert!(matches!(
            exporter.export(&TinyEncoder::new(), &Tensor::scalar(1.0)),
            Err(TraceError::InvalidSample(_))
        ));
    }

    #[test]
    fn test_control_flow_divergence() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = GraphExporter::new(ExportOptions::default().with_output_dir(dir.path()));
        assert!(matches!(
            exporter.export(&BatchDependent, &sample()),
            Err(TraceError::ControlFlowDivergence(_))
        ));
        assert!(!dir.path().join("model_prequantized.graph").exists());
    }

    #[test]
    fn test_batch_generalization_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = GraphExporter::new(ExportOptions::default().with_output_dir(dir.path()));
        assert!(matches!(
            exporter.export(&FixedReshape, &sample()),
            Err(TraceError::BatchGeneralization { batch_size: 2, .. })
        ));
    }

    #[test]
    fn test_data_dependent_model() {
        let exporter = GraphExporter::default();
        assert!(matches!(
            exporter.trace(&ReadsValues, &sample()),
            Err(TraceError::DataDependent { .. })
        ));
    }

    #[test]
    fn test_unchecked_export_skips_retrace() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExportOptions::default()
            .with_output_dir(dir.path())
            .with_model_name("unchecked")
            .with_check_trace(false);
        let exported = GraphExporter::new(options)
            .export(&BatchDependent, &sample())
            .unwrap();
        assert!(exported.path.ends_with("unchecked.graph"));
    }
}
