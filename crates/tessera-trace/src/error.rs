//! Trace Error Types
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tessera_graph::GraphError;
use thiserror::Error;

/// Result type for tracing and export.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors raised while tracing or exporting a model.
#[derive(Error, Debug)]
pub enum TraceError {
    /// The sample input cannot seed a batch-generic trace.
    #[error("Invalid sample input: {0}")]
    InvalidSample(String),

    /// The model read concrete tensor values while being traced.
    #[error("Model reads tensor values during tracing ({tensors:?}); the graph cannot capture data-dependent behavior")]
    DataDependent {
        /// Values that were read.
        tensors: Vec<String>,
    },

    /// A second trace recorded a different operator sequence.
    #[error("Control flow diverged between traces: {0}")]
    ControlFlowDivergence(String),

    /// The graph does not generalize over the batch dimension.
    #[error("Graph does not generalize to batch size {batch_size}: {message}")]
    BatchGeneralization {
        /// Batch size that was checked.
        batch_size: usize,
        /// What went wrong.
        message: String,
    },

    /// Executing the graph does not reproduce the traced output.
    #[error("Graph output differs from traced output by {max_diff} (tolerance {tolerance})")]
    OutputMismatch {
        /// Largest element-wise difference.
        max_diff: f32,
        /// Allowed difference.
        tolerance: f32,
    },

    /// The tracer already produced its graph.
    #[error("Trace has already been finished")]
    Finished,

    /// A layer was configured inconsistently.
    #[error("Invalid module configuration: {0}")]
    InvalidModule(String),

    /// Graph construction, execution or writing failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Eager tensor computation failed.
    #[error("Tensor error: {0}")]
    Tensor(#[from] tessera_tensor::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = TraceError::BatchGeneralization {
            batch_size: 2,
            message: "leading dim 1".into(),
        };
        assert!(err.to_string().contains("batch size 2"));

        let err: TraceError = GraphError::Validation("dangling".into()).into();
        assert!(matches!(err, TraceError::Graph(_)));
    }
}
