//! Pipeline Error Types
//!
//! Errors from every stage of the export and quantization pipeline, grouped
//! by the stage that raised them.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tessera_graph::GraphError;
use tessera_quant::QuantError;
use tessera_trace::TraceError;
use tessera_vision::VisionError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline stage failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The sample tensor could not be produced.
    #[error("Tensor source error: {0}")]
    TensorSource(#[from] VisionError),

    /// Tracing or trace verification failed.
    #[error("Export error: {0}")]
    Trace(#[from] TraceError),

    /// The original artifact could not be loaded.
    #[error("Load error: {0}")]
    Load(#[source] GraphError),

    /// The quantizer rejected or failed on the graph.
    #[error("Quantization error: {0}")]
    Quantize(#[from] QuantError),

    /// The quantized artifact could not be written.
    #[error("Write error: {0}")]
    Write(#[source] GraphError),

    /// Executing a graph for comparison failed.
    #[error("Graph execution error: {0}")]
    Execution(#[source] GraphError),

    /// Pipeline arguments are inconsistent.
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Tensor construction failed.
    #[error("Tensor error: {0}")]
    Tensor(#[from] tessera_tensor::Error),

    /// Reading an artifact for its digest failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short name of the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::TensorSource(_) => "tensor-source",
            Self::Trace(_) => "export",
            Self::Load(_) => "load",
            Self::Quantize(_) => "quantize",
            Self::Write(_) => "write",
            Self::Execution(_) => "compare",
            Self::InvalidConfig(_) => "config",
            Self::Tensor(_) => "tensor",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let err = PipelineError::Load(GraphError::Malformed("truncated".to_string()));
        assert_eq!(err.stage(), "load");
        assert!(err.to_string().contains("truncated"));

        let err: PipelineError = QuantError::AlreadyQuantized("model".to_string()).into();
        assert_eq!(err.stage(), "quantize");
    }
}
