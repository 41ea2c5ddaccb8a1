//! Tessera Graph - Portable Computation Graphs
//!
//! The graph model shared by every stage of the export and quantization
//! pipeline: operator nodes, named initializers, declared inputs and outputs
//! with dynamic dimensions, model metadata and quantization annotations.
//!
//! # Features
//! - ONNX-shaped graph structures with serde support
//! - Structural validation (no forward references, single producers)
//! - Versioned binary and JSON artifacts with atomic writes
//! - `GraphBuilder` for assembling graphs node by node
//! - A reference `Session` that executes float and weight-quantized graphs
//!
//! # Example
//! ```ignore
//! use tessera_graph::{LoadedGraph, Session};
//!
//! let loaded = LoadedGraph::load("model_prequantized.graph")?;
//! let session = Session::new(loaded.model())?;
//! let output = session.run_single(input)?;
//! ```
//!
//! @version 0.1.0
//! @author Tessera Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod builder;
pub mod error;
pub mod io;
pub mod proto;
pub mod runtime;
pub mod validate;

pub use builder::GraphBuilder;
pub use error::{GraphError, GraphResult};
pub use io::{
    artifact_path, decode_model, encode_model, read_model, write_model, write_model_as,
    ArtifactFormat, GraphLoader, LoadedGraph, WriteReport,
};
pub use proto::{
    AttributeProto, AttributeValue, Dimension, ElementType, GraphProto, MetadataEntry, ModelProto,
    NodeProto, OperatorSetId, QuantizationAnnotation, TensorData, TensorDescriptor, TensorProto,
    TensorShape,
};
pub use runtime::{Session, Value};
pub use validate::{validate_graph, validate_model};

/// The computation graph artifact: a model wrapping one graph.
pub type ComputationGraph = ModelProto;

// =============================================================================
// Constants
// =============================================================================

/// Artifact format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// IR version stamped on produced graphs.
pub const IR_VERSION: i64 = 8;

/// Default-domain opset version stamped on produced graphs.
pub const OPSET_VERSION: i64 = 17;

/// Oldest default-domain opset accepted on load.
pub const MIN_OPSET_VERSION: i64 = 13;

/// File extension of graph artifacts.
pub const ARTIFACT_EXTENSION: &str = "graph";

/// Operator domain of the weight-dequantizing operator variants.
pub const QUANT_DOMAIN: &str = "ai.tessera.quant";

/// Operator domain version of [`QUANT_DOMAIN`].
pub const QUANT_DOMAIN_VERSION: i64 = 1;

/// Default symbolic name of the dynamic batch dimension.
pub const BATCH_DIM: &str = "batch_size";

/// Operator types that only appear in quantized graphs.
pub const QUANTIZED_OP_TYPES: &[&str] = &[
    "DequantizeLinear",
    "QuantizeLinear",
    "DynamicQuantizeLinear",
    "MatMulInteger",
    "ConvInteger",
    "DequantMatMul",
    "DequantGemm",
    "DequantConv",
    "DequantGather",
];

/// Metadata keys written by the quantizer.
pub mod metadata_keys {
    /// `"true"` once a graph has been quantized.
    pub const QUANTIZED: &str = "tessera.quantized";
    /// Weight rewrite format (`operator` or `qdq`).
    pub const FORMAT: &str = "tessera.quant.format";
    /// Integer encoding of quantized weights.
    pub const WEIGHT_TYPE: &str = "tessera.quant.weight_type";
    /// Whether scales are per output channel.
    pub const PER_CHANNEL: &str = "tessera.quant.per_channel";
    /// Whether the 7-bit reduced range was used.
    pub const REDUCE_RANGE: &str = "tessera.quant.reduce_range";
    /// Whether weights use a symmetric range.
    pub const SYMMETRIC: &str = "tessera.quant.symmetric";
    /// Name of the graph the quantized graph was derived from.
    pub const SOURCE_GRAPH: &str = "tessera.source_graph";
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert!(FORMAT_VERSION > 0);
        assert!(OPSET_VERSION >= MIN_OPSET_VERSION);
        assert!(QUANTIZED_OP_TYPES.contains(&"DequantizeLinear"));
    }
}
