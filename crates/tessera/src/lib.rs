//! # Tessera - Vision Encoder Export and Weight Quantization
//!
//! Tessera turns a vision encoder into a portable computation graph and then
//! shrinks that graph by rewriting its float weights into 8-bit integers.
//!
//! ## Stages
//!
//! - **Tensor source**: load an image from a path or URL and preprocess it
//!   into the fixed `[1, 3, 224, 224]` sample (`tessera-vision`)
//! - **Export**: trace one forward pass, verify it, write
//!   `<dir>/model_prequantized.graph` with a dynamic batch dimension
//!   (`tessera-trace`)
//! - **Load**: read the artifact back and take an independent working copy
//!   (`tessera-graph`)
//! - **Quantize**: dynamic weight-only quantization of allow-listed
//!   operators (`tessera-quant`)
//! - **Write**: atomically write `<dir>/model.graph` (`tessera-graph`)
//!
//! # Quick Start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let tower = VisionTower::new(VisionTowerConfig::tiny())?;
//! let sample = prepare_sample(None, &ClipPreprocessor::default(), 0)?;
//! let outcome = run_pipeline(&tower, &sample, &PipelineConfig::default().with_dir("out"))?;
//! println!("{}", outcome.quantized.report.summary());
//! ```
//!
//! @version 0.1.0
//! @author Tessera Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

// =============================================================================
// Re-exports
// =============================================================================

pub use tessera_graph as graph;
pub use tessera_quant as quant;
pub use tessera_tensor as tensor;
pub use tessera_trace as trace;
pub use tessera_vision as vision;

pub mod compare;
pub mod digest;
pub mod error;
pub mod pipeline;

pub use compare::{compare_models, random_batch, Comparison};
pub use digest::{sha256_bytes, sha256_file};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{
    prepare_graph, prepare_sample, quantize_artifact, quantize_graph, run_pipeline, PipelineConfig,
    PipelineOutcome, QuantizedArtifact, DEFAULT_ORIGINAL_NAME, DEFAULT_QUANTIZED_NAME,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for running the pipeline.
pub mod prelude {
    pub use crate::compare::{compare_models, random_batch, Comparison};
    pub use crate::error::{PipelineError, PipelineResult};
    pub use crate::pipeline::{
        prepare_graph, prepare_sample, quantize_graph, run_pipeline, PipelineConfig,
        QuantizedArtifact,
    };

    pub use tessera_graph::{GraphLoader, LoadedGraph, ModelProto};
    pub use tessera_quant::{GraphQuantizer, OpRegistry, QuantConfig, QuantFormat, WeightType};
    pub use tessera_tensor::Tensor;
    pub use tessera_trace::{ExportOptions, GraphExporter, Module};
    pub use tessera_vision::{ClipPreprocessor, ImageSource, Precision, VisionTower, VisionTowerConfig};
}
