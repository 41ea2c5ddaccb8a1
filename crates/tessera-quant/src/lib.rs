//! Tessera Quant - Weight-Only Graph Quantization
//!
//! Rewrites the float weights of selected operators in a computation graph
//! into an 8-bit integer encoding with scale and zero-point initializers.
//! The graph keeps its declared inputs and outputs; consumers of rewritten
//! weights become weight-dequantizing operator variants, or read the weight
//! through an inserted `DequantizeLinear` node.
//!
//! # Features
//! - Signed and unsigned 8-bit encodings, symmetric or asymmetric
//! - Per-tensor or per-output-channel scales, optional 7-bit reduced range
//! - Explicit operator allow-list (`OpRegistry`) and node-name filters
//! - Operator-substitution and QDQ output formats
//! - Per-tensor error statistics in a `QuantReport`
//!
//! # Example
//! ```ignore
//! use tessera_graph::LoadedGraph;
//! use tessera_quant::{GraphQuantizer, QuantConfig};
//!
//! let original = LoadedGraph::load("model_prequantized.graph")?;
//! let quantizer = GraphQuantizer::new(QuantConfig::default())?;
//! let quantized = quantizer.quantize(original.working_copy())?;
//! println!("{}", quantized.report.summary());
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
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod error;
pub mod quantize;
pub mod quantizer;
pub mod registry;
pub mod report;
pub mod types;

pub use config::QuantConfig;
pub use error::{QuantError, QuantResult};
pub use quantize::{
    compute_params, dequantize_weight, error_stats, quantize_weight, ErrorStats, QuantizedWeight,
};
pub use quantizer::{GraphQuantizer, QuantizedModel};
pub use registry::{rewrite_rule, OpRegistry, RewriteRule, REWRITE_RULES};
pub use report::{QuantReport, SkippedCandidate, TensorReport};
pub use types::{QuantFormat, QuantMode, QuantParams, WeightType};

/// Suffix of the integer-encoded initializer.
pub const QUANTIZED_SUFFIX: &str = "_quantized";

/// Suffix of the scale initializer.
pub const SCALE_SUFFIX: &str = "_scale";

/// Suffix of the zero-point initializer.
pub const ZERO_POINT_SUFFIX: &str = "_zero_point";

/// Suffix of the output of an inserted `DequantizeLinear` node.
pub const DEQUANTIZED_SUFFIX: &str = "_dequantized";
