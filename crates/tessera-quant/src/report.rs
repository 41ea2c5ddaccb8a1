//! Quantization Report
//!
//! What the quantizer did to a graph: every rewritten weight with its
//! parameters and reconstruction error, the candidates it passed over, and
//! the byte sizes of the initializers before and after.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::fmt::Write as _;

use serde::Serialize;

use crate::quantize::ErrorStats;
use crate::types::{QuantFormat, QuantParams, WeightType};

/// One quantized weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorReport {
    /// Name of the float initializer.
    pub name: String,
    /// Weight shape.
    pub shape: Vec<usize>,
    /// Names of the rewritten consumer nodes.
    pub consumers: Vec<String>,
    /// Integer encoding.
    pub weight_type: WeightType,
    /// Channel axis when per-channel.
    pub axis: Option<usize>,
    /// Number of scale / zero-point pairs.
    pub num_scales: usize,
    /// Smallest scale.
    pub min_scale: f32,
    /// Largest scale.
    pub max_scale: f32,
    /// Smallest zero point.
    pub min_zero_point: i32,
    /// Largest zero point.
    pub max_zero_point: i32,
    /// Root mean square reconstruction error.
    pub rmse: f32,
    /// Maximum absolute reconstruction error.
    pub max_error: f32,
}

impl TensorReport {
    /// Summarizes parameters and error for a weight.
    pub fn new(
        name: &str,
        shape: &[usize],
        consumers: Vec<String>,
        params: &QuantParams,
        stats: ErrorStats,
    ) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
            consumers,
            weight_type: params.weight_type,
            axis: params.axis,
            num_scales: params.scales.len(),
            min_scale: params.min_scale(),
            max_scale: params.max_scale(),
            min_zero_point: params.zero_points.iter().copied().min().unwrap_or(0),
            max_zero_point: params.zero_points.iter().copied().max().unwrap_or(0),
            rmse: stats.rmse,
            max_error: stats.max_error,
        }
    }

    /// Number of weight elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// A node the quantizer considered and left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCandidate {
    /// Node name.
    pub node: String,
    /// Node operator type.
    pub op_type: String,
    /// Weight input, if there was one.
    pub tensor: Option<String>,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of quantizing one graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantReport {
    /// Quantized weights in initializer order.
    pub tensors: Vec<TensorReport>,
    /// Nodes whose weight input was rewritten.
    pub rewritten_nodes: usize,
    /// `DequantizeLinear` nodes added.
    pub inserted_nodes: usize,
    /// Candidates passed over.
    pub skipped: Vec<SkippedCandidate>,
    /// Initializer bytes of the input graph.
    pub bytes_before: usize,
    /// Initializer bytes of the output graph.
    pub bytes_after: usize,
    /// Output format.
    pub format: QuantFormat,
    /// Integer encoding.
    pub weight_type: WeightType,
}

impl QuantReport {
    /// Initializer size ratio, input over output.
    pub fn compression_ratio(&self) -> f32 {
        if self.bytes_after == 0 {
            return 1.0;
        }
        self.bytes_before as f32 / self.bytes_after as f32
    }

    /// Total elements across quantized weights.
    pub fn quantized_parameters(&self) -> usize {
        self.tensors.iter().map(TensorReport::numel).sum()
    }

    /// Largest per-tensor maximum error.
    pub fn max_error(&self) -> f32 {
        self.tensors.iter().map(|t| t.max_error).fold(0.0, f32::max)
    }

    /// Returns true if nothing was quantized.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Multi-line human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Quantized {} weights ({} parameters) as {} in {} format",
            self.tensors.len(),
            self.quantized_parameters(),
            self.weight_type,
            self.format
        );
        let _ = writeln!(
            out,
            "Rewritten nodes: {}, inserted nodes: {}, skipped: {}",
            self.rewritten_nodes,
            self.inserted_nodes,
            self.skipped.len()
        );
        let _ = write!(
            out,
            "Initializers: {} -> {} bytes ({:.2}x), max error {:.6}",
            self.bytes_before,
            self.bytes_after,
            self.compression_ratio(),
            self.max_error()
        );
        out
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> QuantParams {
        QuantParams {
            scales: vec![0.5, 0.25],
            zero_points: vec![0, -3],
            axis: Some(1),
            weight_type: WeightType::QInt8,
            qmin: -127,
            qmax: 127,
        }
    }

    fn report() -> QuantReport {
        let stats = ErrorStats {
            rmse: 0.01,
            max_error: 0.2,
        };
        QuantReport {
            tensors: vec![TensorReport::new("w", &[3, 2], vec!["fc".into()], &params(), stats)],
            rewritten_nodes: 1,
            inserted_nodes: 0,
            skipped: vec![SkippedCandidate {
                node: "emb".into(),
                op_type: "Gather".into(),
                tensor: None,
                reason: "excluded by node filter".into(),
            }],
            bytes_before: 400,
            bytes_after: 100,
            format: QuantFormat::Operator,
            weight_type: WeightType::QInt8,
        }
    }

    #[test]
    fn test_tensor_report_summary() {
        let t = &report().tensors[0];
        assert_eq!(t.num_scales, 2);
        assert_eq!((t.min_scale, t.max_scale), (0.25, 0.5));
        assert_eq!((t.min_zero_point, t.max_zero_point), (-3, 0));
        assert_eq!(t.numel(), 6);
    }

    #[test]
    fn test_totals() {
        let r = report();
        assert_eq!(r.compression_ratio(), 4.0);
        assert_eq!(r.quantized_parameters(), 6);
        assert_eq!(r.max_error(), 0.2);
        assert!(r.summary().contains("4.00x"));
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["format"], "operator");
        assert_eq!(json["tensors"][0]["weight_type"], "int8");
        assert_eq!(json["skipped"][0]["tensor"], serde_json::Value::Null);
    }
}
