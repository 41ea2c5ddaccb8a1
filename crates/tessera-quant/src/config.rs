//! Quantization Configuration
//!
//! @version 0.1.0
//! @author Tessera Development Team

use serde::{Deserialize, Serialize};

use crate::error::{QuantError, QuantResult};
use crate::registry::OpRegistry;
use crate::types::{QuantFormat, QuantMode, WeightType};

/// Options controlling which weights are quantized and how.
///
/// Defaults: dynamic, weight-only, signed 8-bit, symmetric, per-tensor,
/// full range, operator-substitution format, integer operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantConfig {
    /// One scale and zero point per output channel.
    pub per_channel: bool,
    /// Use a 7-bit range so integer accumulation cannot overflow.
    pub reduce_range: bool,
    /// How parameters are obtained; only `Dynamic` is supported.
    pub mode: QuantMode,
    /// Fit the zero point to the weight range instead of centering it.
    pub asymmetric_weights: bool,
    /// Also quantize activations; not supported.
    pub activation_quantization: bool,
    /// Integer encoding of weights.
    pub weight_type: WeightType,
    /// How rewritten weights are wired into the graph.
    pub format: QuantFormat,
    /// Operator types whose weights may be quantized.
    pub op_types: OpRegistry,
    /// When set, only nodes with these names are rewritten.
    pub nodes_to_quantize: Option<Vec<String>>,
    /// Nodes never rewritten.
    pub nodes_to_exclude: Vec<String>,
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            per_channel: false,
            reduce_range: false,
            mode: QuantMode::Dynamic,
            asymmetric_weights: false,
            activation_quantization: false,
            weight_type: WeightType::QInt8,
            format: QuantFormat::Operator,
            op_types: OpRegistry::integer_ops(),
            nodes_to_quantize: None,
            nodes_to_exclude: Vec::new(),
        }
    }
}

impl QuantConfig {
    /// Enables per-channel parameters.
    pub fn with_per_channel(mut self, per_channel: bool) -> Self {
        self.per_channel = per_channel;
        self
    }

    /// Enables the reduced range.
    pub fn with_reduce_range(mut self, reduce_range: bool) -> Self {
        self.reduce_range = reduce_range;
        self
    }

    /// Sets the weight encoding.
    pub fn with_weight_type(mut self, weight_type: WeightType) -> Self {
        self.weight_type = weight_type;
        self
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: QuantFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the operator allow-list.
    pub fn with_op_types(mut self, op_types: OpRegistry) -> Self {
        self.op_types = op_types;
        self
    }

    /// Returns true when zero points are centered.
    pub fn symmetric(&self) -> bool {
        !self.asymmetric_weights
    }

    /// Integer range `[qmin, qmax]` implied by the settings.
    pub fn range(&self) -> (i32, i32) {
        self.weight_type.range(self.symmetric(), self.reduce_range)
    }

    /// Rejects settings this quantizer cannot honor.
    pub fn validate(&self) -> QuantResult<()> {
        if self.mode == QuantMode::Static {
            return Err(QuantError::UnsupportedOperator(
                "static quantization requires calibration and is not supported".to_string(),
            ));
        }
        if self.activation_quantization {
            return Err(QuantError::UnsupportedOperator(
                "activation quantization is not supported; only weights are quantized".to_string(),
            ));
        }
        self.op_types.validate()
    }

    /// Returns true if the node named `name` passes the node filters.
    pub fn allows_node(&self, name: &str) -> bool {
        if self.nodes_to_exclude.iter().any(|n| n == name) {
            return false;
        }
        self.nodes_to_quantize
            .as_ref()
            .map_or(true, |only| only.iter().any(|n| n == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QuantConfig::default();
        assert!(!config.per_channel);
        assert!(!config.reduce_range);
        assert!(config.symmetric());
        assert_eq!(config.range(), (-127, 127));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unsupported_settings() {
        let config = QuantConfig {
            mode: QuantMode::Static,
            ..QuantConfig::default()
        };
        assert!(matches!(config.validate(), Err(QuantError::UnsupportedOperator(_))));

        let config = QuantConfig {
            activation_quantization: true,
            ..QuantConfig::default()
        };
        assert!(matches!(config.validate(), Err(QuantError::UnsupportedOperator(_))));
    }

    #[test]
    fn test_node_filters() {
        let config = QuantConfig {
            nodes_to_quantize: Some(vec!["a".into(), "b".into()]),
            nodes_to_exclude: vec!["b".into()],
            ..QuantConfig::default()
        };
        assert!(config.allows_node("a"));
        assert!(!config.allows_node("b"));
        assert!(!config.allows_node("c"));
    }

    #[test]
    fn test_partial_deserialize() {
        let config: QuantConfig =
            serde_json::from_str(r#"{"per_channel": true, "op_types": ["MatMul"]}"#).unwrap();
        assert!(config.per_channel);
        assert_eq!(config.op_types.len(), 1);
        assert_eq!(config.weight_type, WeightType::QInt8);
    }
}
