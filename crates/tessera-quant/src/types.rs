//! Quantization Types
//!
//! Encodings, modes, output formats and the affine parameters that map
//! integer codes back to real values.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_graph::ElementType;

use crate::error::QuantError;

// =============================================================================
// Weight Type
// =============================================================================

/// Integer encoding of quantized weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeightType {
    /// Signed 8-bit.
    #[default]
    #[serde(rename = "int8")]
    QInt8,
    /// Unsigned 8-bit.
    #[serde(rename = "uint8")]
    QUInt8,
}

impl WeightType {
    /// Graph element type of the encoded tensor.
    pub fn elem_type(self) -> ElementType {
        match self {
            WeightType::QInt8 => ElementType::Int8,
            WeightType::QUInt8 => ElementType::Uint8,
        }
    }

    /// Integer range `[qmin, qmax]` used for codes.
    ///
    /// Signed symmetric encodings drop -128 so the range is centered on
    /// zero; reduced range keeps 7 bits of magnitude.
    pub fn range(self, symmetric: bool, reduce_range: bool) -> (i32, i32) {
        match (self, reduce_range) {
            (WeightType::QInt8, true) => (-64, 64),
            (WeightType::QInt8, false) if symmetric => (-127, 127),
            (WeightType::QInt8, false) => (-128, 127),
            (WeightType::QUInt8, true) => (0, 127),
            (WeightType::QUInt8, false) => (0, 255),
        }
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            WeightType::QInt8 => "int8",
            WeightType::QUInt8 => "uint8",
        }
    }
}

impl fmt::Display for WeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WeightType {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int8" | "qint8" | "i8" | "s8" => Ok(WeightType::QInt8),
            "uint8" | "quint8" | "u8" => Ok(WeightType::QUInt8),
            other => Err(QuantError::InvalidConfig(format!(
                "unknown weight type '{other}' (expected int8 or uint8)"
            ))),
        }
    }
}

// =============================================================================
// Mode / Format
// =============================================================================

/// How quantization parameters are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantMode {
    /// Parameters computed from each weight's own range.
    #[default]
    Dynamic,
    /// Parameters calibrated on sample data (not supported).
    Static,
}

/// How rewritten weights are wired into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantFormat {
    /// Consumers become weight-dequantizing operator variants.
    #[default]
    Operator,
    /// A `DequantizeLinear` node feeds the unchanged consumers.
    Qdq,
}

impl QuantFormat {
    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            QuantFormat::Operator => "operator",
            QuantFormat::Qdq => "qdq",
        }
    }
}

impl fmt::Display for QuantFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QuantFormat {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "operator" | "qoperator" | "op" => Ok(QuantFormat::Operator),
            "qdq" => Ok(QuantFormat::Qdq),
            other => Err(QuantError::InvalidConfig(format!(
                "unknown format '{other}' (expected operator or qdq)"
            ))),
        }
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Scale and zero point of a quantized tensor.
///
/// One pair per tensor, or one pair per slice along `axis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// Scales, all finite and positive.
    pub scales: Vec<f32>,
    /// Zero points, inside `[qmin, qmax]`.
    pub zero_points: Vec<i32>,
    /// Channel axis when per-channel.
    pub axis: Option<usize>,
    /// Encoding.
    pub weight_type: WeightType,
    /// Smallest code.
    pub qmin: i32,
    /// Largest code.
    pub qmax: i32,
}

impl QuantParams {
    /// Returns true for per-channel parameters.
    pub fn is_per_channel(&self) -> bool {
        self.axis.is_some()
    }

    /// Largest scale.
    pub fn max_scale(&self) -> f32 {
        self.scales.iter().copied().fold(0.0, f32::max)
    }

    /// Smallest scale.
    pub fn min_scale(&self) -> f32 {
        self.scales.iter().copied().fold(f32::INFINITY, f32::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert_eq!(WeightType::QInt8.range(false, false), (-128, 127));
        assert_eq!(WeightType::QInt8.range(true, false), (-127, 127));
        assert_eq!(WeightType::QInt8.range(true, true), (-64, 64));
        assert_eq!(WeightType::QUInt8.range(false, false), (0, 255));
        assert_eq!(WeightType::QUInt8.range(false, true), (0, 127));
    }

    #[test]
    fn test_parse() {
        assert_eq!("int8".parse::<WeightType>().unwrap(), WeightType::QInt8);
        assert_eq!("QUInt8".parse::<WeightType>().unwrap(), WeightType::QUInt8);
        assert!("int4".parse::<WeightType>().is_err());
        assert_eq!("qdq".parse::<QuantFormat>().unwrap(), QuantFormat::Qdq);
        assert!("fused".parse::<QuantFormat>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&WeightType::QUInt8).unwrap();
        assert_eq!(json, "\"uint8\"");
        let mode: QuantMode = serde_json::from_str("\"static\"").unwrap();
        assert_eq!(mode, QuantMode::Static);
    }
}
