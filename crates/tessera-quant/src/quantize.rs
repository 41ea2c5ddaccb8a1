//! Quantization Functions
//!
//! Affine parameter fitting and the quantize/dequantize kernels for weight
//! tensors, per tensor or per channel.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tessera_graph::{TensorData, TensorProto};
use tessera_tensor::shape::numel;

use crate::error::{QuantError, QuantResult};
use crate::types::{QuantParams, WeightType};

// =============================================================================
// Parameters
// =============================================================================

/// Fits `(scale, zero_point)` to `values` for codes in `[qmin, qmax]`.
///
/// The real range is widened to include zero so that zero is exactly
/// representable. Symmetric fitting uses `[-absmax, absmax]` and puts the
/// zero point at the middle of the code range. An empty range yields a
/// scale of 1.
pub fn compute_params(values: &[f32], qmin: i32, qmax: i32, symmetric: bool) -> (f32, i32) {
    let (lo, hi) = values
        .iter()
        .fold((0.0f32, 0.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (rmin, rmax) = if symmetric {
        let absmax = lo.abs().max(hi.abs());
        (-absmax, absmax)
    } else {
        (lo, hi)
    };

    let scale = (rmax - rmin) / (qmax - qmin) as f32;
    let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
    let zero_point = if symmetric {
        ((qmin + qmax) as f32 / 2.0).round_ties_even() as i32
    } else {
        (qmin as f32 - rmin / scale).round_ties_even() as i32
    };
    (scale, zero_point.clamp(qmin, qmax))
}

#[inline]
fn quantize_value(x: f32, scale: f32, zero_point: i32, qmin: i32, qmax: i32) -> i32 {
    ((x / scale).round_ties_even() as i32)
        .saturating_add(zero_point)
        .clamp(qmin, qmax)
}

// =============================================================================
// Quantized Weight
// =============================================================================

/// An integer-encoded weight and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedWeight {
    /// Shape of the weight.
    pub shape: Vec<usize>,
    /// Integer codes in row-major order.
    pub codes: Vec<i32>,
    /// Scale and zero point(s).
    pub params: QuantParams,
}

impl QuantizedWeight {
    /// The encoded tensor as an initializer.
    pub fn to_initializer(&self, name: &str) -> TensorProto {
        let dims = dims_of(&self.shape);
        TensorProto {
            name: name.to_string(),
            dims,
            data: encode(&self.codes, self.params.weight_type),
            doc_string: None,
        }
    }

    /// The scale initializer: a scalar, or one value per channel.
    pub fn scale_initializer(&self, name: &str) -> TensorProto {
        TensorProto::float(name, &self.param_dims(), self.params.scales.clone())
    }

    /// The zero-point initializer, shaped like the scale.
    pub fn zero_point_initializer(&self, name: &str) -> TensorProto {
        TensorProto {
            name: name.to_string(),
            dims: self.param_dims(),
            data: encode(&self.params.zero_points, self.params.weight_type),
            doc_string: None,
        }
    }

    fn param_dims(&self) -> Vec<i64> {
        if self.params.is_per_channel() {
            vec![self.params.scales.len() as i64]
        } else {
            Vec::new()
        }
    }

    /// Encoded size in bytes, parameters included.
    pub fn byte_size(&self) -> usize {
        self.codes.len() + self.params.scales.len() * 5
    }
}

fn dims_of(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|&d| d as i64).collect()
}

fn encode(codes: &[i32], weight_type: WeightType) -> TensorData {
    match weight_type {
        WeightType::QInt8 => TensorData::Int8(codes.iter().map(|&c| c as i8).collect()),
        WeightType::QUInt8 => TensorData::Uint8(codes.iter().map(|&c| c as u8).collect()),
    }
}

// =============================================================================
// Quantize / Dequantize
// =============================================================================

/// Quantizes a float weight.
///
/// With `axis`, each slice along that axis gets its own parameters.
pub fn quantize_weight(
    name: &str,
    values: &[f32],
    shape: &[usize],
    weight_type: WeightType,
    symmetric: bool,
    reduce_range: bool,
    axis: Option<usize>,
) -> QuantResult<QuantizedWeight> {
    if values.len() != numel(shape) {
        return Err(QuantError::invalid_weight(
            name,
            format!("{} values for shape {shape:?}", values.len()),
        ));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(QuantError::invalid_weight(name, format!("contains non-finite value {bad}")));
    }
    let (qmin, qmax) = weight_type.range(symmetric, reduce_range);

    let (scales, zero_points, codes) = match axis {
        None => {
            let (scale, zp) = compute_params(values, qmin, qmax, symmetric);
            let codes = values
                .iter()
                .map(|&x| quantize_value(x, scale, zp, qmin, qmax))
                .collect();
            (vec![scale], vec![zp], codes)
        }
        Some(axis) => {
            if axis >= shape.len() {
                return Err(QuantError::invalid_weight(
                    name,
                    format!("channel axis {axis} out of range for shape {shape:?}"),
                ));
            }
            let channels = shape[axis];
            let inner = numel(&shape[axis + 1..]);
            let channel_of = |i: usize| (i / inner) % channels;

            let mut per_channel: Vec<Vec<f32>> = vec![Vec::new(); channels];
            for (i, &x) in values.iter().enumerate() {
                per_channel[channel_of(i)].push(x);
            }
            let (scales, zero_points): (Vec<f32>, Vec<i32>) = per_channel
                .iter()
                .map(|c| compute_params(c, qmin, qmax, symmetric))
                .unzip();
            let codes = values
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    let c = channel_of(i);
                    quantize_value(x, scales[c], zero_points[c], qmin, qmax)
                })
                .collect();
            (scales, zero_points, codes)
        }
    };

    Ok(QuantizedWeight {
        shape: shape.to_vec(),
        codes,
        params: QuantParams {
            scales,
            zero_points,
            axis,
            weight_type,
            qmin,
            qmax,
        },
    })
}

/// Reconstructs `(q - zero_point) * scale` for every code.
pub fn dequantize_weight(weight: &QuantizedWeight) -> Vec<f32> {
    let params = &weight.params;
    match params.axis {
        None => {
            let (s, z) = (params.scales[0], params.zero_points[0]);
            weight.codes.iter().map(|&q| (q - z) as f32 * s).collect()
        }
        Some(axis) => {
            let channels = weight.shape[axis];
            let inner = numel(&weight.shape[axis + 1..]);
            weight
                .codes
                .iter()
                .enumerate()
                .map(|(i, &q)| {
                    let c = (i / inner) % channels;
                    (q - params.zero_points[c]) as f32 * params.scales[c]
                })
                .collect()
        }
    }
}

/// Error statistics between a weight and its reconstruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorStats {
    /// Root mean square error.
    pub rmse: f32,
    /// Maximum absolute error.
    pub max_error: f32,
}

/// Computes RMSE and max absolute error.
pub fn error_stats(original: &[f32], reconstructed: &[f32]) -> ErrorStats {
    if original.is_empty() || original.len() != reconstructed.len() {
        return ErrorStats {
            rmse: f32::INFINITY,
            max_error: f32::INFINITY,
        };
    }
    let (sum_sq, max_error) = original
        .iter()
        .zip(reconstructed)
        .map(|(a, b)| (a - b).abs())
        .fold((0.0f64, 0.0f32), |(s, m), e| (s + f64::from(e) * f64::from(e), m.max(e)));
    ErrorStats {
        rmse: (sum_sq / original.len() as f64).sqrt() as f32,
        max_error,
    }
}

// =============================================================================
// Tests
// =============================================================================
