//! Quantized Operators
//!
//! `DequantizeLinear` and the weight-dequantizing operator variants
//! (`DequantMatMul`, `DequantGemm`, `DequantConv`, `DequantGather`) that the
//! quantizer substitutes for their float counterparts. A variant takes the
//! original inputs with the weight replaced by its integer encoding, followed
//! by the weight's scale and zero point; it dequantizes the weight and then
//! computes exactly what the float operator would.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use tessera_tensor::shape::{normalize_dim, numel};
use tessera_tensor::Tensor;

use super::operators::{create_operator, input, Operator};
use super::value::Value;
use crate::error::{GraphError, GraphResult};
use crate::proto::NodeProto;

/// Attribute carrying the per-channel axis of a dequantizing variant.
pub const WEIGHT_AXIS_ATTR: &str = "weight_axis";

/// Float operator, weight input position and input arity of a variant.
pub fn dequant_signature(op_type: &str) -> Option<(&'static str, usize, usize)> {
    match op_type {
        "DequantMatMul" => Some(("MatMul", 1, 2)),
        "DequantGemm" => Some(("Gemm", 1, 3)),
        "DequantConv" => Some(("Conv", 1, 3)),
        "DequantGather" => Some(("Gather", 0, 2)),
        _ => None,
    }
}

/// Computes `(q - zero_point) * scale`, per tensor or per channel along `axis`.
pub fn dequantize_linear(
    quantized: &Value,
    scale: &Value,
    zero_point: Option<&Value>,
    axis: i64,
) -> GraphResult<Tensor<f32>> {
    let values = quantized.to_i32_vec("quantized tensor")?;
    let scales = scale.as_float("scale")?.as_slice();
    let zero_points = match zero_point {
        Some(z) => z.to_i32_vec("zero point")?,
        None => vec![0; scales.len()],
    };
    if zero_points.len() != scales.len() {
        return Err(tessera_tensor::Error::shape_mismatch(&[scales.len()], &[zero_points.len()]).into());
    }

    let shape = quantized.shape();
    let data: Vec<f32> = if scales.len() == 1 {
        let (s, z) = (scales[0], zero_points[0]);
        values.iter().map(|&q| (q - z) as f32 * s).collect()
    } else {
        let axis = normalize_dim(axis, shape.len())?;
        let channels = shape[axis];
        if channels != scales.len() {
            return Err(tessera_tensor::Error::shape_mismatch(&[channels], &[scales.len()]).into());
        }
        let inner = numel(&shape[axis + 1..]);
        values
            .iter()
            .enumerate()
            .map(|(i, &q)| {
                let c = (i / inner) % channels;
                (q - zero_points[c]) as f32 * scales[c]
            })
            .collect()
    };

    Ok(Tensor::from_vec(data, shape)?)
}

// =============================================================================
// DequantizeLinear
// =============================================================================

/// Standalone dequantization node.
#[derive(Debug)]
pub struct DequantizeLinearOp {
    pub(crate) axis: i64,
}

impl Operator for DequantizeLinearOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let q = input(inputs, 0, "DequantizeLinear")?;
        let scale = input(inputs, 1, "DequantizeLinear")?;
        let zero_point = inputs.get(2).copied().flatten();
        Ok(vec![Value::Float(dequantize_linear(q, scale, zero_point, self.axis)?)])
    }

    fn name(&self) -> &str {
        "DequantizeLinear"
    }
}

// =============================================================================
// Weight-Dequantizing Variants
// =============================================================================

/// A float operator whose weight input arrives integer-encoded.
#[derive(Debug)]
pub struct DequantOp {
    name: String,
    inner: Box<dyn Operator>,
    weight_index: usize,
    arity: usize,
    axis: i64,
}

pub(crate) fn create_dequant_operator(node: &NodeProto) -> GraphResult<Box<dyn Operator>> {
    let (base, weight_index, arity) = dequant_signature(&node.op_type)
        .ok_or_else(|| GraphError::UnsupportedOperator(node.op_type.clone()))?;

    let mut float_node = node.clone();
    float_node.op_type = base.to_string();
    float_node.domain = None;
    float_node.attribute.retain(|a| a.name != WEIGHT_AXIS_ATTR);
    float_node.input.truncate(arity);

    Ok(Box::new(DequantOp {
        name: node.op_type.clone(),
        inner: create_operator(&float_node)?,
        weight_index,
        arity,
        axis: node.get_int(WEIGHT_AXIS_ATTR).unwrap_or(0),
    }))
}

impl Operator for DequantOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let q = input(inputs, self.weight_index, &self.name)?;
        let scale = input(inputs, self.arity, &self.name)?;
        let zero_point = inputs.get(self.arity + 1).copied().flatten();
        let weight = Value::Float(dequantize_linear(q, scale, zero_point, self.axis)?);

        let mut float_inputs: Vec<Option<&Value>> = (0..self.arity)
            .map(|i| inputs.get(i).copied().flatten())
            .collect();
        float_inputs[self.weight_index] = Some(&weight);
        self.inner.execute(&float_inputs)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Tests
// =============================================================================
