//! Operator Implementations
//!
//! Float operators covering what traced vision models emit. Each operator
//! is compiled once from its `NodeProto` (attributes parsed up front) and then
//! executed against borrowed input values.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::fmt::Debug;

use tessera_tensor::shape::normalize_dim;
use tessera_tensor::{ops, Conv2dParams, Tensor};

use super::quantized;
use super::value::{map_layout, Value};
use crate::error::{GraphError, GraphResult};
use crate::proto::NodeProto;
use crate::QUANT_DOMAIN;

// =============================================================================
// Operator Trait
// =============================================================================

/// Trait for executable operators.
pub trait Operator: Debug + Send + Sync {
    /// Executes the operator with the given inputs (`None` marks an omitted
    /// optional input).
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>>;

    /// Returns the operator name.
    fn name(&self) -> &str;
}

/// Creates an operator from a node.
pub fn create_operator(node: &NodeProto) -> GraphResult<Box<dyn Operator>> {
    match node.domain.as_deref() {
        None | Some("") => {}
        Some(QUANT_DOMAIN) => return quantized::create_dequant_operator(node),
        Some(other) => {
            return Err(GraphError::UnsupportedOperator(format!(
                "{}:{}",
                other, node.op_type
            )))
        }
    }

    match node.op_type.as_str() {
        // Activation functions
        "Relu" => Ok(Box::new(UnaryOp::new("Relu", |v| v.max(0.0)))),
        "Sigmoid" => Ok(Box::new(UnaryOp::new("Sigmoid", ops::sigmoid))),
        "Tanh" => Ok(Box::new(UnaryOp::new("Tanh", f32::tanh))),
        "Gelu" => {
            if node.get_string("approximate").is_some_and(|a| a != "none") {
                return Err(GraphError::invalid_attribute(
                    "Gelu",
                    "approximate",
                    "only exact GELU is supported",
                ));
            }
            Ok(Box::new(UnaryOp::new("Gelu", ops::gelu)))
        }
        "Erf" => Ok(Box::new(UnaryOp::new("Erf", ops::erf))),
        "Sqrt" => Ok(Box::new(UnaryOp::new("Sqrt", f32::sqrt))),
        "Softmax" => Ok(Box::new(SoftmaxOp {
            axis: node.get_int("axis").unwrap_or(-1),
        })),

        // Math operations
        "Add" => Ok(Box::new(BinaryOp::new("Add", |a, b| a + b))),
        "Sub" => Ok(Box::new(BinaryOp::new("Sub", |a, b| a - b))),
        "Mul" => Ok(Box::new(BinaryOp::new("Mul", |a, b| a * b))),
        "Div" => Ok(Box::new(BinaryOp::new("Div", |a, b| a / b))),
        "MatMul" => Ok(Box::new(MatMulOp)),
        "Gemm" => Ok(Box::new(GemmOp::from_node(node))),

        // Neural network operations
        "Conv" => Ok(Box::new(ConvOp::from_node(node)?)),
        "LayerNormalization" => Ok(Box::new(LayerNormOp {
            axis: node.get_int("axis").unwrap_or(-1),
            epsilon: node.get_float("epsilon").unwrap_or(1e-5),
        })),
        "ReduceMean" => Ok(Box::new(ReduceMeanOp {
            axes: node.get_ints("axes").map(<[i64]>::to_vec).unwrap_or_default(),
            keepdims: node.get_int("keepdims").unwrap_or(1) != 0,
        })),

        // Shape operations
        "Identity" => Ok(Box::new(IdentityOp)),
        "Reshape" => Ok(Box::new(ReshapeOp)),
        "Transpose" => Ok(Box::new(TransposeOp {
            perm: node.get_ints("perm").map(<[i64]>::to_vec),
        })),
        "Flatten" => Ok(Box::new(FlattenOp {
            axis: node.get_int("axis").unwrap_or(1),
        })),
        "Concat" => Ok(Box::new(ConcatOp {
            axis: node
                .get_int("axis")
                .ok_or_else(|| GraphError::invalid_attribute("Concat", "axis", "missing"))?,
        })),
        "Gather" => Ok(Box::new(GatherOp {
            axis: node.get_int("axis").unwrap_or(0),
        })),
        "Shape" => Ok(Box::new(ShapeOp)),
        "Expand" => Ok(Box::new(ExpandOp)),

        // Quantization
        "DequantizeLinear" => Ok(Box::new(quantized::DequantizeLinearOp {
            axis: node.get_int("axis").unwrap_or(1),
        })),

        _ => Err(GraphError::UnsupportedOperator(node.op_type.clone())),
    }
}

// =============================================================================
// Input Helpers
// =============================================================================

pub(crate) fn input<'a>(inputs: &[Option<&'a Value>], index: usize, op: &str) -> GraphResult<&'a Value> {
    inputs
        .get(index)
        .copied()
        .flatten()
        .ok_or_else(|| GraphError::missing_input(op, index))
}

pub(crate) fn float_input<'a>(
    inputs: &[Option<&'a Value>],
    index: usize,
    op: &str,
) -> GraphResult<&'a Tensor<f32>> {
    input(inputs, index, op)?.as_float(op)
}

fn shape_from_value(value: &Value, op: &str) -> GraphResult<Vec<i64>> {
    value.to_indices(op)
}

// =============================================================================
// Element-wise Operators
// =============================================================================

/// Element-wise unary float operator.
#[derive(Debug)]
pub struct UnaryOp {
    name: &'static str,
    f: fn(f32) -> f32,
}

impl UnaryOp {
    fn new(name: &'static str, f: fn(f32) -> f32) -> Self {
        Self { name, f }
    }
}

impl Operator for UnaryOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let x = float_input(inputs, 0, self.name)?;
        Ok(vec![Value::Float(x.map(self.f))])
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Element-wise binary float operator with broadcasting.
#[derive(Debug)]
pub struct BinaryOp {
    name: &'static str,
    f: fn(f32, f32) -> f32,
}

impl BinaryOp {
    fn new(name: &'static str, f: fn(f32, f32) -> f32) -> Self {
        Self { name, f }
    }
}

impl Operator for BinaryOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let a = float_input(inputs, 0, self.name)?;
        let b = float_input(inputs, 1, self.name)?;
        Ok(vec![Value::Float(a.zip_map(b, self.f)?)])
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Softmax along one axis.
#[derive(Debug)]
pub struct SoftmaxOp {
    axis: i64,
}

impl Operator for SoftmaxOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let x = float_input(inputs, 0, "Softmax")?;
        Ok(vec![Value::Float(x.softmax(self.axis)?)])
    }

    fn name(&self) -> &str {
        "Softmax"
    }
}

// =============================================================================
// Linear Algebra
// =============================================================================

/// Batched matrix multiplication.
#[derive(Debug)]
pub struct MatMulOp;

impl Operator for MatMulOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let a = float_input(inputs, 0, "MatMul")?;
        let b = float_input(inputs, 1, "MatMul")?;
        Ok(vec![Value::Float(a.matmul(b)?)])
    }

    fn name(&self) -> &str {
        "MatMul"
    }
}

/// General matrix multiply: `alpha * op(A) @ op(B) + beta * C`.
#[derive(Debug)]
pub struct GemmOp {
    alpha: f32,
    beta: f32,
    trans_a: bool,
    trans_b: bool,
}

impl GemmOp {
    fn from_node(node: &NodeProto) -> Self {
        Self {
            alpha: node.get_float("alpha").unwrap_or(1.0),
            beta: node.get_float("beta").unwrap_or(1.0),
            trans_a: node.get_int("transA").unwrap_or(0) != 0,
            trans_b: node.get_int("transB").unwrap_or(0) != 0,
        }
    }
}

impl Operator for GemmOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let a = float_input(inputs, 0, "Gemm")?;
        let b = float_input(inputs, 1, "Gemm")?;
        if a.ndim() != 2 || b.ndim() != 2 {
            return Err(GraphError::Tensor(tessera_tensor::Error::invalid_operation(
                "Gemm requires 2-D operands",
            )));
        }

        let a = if self.trans_a { a.transpose(0, 1)? } else { a.clone() };
        let b = if self.trans_b { b.transpose(0, 1)? } else { b.clone() };
        let mut y = a.matmul(&b)?;
        if (self.alpha - 1.0).abs() > f32::EPSILON {
            y = y.mul_scalar(self.alpha);
        }
        if let Some(c) = inputs.get(2).copied().flatten() {
            let c = c.as_float("Gemm")?;
            let c = if (self.beta - 1.0).abs() > f32::EPSILON {
                c.mul_scalar(self.beta)
            } else {
                c.clone()
            };
            y = y.add(&c)?;
        }
        Ok(vec![Value::Float(y)])
    }

    fn name(&self) -> &str {
        "Gemm"
    }
}

// =============================================================================
// Neural Network Operators
// =============================================================================

/// 2-D convolution.
#[derive(Debug)]
pub struct ConvOp {
    params: Conv2dParams,
}

impl ConvOp {
    pub(crate) fn from_node(node: &NodeProto) -> GraphResult<Self> {
        let pair = |name: &str, default: usize| -> GraphResult<(usize, usize)> {
            match node.get_ints(name) {
                None => Ok((default, default)),
                Some([a, b]) if *a >= 0 && *b >= 0 => Ok((*a as usize, *b as usize)),
                Some(other) => Err(GraphError::invalid_attribute(
                    "Conv",
                    name,
                    format!("expected two non-negative values, got {other:?}"),
                )),
            }
        };

        let padding = match node.get_ints("pads") {
            None => (0, 0, 0, 0),
            Some([t, l, b, r]) if [*t, *l, *b, *r].iter().all(|p| *p >= 0) => {
                (*t as usize, *l as usize, *b as usize, *r as usize)
            }
            Some(other) => {
                return Err(GraphError::invalid_attribute(
                    "Conv",
                    "pads",
                    format!("expected four non-negative values, got {other:?}"),
                ))
            }
        };

        if node.get_string("auto_pad").is_some_and(|p| p != "NOTSET") {
            return Err(GraphError::invalid_attribute("Conv", "auto_pad", "only NOTSET is supported"));
        }

        Ok(Self {
            params: Conv2dParams {
                stride: pair("strides", 1)?,
                padding,
                dilation: pair("dilations", 1)?,
                groups: node.get_int("group").unwrap_or(1).max(1) as usize,
            },
        })
    }
}

impl Operator for ConvOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let x = float_input(inputs, 0, "Conv")?;
        let w = float_input(inputs, 1, "Conv")?;
        let bias = match inputs.get(2).copied().flatten() {
            Some(b) => Some(b.as_float("Conv")?),
            None => None,
        };
        Ok(vec![Value::Float(x.conv2d(w, bias, &self.params)?)])
    }

    fn name(&self) -> &str {
        "Conv"
    }
}

/// Layer normalization.
#[derive(Debug)]
pub struct LayerNormOp {
    axis: i64,
    epsilon: f32,
}

impl Operator for LayerNormOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let x = float_input(inputs, 0, "LayerNormalization")?;
        let scale = float_input(inputs, 1, "LayerNormalization")?;
        let bias = match inputs.get(2).copied().flatten() {
            Some(b) => Some(b.as_float("LayerNormalization")?),
            None => None,
        };
        Ok(vec![Value::Float(x.layer_norm(self.axis, scale, bias, self.epsilon)?)])
    }

    fn name(&self) -> &str {
        "LayerNormalization"
    }
}

/// Mean reduction.
#[derive(Debug)]
pub struct ReduceMeanOp {
    axes: Vec<i64>,
    keepdims: bool,
}

impl Operator for ReduceMeanOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let x = float_input(inputs, 0, "ReduceMean")?;
        Ok(vec![Value::Float(x.reduce_mean(&self.axes, self.keepdims)?)])
    }

    fn name(&self) -> &str {
        "ReduceMean"
    }
}

// =============================================================================
// Shape Operators
// =============================================================================

/// Passes its input through.
#[derive(Debug)]
pub struct IdentityOp;

impl Operator for IdentityOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        Ok(vec![input(inputs, 0, "Identity")?.clone()])
    }

    fn name(&self) -> &str {
        "Identity"
    }
}

/// Reshape to a shape given as an int64 input.
#[derive(Debug)]
pub struct ReshapeOp;

impl Operator for ReshapeOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let data = input(inputs, 0, "Reshape")?;
        let shape = shape_from_value(input(inputs, 1, "Reshape")?, "Reshape")?;
        Ok(vec![map_layout!(data, |t| t.reshape(&shape)?)])
    }

    fn name(&self) -> &str {
        "Reshape"
    }
}

/// Dimension permutation (reverses dimensions when `perm` is absent).
#[derive(Debug)]
pub struct TransposeOp {
    perm: Option<Vec<i64>>,
}

impl Operator for TransposeOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let data = input(inputs, 0, "Transpose")?;
        let ndim = data.shape().len();
        let perm: Vec<usize> = match &self.perm {
            Some(p) => p
                .iter()
                .map(|&d| normalize_dim(d, ndim))
                .collect::<Result<_, _>>()?,
            None => (0..ndim).rev().collect(),
        };
        Ok(vec![map_layout!(data, |t| t.permute(&perm)?)])
    }

    fn name(&self) -> &str {
        "Transpose"
    }
}

/// Flatten to 2-D around `axis`.
#[derive(Debug)]
pub struct FlattenOp {
    axis: i64,
}

impl Operator for FlattenOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let data = input(inputs, 0, "Flatten")?;
        let ndim = data.shape().len();
        let axis = if self.axis < 0 {
            normalize_dim(self.axis, ndim)?
        } else {
            self.axis as usize
        };
        Ok(vec![map_layout!(data, |t| t.flatten(axis)?)])
    }

    fn name(&self) -> &str {
        "Flatten"
    }
}

/// Concatenation of float or int64 tensors.
#[derive(Debug)]
pub struct ConcatOp {
    axis: i64,
}

impl Operator for ConcatOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let values: Vec<&Value> = inputs.iter().copied().flatten().collect();
        let first = values.first().ok_or_else(|| GraphError::missing_input("Concat", 0))?;
        let axis = normalize_dim(self.axis, first.shape().len())?;

        let out = match first {
            Value::Int64(_) => {
                let tensors = values
                    .iter()
                    .map(|v| v.as_int64("Concat"))
                    .collect::<GraphResult<Vec<_>>>()?;
                Value::Int64(Tensor::concat(&tensors, axis)?)
            }
            _ => {
                let tensors = values
                    .iter()
                    .map(|v| v.as_float("Concat"))
                    .collect::<GraphResult<Vec<_>>>()?;
                Value::Float(Tensor::concat(&tensors, axis)?)
            }
        };
        Ok(vec![out])
    }

    fn name(&self) -> &str {
        "Concat"
    }
}

/// Index selection along an axis.
#[derive(Debug)]
pub struct GatherOp {
    axis: i64,
}

impl Operator for GatherOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let data = input(inputs, 0, "Gather")?;
        let indices = input(inputs, 1, "Gather")?;
        let axis = normalize_dim(self.axis, data.shape().len())?;
        let index_shape = indices.shape().to_vec();
        let idx = indices.to_indices("Gather indices")?;
        Ok(vec![map_layout!(data, |t| t.gather(axis, &idx, &index_shape)?)])
    }

    fn name(&self) -> &str {
        "Gather"
    }
}

/// Shape of the input as a 1-D int64 tensor.
#[derive(Debug)]
pub struct ShapeOp;

impl Operator for ShapeOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let data = input(inputs, 0, "Shape")?;
        let dims: Vec<i64> = data.shape().iter().map(|&d| d as i64).collect();
        let len = dims.len();
        Ok(vec![Value::Int64(Tensor::from_vec(dims, &[len])?)])
    }

    fn name(&self) -> &str {
        "Shape"
    }
}

/// Broadcast to a shape given as an int64 input.
#[derive(Debug)]
pub struct ExpandOp;

impl Operator for ExpandOp {
    fn execute(&self, inputs: &[Option<&Value>]) -> GraphResult<Vec<Value>> {
        let data = input(inputs, 0, "Expand")?;
        let shape: Vec<usize> = shape_from_value(input(inputs, 1, "Expand")?, "Expand")?
            .into_iter()
            .map(|d| d.max(0) as usize)
            .collect();
        Ok(vec![map_layout!(data, |t| t.expand(&shape)?)])
    }

    fn name(&self) -> &str {
        "Expand"
    }
}

// =============================================================================
// Tests
// =============================================================================
