//! Operation Tracing
//!
//! A `Tracer` owns the graph being recorded. Every operation on a
//! `TracedTensor` computes its result eagerly and appends the matching
//! operator node, so one forward pass yields both the output value and the
//! graph that reproduces it.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::cell::RefCell;

use tessera_graph::{
    AttributeProto, ElementType, GraphBuilder, ModelProto, NodeProto, TensorDescriptor, TensorProto,
    TensorShape, BATCH_DIM,
};
use tessera_tensor::{Conv2dParams, Tensor};

use crate::error::{TraceError, TraceResult};
use crate::module::Parameter;

// =============================================================================
// Tracer
// =============================================================================

#[derive(Debug)]
struct TraceState {
    builder: Option<GraphBuilder>,
    input: Option<String>,
    value_reads: Vec<String>,
}

/// Records operations into a graph while they execute.
///
/// A tracer is owned by a single trace; it is not shared between threads.
#[derive(Debug)]
pub struct Tracer {
    state: RefCell<TraceState>,
    dynamic_batch: bool,
}

impl Tracer {
    /// Creates a tracer for a graph named `graph_name`.
    pub fn new(graph_name: &str) -> Self {
        Self {
            state: RefCell::new(TraceState {
                builder: Some(GraphBuilder::new(graph_name)),
                input: None,
                value_reads: Vec::new(),
            }),
            dynamic_batch: true,
        }
    }

    /// Fixes the leading dimension instead of declaring it dynamic.
    pub fn with_fixed_batch(mut self) -> Self {
        self.dynamic_batch = false;
        self
    }

    fn with_builder<R>(&self, f: impl FnOnce(&mut GraphBuilder) -> TraceResult<R>) -> TraceResult<R> {
        let mut state = self.state.borrow_mut();
        let builder = state.builder.as_mut().ok_or(TraceError::Finished)?;
        f(builder)
    }

    fn declared_shape(&self, shape: &[usize]) -> TensorShape {
        if self.dynamic_batch {
            TensorShape::with_dynamic_batch(shape, BATCH_DIM)
        } else {
            TensorShape::from_dims(&shape.iter().map(|&d| d as i64).collect::<Vec<_>>())
        }
    }

    /// Declares the graph input and returns it as a traced tensor.
    pub fn input(&self, name: &str, value: Tensor<f32>) -> TraceResult<TracedTensor<'_>> {
        if self.state.borrow().input.is_some() {
            return Err(TraceError::InvalidModule(
                "a trace has exactly one input".to_string(),
            ));
        }
        let descriptor = TensorDescriptor::new(name, ElementType::Float, self.declared_shape(value.shape()));
        self.with_builder(|b| {
            b.add_input(descriptor);
            Ok(())
        })?;
        self.state.borrow_mut().input = Some(name.to_string());
        Ok(TracedTensor::new(self, name.to_string(), value))
    }

    /// Records a parameter as an initializer, once per name.
    pub fn parameter(&self, param: &Parameter) -> TraceResult<TracedTensor<'_>> {
        self.with_builder(|b| {
            if !b.has_initializer(param.name()) {
                b.add_initializer(TensorProto::from_tensor(param.name(), param.data()))?;
            }
            Ok(())
        })?;
        Ok(TracedTensor::new(self, param.name().to_string(), param.data().clone()))
    }

    /// Records a float constant under a fresh name.
    pub fn constant(&self, prefix: &str, value: Tensor<f32>) -> TraceResult<TracedTensor<'_>> {
        let name = self.with_builder(|b| {
            let name = b.fresh_name(prefix);
            b.add_initializer(TensorProto::from_tensor(&name, &value))?;
            Ok(name)
        })?;
        Ok(TracedTensor::new(self, name, value))
    }

    /// Records an int64 constant (shapes, indices) and returns its name.
    pub(crate) fn constant_i64(&self, prefix: &str, values: Vec<i64>, dims: &[i64]) -> TraceResult<String> {
        self.with_builder(|b| {
            let name = b.fresh_name(prefix);
            b.add_initializer(TensorProto::int64(&name, dims, values))?;
            Ok(name)
        })
    }

    /// Appends a node and returns the name of its single output.
    pub(crate) fn record(
        &self,
        op_type: &str,
        inputs: &[&str],
        attributes: Vec<AttributeProto>,
    ) -> TraceResult<String> {
        self.with_builder(|b| {
            let node_name = b.fresh_name(op_type);
            let output = format!("{node_name}_output");
            let node = attributes.into_iter().fold(
                NodeProto::new(op_type, inputs, &[output.as_str()]).with_name(&node_name),
                NodeProto::with_attribute,
            );
            b.add_node(node);
            Ok(output)
        })
    }

    fn note_read(&self, name: &str) {
        self.state.borrow_mut().value_reads.push(name.to_string());
    }

    /// Operator types recorded so far, in order.
    pub fn op_sequence(&self) -> Vec<String> {
        self.state
            .borrow()
            .builder
            .as_ref()
            .map(GraphBuilder::op_sequence)
            .unwrap_or_default()
    }

    /// Number of nodes recorded so far.
    pub fn node_count(&self) -> usize {
        self.state
            .borrow()
            .builder
            .as_ref()
            .map_or(0, GraphBuilder::node_count)
    }

    /// Declares `output` as the graph output named `output_name` and builds
    /// the model. The tracer records nothing afterwards.
    pub fn finish(&self, output: &TracedTensor<'_>, output_name: &str) -> TraceResult<ModelProto> {
        let mut state = self.state.borrow_mut();
        if !state.value_reads.is_empty() {
            return Err(TraceError::DataDependent {
                tensors: std::mem::take(&mut state.value_reads),
            });
        }
        let mut builder = state.builder.take().ok_or(TraceError::Finished)?;
        let is_input = state.input.as_deref() == Some(output.name());

        if builder.produces(output.name()) && !is_input {
            builder.rename_value(output.name(), output_name);
        } else {
            let node_name = builder.fresh_name("Identity");
            builder.add_node(
                NodeProto::new("Identity", &[output.name()], &[output_name]).with_name(&node_name),
            );
        }
        builder.add_output(TensorDescriptor::new(
            output_name,
            ElementType::Float,
            self.declared_shape(output.shape()),
        ));
        Ok(builder.build()?)
    }
}

// =============================================================================
// Traced Tensor
// =============================================================================

/// A tensor value paired with the graph value that produces it.
#[derive(Debug, Clone)]
pub struct TracedTensor<'t> {
    tracer: &'t Tracer,
    name: String,
    value: Tensor<f32>,
}

impl<'t> TracedTensor<'t> {
    fn new(tracer: &'t Tracer, name: String, value: Tensor<f32>) -> Self {
        Self {
            tracer,
            name,
            value,
        }
    }

    /// Graph value name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concrete shape of this trace.
    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.value.ndim()
    }

    /// The tracer recording this tensor.
    pub fn tracer(&self) -> &'t Tracer {
        self.tracer
    }

    /// Reads the single element. Marks the trace as data-dependent.
    pub fn item(&self) -> TraceResult<f32> {
        self.tracer.note_read(&self.name);
        Ok(self.value.item()?)
    }

    /// Reads all elements. Marks the trace as data-dependent.
    pub fn values(&self) -> Vec<f32> {
        self.tracer.note_read(&self.name);
        self.value.to_vec()
    }

    /// Consumes the traced tensor and returns its eager value.
    pub fn into_value(self) -> Tensor<f32> {
        self.value
    }

    fn same_tracer(&self, other: &Self) -> TraceResult<()> {
        if std::ptr::eq(self.tracer, other.tracer) {
            Ok(())
        } else {
            Err(TraceError::InvalidModule(format!(
                "'{}' and '{}' belong to different traces",
                self.name, other.name
            )))
        }
    }

    fn derive(
        &self,
        op_type: &str,
        inputs: &[&str],
        attributes: Vec<AttributeProto>,
        value: Tensor<f32>,
    ) -> TraceResult<Self> {
        let name = self.tracer.record(op_type, inputs, attributes)?;
        Ok(Self::new(self.tracer, name, value))
    }

    fn binary(&self, other: &Self, op_type: &str, value: Tensor<f32>) -> TraceResult<Self> {
        self.same_tracer(other)?;
        self.derive(op_type, &[self.name.as_str(), other.name.as_str()], Vec::new(), value)
    }

    // Arithmetic

    /// Element-wise addition with broadcasting.
    pub fn add(&self, other: &Self) -> TraceResult<Self> {
        self.binary(other, "Add", self.value.add(&other.value)?)
    }

    /// Element-wise subtraction with broadcasting.
    pub fn sub(&self, other: &Self) -> TraceResult<Self> {
        self.binary(other, "Sub", self.value.sub(&other.value)?)
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, other: &Self) -> TraceResult<Self> {
        self.binary(other, "Mul", self.value.mul(&other.value)?)
    }

    /// Element-wise division with broadcasting.
    pub fn div(&self, other: &Self) -> TraceResult<Self> {
        self.binary(other, "Div", self.value.div(&other.value)?)
    }

    /// Adds a scalar constant.
    pub fn add_scalar(&self, value: f32) -> TraceResult<Self> {
        let constant = self.tracer.constant("const", Tensor::scalar(value))?;
        self.add(&constant)
    }

    /// Multiplies by a scalar constant.
    pub fn mul_scalar(&self, value: f32) -> TraceResult<Self> {
        let constant = self.tracer.constant("const", Tensor::scalar(value))?;
        self.binary(&constant, "Mul", self.value.mul_scalar(value))
    }

    /// Batched matrix multiplication.
    pub fn matmul(&self, other: &Self) -> TraceResult<Self> {
        self.binary(other, "MatMul", self.value.matmul(&other.value)?)
    }

    /// General matrix multiply `self @ op(weight) + bias` for rank-2
    /// operands, where `op` transposes when `trans_b` is set.
    pub fn gemm(&self, weight: &Self, bias: Option<&Self>, trans_b: bool) -> TraceResult<Self> {
        if self.ndim() != 2 || weight.ndim() != 2 {
            return Err(TraceError::InvalidModule(format!(
                "Gemm needs rank-2 operands, got {:?} and {:?}",
                self.shape(),
                weight.shape()
            )));
        }
        self.same_tracer(weight)?;
        let mut value = if trans_b {
            self.value.matmul(&weight.value.transpose(0, 1)?)?
        } else {
            self.value.matmul(&weight.value)?
        };
        let mut inputs = vec![self.name.as_str(), weight.name.as_str()];
        if let Some(b) = bias {
            self.same_tracer(b)?;
            value = value.add(&b.value)?;
            inputs.push(b.name.as_str());
        }
        let attributes = if trans_b {
            vec![AttributeProto::int("transB", 1)]
        } else {
            Vec::new()
        };
        self.derive("Gemm", &inputs, attributes, value)
    }

    // Activations

    /// Rectified linear unit.
    pub fn relu(&self) -> TraceResult<Self> {
        self.derive("Relu", &[self.name.as_str()], Vec::new(), self.value.relu())
    }

    /// Logistic sigmoid.
    pub fn sigmoid(&self) -> TraceResult<Self> {
        self.derive("Sigmoid", &[self.name.as_str()], Vec::new(), self.value.sigmoid())
    }

    /// Hyperbolic tangent.
    pub fn tanh(&self) -> TraceResult<Self> {
        self.derive("Tanh", &[self.name.as_str()], Vec::new(), self.value.tanh())
    }

    /// Exact (erf) GELU.
    pub fn gelu(&self) -> TraceResult<Self> {
        self.derive("Gelu", &[self.name.as_str()], Vec::new(), self.value.gelu())
    }

    /// Softmax along `axis`.
    pub fn softmax(&self, axis: i64) -> TraceResult<Self> {
        self.derive(
            "Softmax",
            &[self.name.as_str()],
            vec![AttributeProto::int("axis", axis)],
            self.value.softmax(axis)?,
        )
    }

    /// Layer normalization over the trailing axis.
    pub fn layer_norm(&self, scale: &Self, bias: Option<&Self>, epsilon: f32) -> TraceResult<Self> {
        self.same_tracer(scale)?;
        let value = self
            .value
            .layer_norm(-1, &scale.value, bias.map(|b| &b.value), epsilon)?;
        let mut inputs = vec![self.name.as_str(), scale.name.as_str()];
        if let Some(b) = bias {
            self.same_tracer(b)?;
            inputs.push(b.name.as_str());
        }
        self.derive(
            "LayerNormalization",
            &inputs,
            vec![
                AttributeProto::int("axis", -1),
                AttributeProto::float("epsilon", epsilon),
            ],
            value,
        )
    }

    // Shape operations

    /// Reshape; `0` copies the input dimension and `-1` is inferred, so
    /// `[0, 0, h, d]` stays valid for any batch size.
    pub fn reshape(&self, shape: &[i64]) -> TraceResult<Self> {
        let value = self.value.reshape(shape)?;
        let shape_name = self
            .tracer
            .constant_i64("shape", shape.to_vec(), &[shape.len() as i64])?;
        self.derive("Reshape", &[self.name.as_str(), shape_name.as_str()], Vec::new(), value)
    }

    /// Permutes dimensions.
    pub fn permute(&self, perm: &[usize]) -> TraceResult<Self> {
        let value = self.value.permute(perm)?;
        self.derive(
            "Transpose",
            &[self.name.as_str()],
            vec![AttributeProto::ints(
                "perm",
                perm.iter().map(|&p| p as i64).collect(),
            )],
            value,
        )
    }

    /// Swaps two dimensions.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> TraceResult<Self> {
        let mut perm: Vec<usize> = (0..self.ndim()).collect();
        if dim0 >= perm.len() || dim1 >= perm.len() {
            return Err(tessera_tensor::Error::InvalidDimension {
                index: dim0.max(dim1) as i64,
                ndim: perm.len(),
            }
            .into());
        }
        perm.swap(dim0, dim1);
        self.permute(&perm)
    }

    /// Flattens to 2-D around `axis`.
    pub fn flatten(&self, axis: usize) -> TraceResult<Self> {
        let value = self.value.flatten(axis)?;
        self.derive(
            "Flatten",
            &[self.name.as_str()],
            vec![AttributeProto::int("axis", axis as i64)],
            value,
        )
    }

    /// Concatenates tensors along `axis`.
    pub fn concat(tensors: &[&Self], axis: usize) -> TraceResult<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| TraceError::InvalidModule("concat of zero tensors".to_string()))?;
        for t in &tensors[1..] {
            first.same_tracer(t)?;
        }
        let values: Vec<&Tensor<f32>> = tensors.iter().map(|t| &t.value).collect();
        let value = Tensor::concat(&values, axis)?;
        let names: Vec<&str> = tensors.iter().map(|t| t.name.as_str()).collect();
        first.derive(
            "Concat",
            &names,
            vec![AttributeProto::int("axis", axis as i64)],
            value,
        )
    }

    /// Selects one index along `axis`, removing that dimension.
    pub fn select(&self, axis: usize, index: i64) -> TraceResult<Self> {
        let value = self.value.gather(axis, &[index], &[])?;
        let index_name = self.tracer.constant_i64("index", vec![index], &[])?;
        self.derive(
            "Gather",
            &[self.name.as_str(), index_name.as_str()],
            vec![AttributeProto::int("axis", axis as i64)],
            value,
        )
    }

    /// Mean over `axes`.
    pub fn mean(&self, axes: &[i64], keepdims: bool) -> TraceResult<Self> {
        let value = self.value.reduce_mean(axes, keepdims)?;
        self.derive(
            "ReduceMean",
            &[self.name.as_str()],
            vec![
                AttributeProto::ints("axes", axes.to_vec()),
                AttributeProto::int("keepdims", i64::from(keepdims)),
            ],
            value,
        )
    }

    /// Broadcasts a tensor with leading dimension 1 to the batch size of
    /// `like`, computed in the graph so the result follows the batch.
    pub fn expand_batch(&self, like: &Self) -> TraceResult<Self> {
        self.same_tracer(like)?;
        if self.shape().first() != Some(&1) || like.ndim() == 0 {
            return Err(TraceError::InvalidModule(format!(
                "expand_batch needs a leading dimension of 1, got {:?}",
                self.shape()
            )));
        }
        let mut target: Vec<usize> = self.shape().to_vec();
        target[0] = like.shape()[0];
        let value = self.value.expand(&target)?;

        let tracer = self.tracer;
        let shape = tracer.record("Shape", &[like.name.as_str()], Vec::new())?;
        let zero = tracer.constant_i64("index", vec![0], &[1])?;
        let batch = tracer.record(
            "Gather",
            &[shape.as_str(), zero.as_str()],
            vec![AttributeProto::int("axis", 0)],
        )?;
        let rest: Vec<i64> = self.shape()[1..].iter().map(|&d| d as i64).collect();
        let rest_len = rest.len() as i64;
        let rest = tracer.constant_i64("shape", rest, &[rest_len])?;
        let target_name = tracer.record(
            "Concat",
            &[batch.as_str(), rest.as_str()],
            vec![AttributeProto::int("axis", 0)],
        )?;
        self.derive("Expand", &[self.name.as_str(), target_name.as_str()], Vec::new(), value)
    }

    // Convolution

    /// 2-D convolution over `[N, C, H, W]`.
    pub fn conv2d(&self, weight: &Self, bias: Option<&Self>, params: &Conv2dParams) -> TraceResult<Self> {
        self.same_tracer(weight)?;
        let value = self
            .value
            .conv2d(&weight.value, bias.map(|b| &b.value), params)?;
        let mut inputs = vec![self.name.as_str(), weight.name.as_str()];
        if let Some(b) = bias {
            self.same_tracer(b)?;
            inputs.push(b.name.as_str());
        }
        let (t, l, b, r) = params.padding;
        let kernel: Vec<i64> = weight.shape()[2..].iter().map(|&d| d as i64).collect();
        self.derive(
            "Conv",
            &inputs,
            vec![
                AttributeProto::ints("kernel_shape", kernel),
                AttributeProto::ints("strides", vec![params.stride.0 as i64, params.stride.1 as i64]),
                AttributeProto::ints("pads", vec![t as i64, l as i64, b as i64, r as i64]),
                AttributeProto::ints(
                    "dilations",
                    vec![params.dilation.0 as i64, params.dilation.1 as i64],
                ),
                AttributeProto::int("group", params.groups as i64),
            ],
            value,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
