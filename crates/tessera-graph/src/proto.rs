//! Graph Structures
//!
//! ONNX-shaped definitions of models, graphs, nodes, initializers and value
//! descriptors. Every structure owns its data outright, so `Clone` yields a
//! fully independent copy.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use half::f16;
use serde::{Deserialize, Serialize};
use tessera_tensor::{DType, Tensor};

use crate::error::{GraphError, GraphResult};
use crate::metadata_keys;

// =============================================================================
// Element Types
// =============================================================================

/// Tensor element types, numbered as in ONNX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ElementType {
    /// 32-bit float.
    Float = 1,
    /// 8-bit unsigned int.
    Uint8 = 2,
    /// 8-bit signed int.
    Int8 = 3,
    /// 32-bit signed int.
    Int32 = 6,
    /// 64-bit signed int.
    Int64 = 7,
    /// 16-bit float (half precision).
    Float16 = 10,
}

impl ElementType {
    /// Returns the size in bytes for this element type.
    pub fn size_bytes(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 => 1,
            ElementType::Float16 => 2,
            ElementType::Float | ElementType::Int32 => 4,
            ElementType::Int64 => 8,
        }
    }

    /// Creates from the ONNX numeric code.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(ElementType::Float),
            2 => Some(ElementType::Uint8),
            3 => Some(ElementType::Int8),
            6 => Some(ElementType::Int32),
            7 => Some(ElementType::Int64),
            10 => Some(ElementType::Float16),
            _ => None,
        }
    }

    /// Returns true for floating point types.
    pub fn is_float(self) -> bool {
        matches!(self, ElementType::Float | ElementType::Float16)
    }

    /// Inclusive value range of integer types.
    pub fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            ElementType::Int8 => Some((i64::from(i8::MIN), i64::from(i8::MAX))),
            ElementType::Uint8 => Some((0, i64::from(u8::MAX))),
            ElementType::Int32 => Some((i64::from(i32::MIN), i64::from(i32::MAX))),
            ElementType::Int64 => Some((i64::MIN, i64::MAX)),
            ElementType::Float | ElementType::Float16 => None,
        }
    }

    /// Lower-case name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Float => "float32",
            ElementType::Float16 => "float16",
            ElementType::Int8 => "int8",
            ElementType::Uint8 => "uint8",
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
        }
    }

    /// Maps a tensor dtype to its element type.
    pub fn from_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F32 => ElementType::Float,
            DType::F16 => ElementType::Float16,
            DType::I8 => ElementType::Int8,
            DType::U8 => ElementType::Uint8,
            DType::I32 => ElementType::Int32,
            DType::I64 => ElementType::Int64,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Tensor Shape
// =============================================================================

/// A dimension in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    /// Fixed dimension value (if known).
    pub dim_value: Option<i64>,
    /// Symbolic dimension name (if dynamic).
    pub dim_param: Option<String>,
}

impl Dimension {
    /// Creates a fixed dimension.
    pub fn fixed(value: i64) -> Self {
        Self {
            dim_value: Some(value),
            dim_param: None,
        }
    }

    /// Creates a dynamic dimension with a symbolic name.
    pub fn dynamic(name: &str) -> Self {
        Self {
            dim_value: None,
            dim_param: Some(name.to_string()),
        }
    }

    /// Returns the dimension value if it's fixed.
    pub fn value(&self) -> Option<i64> {
        self.dim_value
    }

    /// Returns true if the dimension is not fixed.
    pub fn is_dynamic(&self) -> bool {
        self.dim_value.is_none()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.dim_value, &self.dim_param) {
            (Some(v), _) => write!(f, "{v}"),
            (None, Some(p)) => f.write_str(p),
            (None, None) => f.write_str("?"),
        }
    }
}

/// Tensor shape information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    /// Dimensions of the tensor.
    pub dims: Vec<Dimension>,
}

impl TensorShape {
    /// Creates a shape from fixed dimensions.
    pub fn from_dims(dims: &[i64]) -> Self {
        Self {
            dims: dims.iter().map(|&d| Dimension::fixed(d)).collect(),
        }
    }

    /// Creates a shape whose leading dimension is dynamic.
    pub fn with_dynamic_batch(dims: &[usize], batch_name: &str) -> Self {
        let mut shape = Self::from_dims(&dims.iter().map(|&d| d as i64).collect::<Vec<_>>());
        if let Some(first) = shape.dims.first_mut() {
            *first = Dimension::dynamic(batch_name);
        }
        shape
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the shape as a vector of `Option<i64>`.
    pub fn to_vec(&self) -> Vec<Option<i64>> {
        self.dims.iter().map(|d| d.dim_value).collect()
    }

    /// Returns true if a concrete shape satisfies this declaration.
    pub fn accepts(&self, shape: &[usize]) -> bool {
        self.dims.len() == shape.len()
            && self
                .dims
                .iter()
                .zip(shape)
                .all(|(d, &s)| d.dim_value.map_or(true, |v| v == s as i64))
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

// =============================================================================
// Value Descriptors
// =============================================================================

/// Declared name, element type and shape of a graph input, output or value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDescriptor {
    /// Name of the value.
    pub name: String,
    /// Element type.
    pub elem_type: ElementType,
    /// Shape declaration.
    pub shape: TensorShape,
    /// Documentation string.
    pub doc_string: Option<String>,
}

impl TensorDescriptor {
    /// Creates a descriptor.
    pub fn new(name: &str, elem_type: ElementType, shape: TensorShape) -> Self {
        Self {
            name: name.to_string(),
            elem_type,
            shape,
            doc_string: None,
        }
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.elem_type, self.shape)
    }
}

// =============================================================================
// Tensor (Initializer)
// =============================================================================

/// Typed payload of an initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    /// 32-bit float data.
    Float(Vec<f32>),
    /// 16-bit float data.
    Float16(Vec<f16>),
    /// Signed 8-bit data.
    Int8(Vec<i8>),
    /// Unsigned 8-bit data.
    Uint8(Vec<u8>),
    /// Signed 32-bit data.
    Int32(Vec<i32>),
    /// Signed 64-bit data.
    Int64(Vec<i64>),
}

impl TensorData {
    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            TensorData::Float(v) => v.len(),
            TensorData::Float16(v) => v.len(),
            TensorData::Int8(v) => v.len(),
            TensorData::Uint8(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
        }
    }

    /// Returns true if no elements are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of the payload.
    pub fn elem_type(&self) -> ElementType {
        match self {
            TensorData::Float(_) => ElementType::Float,
            TensorData::Float16(_) => ElementType::Float16,
            TensorData::Int8(_) => ElementType::Int8,
            TensorData::Uint8(_) => ElementType::Uint8,
            TensorData::Int32(_) => ElementType::Int32,
            TensorData::Int64(_) => ElementType::Int64,
        }
    }
}

/// A tensor constant (initializer/weight).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorProto {
    /// Name of the tensor.
    pub name: String,
    /// Dimensions (shape).
    pub dims: Vec<i64>,
    /// Typed payload.
    pub data: TensorData,
    /// Documentation string.
    pub doc_string: Option<String>,
}

impl TensorProto {
    fn with_data(name: &str, dims: &[i64], data: TensorData) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.to_vec(),
            data,
            doc_string: None,
        }
    }

    /// Creates a float tensor.
    pub fn float(name: &str, dims: &[i64], data: Vec<f32>) -> Self {
        Self::with_data(name, dims, TensorData::Float(data))
    }

    /// Creates a signed 8-bit tensor.
    pub fn int8(name: &str, dims: &[i64], data: Vec<i8>) -> Self {
        Self::with_data(name, dims, TensorData::Int8(data))
    }

    /// Creates an unsigned 8-bit tensor.
    pub fn uint8(name: &str, dims: &[i64], data: Vec<u8>) -> Self {
        Self::with_data(name, dims, TensorData::Uint8(data))
    }

    /// Creates a 64-bit integer tensor.
    pub fn int64(name: &str, dims: &[i64], data: Vec<i64>) -> Self {
        Self::with_data(name, dims, TensorData::Int64(data))
    }

    /// Creates a float initializer from a tensor.
    pub fn from_tensor(name: &str, tensor: &Tensor<f32>) -> Self {
        let dims: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        Self::float(name, &dims, tensor.to_vec())
    }

    /// Returns the number of elements implied by `dims`, saturating when the
    /// product does not fit in `usize`.
    pub fn numel(&self) -> usize {
        self.checked_numel().unwrap_or(usize::MAX)
    }

    /// Number of elements implied by `dims`, or `None` when a dim is negative
    /// or the product overflows.
    pub fn checked_numel(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(usize::try_from(d).ok()?))
    }

    /// Returns the dims as `usize`.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|&d| d.max(0) as usize).collect()
    }

    /// Element type of the payload.
    pub fn elem_type(&self) -> ElementType {
        self.data.elem_type()
    }

    /// Payload size in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len() * self.elem_type().size_bytes()
    }

    /// Borrows float data, if this is a float tensor.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Float(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Borrows int64 data, if this is an int64 tensor.
    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::Int64(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Converts a float or half tensor into `Tensor<f32>`.
    pub fn to_f32_tensor(&self) -> GraphResult<Tensor<f32>> {
        let data = match &self.data {
            TensorData::Float(v) => v.clone(),
            TensorData::Float16(v) => v.iter().map(|h| h.to_f32()).collect(),
            other => {
                return Err(GraphError::InvalidDataType {
                    name: self.name.clone(),
                    expected: "float32".to_string(),
                    actual: other.elem_type().to_string(),
                })
            }
        };
        Ok(Tensor::from_vec(data, &self.shape())?)
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// Value of an operator attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Float value.
    Float(f32),
    /// Integer value.
    Int(i64),
    /// String value.
    String(String),
    /// Float array.
    Floats(Vec<f32>),
    /// Integer array.
    Ints(Vec<i64>),
}

/// An attribute of an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeProto {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: AttributeValue,
}

impl AttributeProto {
    /// Creates an integer attribute.
    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: AttributeValue::Int(value),
        }
    }

    /// Creates a float attribute.
    pub fn float(name: &str, value: f32) -> Self {
        Self {
            name: name.to_string(),
            value: AttributeValue::Float(value),
        }
    }

    /// Creates an integer array attribute.
    pub fn ints(name: &str, values: Vec<i64>) -> Self {
        Self {
            name: name.to_string(),
            value: AttributeValue::Ints(values),
        }
    }

    /// Creates a string attribute.
    pub fn string(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: AttributeValue::String(value.to_string()),
        }
    }
}

// =============================================================================
// Node (Operator)
// =============================================================================

/// A node in the computation graph (operator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProto {
    /// Input tensor names (empty string marks an omitted optional input).
    pub input: Vec<String>,
    /// Output tensor names.
    pub output: Vec<String>,
    /// Node name (optional, for debugging).
    pub name: Option<String>,
    /// Operator type (e.g., "Conv", "MatMul").
    pub op_type: String,
    /// Operator domain (`None` for default ops).
    pub domain: Option<String>,
    /// Operator attributes.
    pub attribute: Vec<AttributeProto>,
    /// Documentation string.
    pub doc_string: Option<String>,
}

impl NodeProto {
    /// Creates an unnamed default-domain node.
    pub fn new(op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            input: inputs.iter().map(|s| (*s).to_string()).collect(),
            output: outputs.iter().map(|s| (*s).to_string()).collect(),
            name: None,
            op_type: op_type.to_string(),
            domain: None,
            attribute: Vec::new(),
            doc_string: None,
        }
    }

    /// Sets the node name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Sets the operator domain.
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, attribute: AttributeProto) -> Self {
        self.attribute.push(attribute);
        self
    }

    /// Node name, falling back to the operator type.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.op_type)
    }

    /// Gets an attribute by name.
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute.iter().find(|a| a.name == name)
    }

    /// Gets an integer attribute by name.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get_attribute(name).map(|a| &a.value) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Gets a float attribute by name.
    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.get_attribute(name).map(|a| &a.value) {
            Some(AttributeValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    /// Gets an integer array attribute by name.
    pub fn get_ints(&self, name: &str) -> Option<&[i64]> {
        match self.get_attribute(name).map(|a| &a.value) {
            Some(AttributeValue::Ints(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Gets a string attribute by name.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get_attribute(name).map(|a| &a.value) {
            Some(AttributeValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns true if this node reads `tensor`.
    pub fn reads(&self, tensor: &str) -> bool {
        self.input.iter().any(|i| i == tensor)
    }
}

// =============================================================================
// Quantization Annotations
// =============================================================================

/// Links a quantized weight to its encoding and dequantization parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationAnnotation {
    /// Name of the original float tensor.
    pub tensor_name: String,
    /// Name of the integer-encoded initializer.
    pub quantized_name: String,
    /// Name of the scale initializer.
    pub scale_name: String,
    /// Name of the zero-point initializer.
    pub zero_point_name: String,
    /// Channel axis for per-channel parameters.
    pub axis: Option<i64>,
    /// Integer encoding.
    pub elem_type: ElementType,
}

// =============================================================================
// Graph
// =============================================================================

/// A computation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphProto {
    /// Graph name.
    pub name: String,
    /// Nodes (operators) in execution order.
    pub node: Vec<NodeProto>,
    /// Initializers (weights/constants).
    pub initializer: Vec<TensorProto>,
    /// Graph inputs.
    pub input: Vec<TensorDescriptor>,
    /// Graph outputs.
    pub output: Vec<TensorDescriptor>,
    /// Intermediate value information.
    pub value_info: Vec<TensorDescriptor>,
    /// Quantized weight annotations.
    pub quantization_annotation: Vec<QuantizationAnnotation>,
    /// Documentation string.
    pub doc_string: Option<String>,
}

impl GraphProto {
    /// Creates an empty graph.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            node: Vec::new(),
            initializer: Vec::new(),
            input: Vec::new(),
            output: Vec::new(),
            value_info: Vec::new(),
            quantization_annotation: Vec::new(),
            doc_string: None,
        }
    }

    /// Gets an initializer by name.
    pub fn get_initializer(&self, name: &str) -> Option<&TensorProto> {
        self.initializer.iter().find(|i| i.name == name)
    }

    /// Returns true if `name` is an initializer.
    pub fn is_initializer(&self, name: &str) -> bool {
        self.get_initializer(name).is_some()
    }

    /// Returns a map of initializer name to tensor.
    pub fn initializer_map(&self) -> HashMap<&str, &TensorProto> {
        self.initializer.iter().map(|t| (t.name.as_str(), t)).collect()
    }

    /// Indices of the nodes that read `tensor`, in node order.
    pub fn consumers(&self, tensor: &str) -> Vec<usize> {
        self.node
            .iter()
            .enumerate()
            .filter(|(_, n)| n.reads(tensor))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of the node producing `tensor`.
    pub fn producer(&self, tensor: &str) -> Option<usize> {
        self.node.iter().position(|n| n.output.iter().any(|o| o == tensor))
    }

    /// Number of operator nodes per type.
    pub fn op_histogram(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in &self.node {
            *counts.entry(node.op_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Total number of initializer elements.
    pub fn parameter_count(&self) -> usize {
        self.initializer.iter().map(|t| t.data.len()).sum()
    }

    /// Total initializer payload in bytes.
    pub fn initializer_bytes(&self) -> usize {
        self.initializer.iter().map(TensorProto::byte_size).sum()
    }
}

// =============================================================================
// Model
// =============================================================================

/// Opset import declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSetId {
    /// Domain (empty for default ops).
    pub domain: String,
    /// Opset version.
    pub version: i64,
}

/// String-string key-value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Key.
    pub key: String,
    /// Value.
    pub value: String,
}

/// A model: one graph plus versioning and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProto {
    /// IR version.
    pub ir_version: i64,
    /// Opset imports.
    pub opset_import: Vec<OperatorSetId>,
    /// Producer name.
    pub producer_name: String,
    /// Producer version.
    pub producer_version: String,
    /// Model version.
    pub model_version: i64,
    /// Documentation string.
    pub doc_string: Option<String>,
    /// The computation graph.
    pub graph: GraphProto,
    /// Metadata properties.
    pub metadata_props: Vec<MetadataEntry>,
}

impl ModelProto {
    /// Gets the default-domain opset version.
    pub fn opset_version(&self) -> i64 {
        self.opset_import
            .iter()
            .find(|o| o.domain.is_empty())
            .map_or(0, |o| o.version)
    }

    /// Returns true if the model imports `domain`.
    pub fn imports_domain(&self, domain: &str) -> bool {
        self.opset_import.iter().any(|o| o.domain == domain)
    }

    /// Adds an opset import unless the domain is already imported.
    pub fn import_domain(&mut self, domain: &str, version: i64) {
        if !self.imports_domain(domain) {
            self.opset_import.push(OperatorSetId {
                domain: domain.to_string(),
                version,
            });
        }
    }

    /// Looks up a metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata_props
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Sets a metadata value, replacing an existing entry.
    pub fn set_metadata(&mut self, key: &str, value: &str) {
        match self.metadata_props.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value.to_string(),
            None => self.metadata_props.push(MetadataEntry {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Returns true if the model carries any sign of prior quantization.
    pub fn is_quantized(&self) -> bool {
        self.metadata(metadata_keys::QUANTIZED) == Some("true")
            || !self.graph.quantization_annotation.is_empty()
            || self
                .graph
                .node
                .iter()
                .any(|n| crate::QUANTIZED_OP_TYPES.contains(&n.op_type.as_str()))
    }
}

// =============================================================================
// Tests
// =============================================================================
