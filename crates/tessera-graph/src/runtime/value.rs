//! Runtime Values
//!
//! @version 0.1.0
//! @author Tessera Development Team

use half::f16;
use tessera_tensor::Tensor;

use crate::error::{GraphError, GraphResult};
use crate::proto::{ElementType, TensorData, TensorProto};

/// A typed tensor flowing along a graph edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit float tensor.
    Float(Tensor<f32>),
    /// 16-bit float tensor.
    Float16(Tensor<f16>),
    /// Signed 8-bit tensor.
    Int8(Tensor<i8>),
    /// Unsigned 8-bit tensor.
    Uint8(Tensor<u8>),
    /// Signed 32-bit tensor.
    Int32(Tensor<i32>),
    /// Signed 64-bit tensor.
    Int64(Tensor<i64>),
}

/// Applies a layout operation to whichever tensor a `Value` holds.
macro_rules! map_layout {
    ($value:expr, |$t:ident| $body:expr) => {
        match $value {
            Value::Float($t) => Value::Float($body),
            Value::Float16($t) => Value::Float16($body),
            Value::Int8($t) => Value::Int8($body),
            Value::Uint8($t) => Value::Uint8($body),
            Value::Int32($t) => Value::Int32($body),
            Value::Int64($t) => Value::Int64($body),
        }
    };
}

pub(crate) use map_layout;

impl Value {
    /// Element type of the held tensor.
    pub fn elem_type(&self) -> ElementType {
        match self {
            Value::Float(_) => ElementType::Float,
            Value::Float16(_) => ElementType::Float16,
            Value::Int8(_) => ElementType::Int8,
            Value::Uint8(_) => ElementType::Uint8,
            Value::Int32(_) => ElementType::Int32,
            Value::Int64(_) => ElementType::Int64,
        }
    }

    /// Shape of the held tensor.
    pub fn shape(&self) -> &[usize] {
        match self {
            Value::Float(t) => t.shape(),
            Value::Float16(t) => t.shape(),
            Value::Int8(t) => t.shape(),
            Value::Uint8(t) => t.shape(),
            Value::Int32(t) => t.shape(),
            Value::Int64(t) => t.shape(),
        }
    }

    /// Materializes an initializer.
    pub fn from_initializer(proto: &TensorProto) -> GraphResult<Self> {
        let shape = proto.shape();
        Ok(match &proto.data {
            TensorData::Float(v) => Value::Float(Tensor::from_slice(v, &shape)?),
            TensorData::Float16(v) => Value::Float16(Tensor::from_slice(v, &shape)?),
            TensorData::Int8(v) => Value::Int8(Tensor::from_slice(v, &shape)?),
            TensorData::Uint8(v) => Value::Uint8(Tensor::from_slice(v, &shape)?),
            TensorData::Int32(v) => Value::Int32(Tensor::from_slice(v, &shape)?),
            TensorData::Int64(v) => Value::Int64(Tensor::from_slice(v, &shape)?),
        })
    }

    fn type_error(&self, role: &str, expected: &str) -> GraphError {
        GraphError::InvalidDataType {
            name: role.to_string(),
            expected: expected.to_string(),
            actual: self.elem_type().to_string(),
        }
    }

    /// Borrows a float tensor.
    pub fn as_float(&self, role: &str) -> GraphResult<&Tensor<f32>> {
        match self {
            Value::Float(t) => Ok(t),
            other => Err(other.type_error(role, "float32")),
        }
    }

    /// Borrows an int64 tensor.
    pub fn as_int64(&self, role: &str) -> GraphResult<&Tensor<i64>> {
        match self {
            Value::Int64(t) => Ok(t),
            other => Err(other.type_error(role, "int64")),
        }
    }

    /// Widens an 8- or 32-bit integer tensor to `i32` values.
    pub fn to_i32_vec(&self, role: &str) -> GraphResult<Vec<i32>> {
        match self {
            Value::Int8(t) => Ok(t.as_slice().iter().map(|&v| i32::from(v)).collect()),
            Value::Uint8(t) => Ok(t.as_slice().iter().map(|&v| i32::from(v)).collect()),
            Value::Int32(t) => Ok(t.to_vec()),
            other => Err(other.type_error(role, "int8, uint8 or int32")),
        }
    }

    /// Index values of an int64 or int32 tensor.
    pub fn to_indices(&self, role: &str) -> GraphResult<Vec<i64>> {
        match self {
            Value::Int64(t) => Ok(t.to_vec()),
            Value::Int32(t) => Ok(t.as_slice().iter().map(|&v| i64::from(v)).collect()),
            other => Err(other.type_error(role, "int64")),
        }
    }

    /// Unwraps a float tensor.
    pub fn into_float(self, role: &str) -> GraphResult<Tensor<f32>> {
        match self {
            Value::Float(t) => Ok(t),
            other => Err(other.type_error(role, "float32")),
        }
    }
}

impl From<Tensor<f32>> for Value {
    fn from(t: Tensor<f32>) -> Self {
        Value::Float(t)
    }
}

impl From<Tensor<i64>> for Value {
    fn from(t: Tensor<i64>) -> Self {
        Value::Int64(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_initializer() {
        let proto = TensorProto::int8("q", &[2, 2], vec![1, -2, 3, -4]);
        let value = Value::from_initializer(&proto).unwrap();
        assert_eq!(value.elem_type(), ElementType::Int8);
        assert_eq!(value.shape(), &[2, 2]);
        assert_eq!(value.to_i32_vec("q").unwrap(), vec![1, -2, 3, -4]);
        assert!(value.as_float("q").is_err());
    }

    #[test]
    fn test_map_layout() {
        let value = Value::Int64(Tensor::from_vec(vec![1, 2, 3, 4], &[2, 2]).unwrap());
        let flat = map_layout!(&value, |t| t.reshape(&[-1]).unwrap());
        assert_eq!(flat.shape(), &[4]);
        assert_eq!(flat.elem_type(), ElementType::Int64);
    }
}
