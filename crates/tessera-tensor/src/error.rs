//! Error Types - Tensor Error Handling
//!
//! Errors raised by shape validation and tensor kernels.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use thiserror::Error;

use crate::dtype::DType;

// =============================================================================
// Error Types
// =============================================================================

/// The main error type for tensor operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Shape mismatch between tensors.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// Data type mismatch between tensors.
    #[error("DType mismatch: expected {expected:?}, got {actual:?}")]
    DTypeMismatch {
        /// The expected data type.
        expected: DType,
        /// The actual data type.
        actual: DType,
    },

    /// Invalid dimension index.
    #[error("Invalid dimension: index {index} for tensor with {ndim} dimensions")]
    InvalidDimension {
        /// The invalid dimension index.
        index: i64,
        /// Number of dimensions in the tensor.
        ndim: usize,
    },

    /// Index out of bounds.
    #[error("Index out of bounds: index {index} for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index.
        index: usize,
        /// The size of the dimension.
        size: usize,
    },

    /// Shapes cannot be broadcast together.
    #[error("Cannot broadcast shapes {shape1:?} and {shape2:?}")]
    BroadcastError {
        /// The first shape.
        shape1: Vec<usize>,
        /// The second shape.
        shape2: Vec<usize>,
    },

    /// Data length does not match the requested shape.
    #[error("Data length {len} does not match shape {shape:?}")]
    LengthMismatch {
        /// Number of elements supplied.
        len: usize,
        /// The requested shape.
        shape: Vec<usize>,
    },

    /// Operation requires a non-empty tensor.
    #[error("Operation requires a non-empty tensor")]
    EmptyTensor,

    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of the error.
        message: String,
    },
}

impl Error {
    /// Creates a new shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a new invalid operation error.
    #[must_use]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

// =============================================================================
// Result Type
// =============================================================================

/// Result type for tensor operations.
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = Error::shape_mismatch(&[2, 3], &[3, 2]);
        assert!(err.to_string().contains("[2, 3]"));
    }

    #[test]
    fn test_invalid_operation() {
        let err = Error::invalid_operation("bad axis");
        assert_eq!(err.to_string(), "Invalid operation: bad axis");
    }
}
