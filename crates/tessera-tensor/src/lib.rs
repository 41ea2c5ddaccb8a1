//! Tessera Tensor - Dense Tensors and Numeric Kernels
//!
//! Contiguous, row-major N-dimensional tensors over the element types a
//! computation graph can carry (f32, f16, i8, u8, i32, i64), together with
//! the numeric kernels shared by eager tracing and graph execution.
//!
//! # Key Features
//! - Shape utilities with `NumPy` broadcasting
//! - Layout operations (reshape, permute, concat, gather, expand)
//! - Float math (matmul, softmax, layer norm, GELU)
//! - Generic `conv2d` and batched matmul kernels, reused for integer arithmetic
//!
//! @version 0.1.0
//! @author Tessera Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod dtype;
pub mod error;
pub mod ops;
pub mod shape;
pub mod tensor;

pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use ops::{conv2d, matmul_kernel, Conv2dParams};
pub use shape::Shape;
pub use tensor::Tensor;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result};
    pub use crate::ops::Conv2dParams;
    pub use crate::tensor::Tensor;
}
