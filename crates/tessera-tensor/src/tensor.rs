//! Tensor - Dense N-Dimensional Array
//!
//! `Tensor<T>` owns a contiguous row-major buffer and its shape. Layout
//! operations are generic over the element type so float activations,
//! quantized weights and index tensors share one implementation; float math
//! lives in the `Tensor<f32>` impl block below.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use core::fmt;

use half::f16;

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::ops::{self, Conv2dParams};
use crate::shape::{self, checked_numel, contiguous_strides, numel, Shape};

// =============================================================================
// Tensor Struct
// =============================================================================

/// A dense, contiguous N-dimensional tensor.
#[derive(Clone, PartialEq)]
pub struct Tensor<T: Element> {
    data: Vec<T>,
    shape: Shape,
}

impl<T: Element> Tensor<T> {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a tensor from a vector with the specified shape.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        if checked_numel(shape) != Some(data.len()) {
            return Err(Error::LengthMismatch {
                len: data.len(),
                shape: shape.to_vec(),
            });
        }
        Ok(Self {
            data,
            shape: Shape::from_slice(shape),
        })
    }

    /// Creates a tensor from a slice with the specified shape.
    pub fn from_slice(data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Creates a rank-0 tensor holding one value.
    pub fn scalar(value: T) -> Self {
        Self {
            data: vec![value],
            shape: Shape::new(),
        }
    }

    /// Creates a tensor filled with `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        Self {
            data: vec![value; numel(shape)],
            shape: Shape::from_slice(shape),
        }
    }

    /// Creates a tensor filled with the element type's default (zero).
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, T::default())
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the runtime dtype.
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Returns the size of one dimension (negative indices count from the end).
    pub fn size(&self, dim: i64) -> Result<usize> {
        let d = shape::normalize_dim(dim, self.ndim())?;
        Ok(self.shape[d])
    }

    /// Borrows the underlying buffer.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Copies the data into a vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.clone()
    }

    /// Consumes the tensor and returns its buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Gets the element at the given indices.
    pub fn get(&self, indices: &[usize]) -> Result<T> {
        shape::validate_indices(indices, &self.shape)?;
        let strides = contiguous_strides(&self.shape);
        let offset: usize = indices.iter().zip(&strides).map(|(i, s)| i * s).sum();
        Ok(self.data[offset])
    }

    /// Returns the single value of a one-element tensor.
    pub fn item(&self) -> Result<T> {
        if self.data.len() != 1 {
            return Err(Error::invalid_operation(format!(
                "item() requires exactly one element, tensor has {}",
                self.data.len()
            )));
        }
        Ok(self.data[0])
    }

    /// Applies `f` to every element, producing a tensor of another type.
    pub fn map<U: Element>(&self, f: impl Fn(T) -> U) -> Tensor<U> {
        Tensor {
            data: self.data.iter().map(|&v| f(v)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Combines two tensors element-wise with broadcasting.
    pub fn zip_map<U: Element, V: Element>(
        &self,
        other: &Tensor<U>,
        f: impl Fn(T, U) -> V,
    ) -> Result<Tensor<V>> {
        let (data, shape) = ops::broadcast_zip(&self.data, &self.shape, &other.data, &other.shape, f)?;
        Ok(Tensor { data, shape })
    }

    // =========================================================================
    // Layout Operations
    // =========================================================================

    /// Reshapes the tensor (`0` copies a dimension, `-1` is inferred).
    pub fn reshape(&self, new_shape: &[i64]) -> Result<Self> {
        let shape = shape::reshape(&self.shape, new_shape)?;
        Ok(Self {
            data: self.data.clone(),
            shape,
        })
    }

    /// Flattens to 2-D: dimensions before `axis` form the rows.
    pub fn flatten(&self, axis: usize) -> Result<Self> {
        if axis > self.ndim() {
            return Err(Error::InvalidDimension {
                index: axis as i64,
                ndim: self.ndim(),
            });
        }
        let rows = numel(&self.shape[..axis]);
        let cols = numel(&self.shape[axis..]);
        Self::from_vec(self.data.clone(), &[rows, cols])
    }

    /// Inserts a dimension of size 1 at `dim`.
    pub fn unsqueeze(&self, dim: usize) -> Result<Self> {
        if dim > self.ndim() {
            return Err(Error::InvalidDimension {
                index: dim as i64,
                ndim: self.ndim(),
            });
        }
        let mut shape = self.shape.clone();
        shape.insert(dim, 1);
        Ok(Self {
            data: self.data.clone(),
            shape,
        })
    }

    /// Permutes the dimensions.
    pub fn permute(&self, perm: &[usize]) -> Result<Self> {
        shape::validate_permutation(perm, self.ndim())?;
        if perm.iter().enumerate().all(|(i, &p)| i == p) {
            return Ok(self.clone());
        }

        let in_strides = contiguous_strides(&self.shape);
        let out_shape: Shape = perm.iter().map(|&p| self.shape[p]).collect();
        let strides: Vec<usize> = perm.iter().map(|&p| in_strides[p]).collect();
        let ndim = out_shape.len();

        let mut data = Vec::with_capacity(self.data.len());
        let mut counter = vec![0usize; ndim];
        let mut offset = 0usize;
        for _ in 0..self.data.len() {
            data.push(self.data[offset]);
            for axis in (0..ndim).rev() {
                counter[axis] += 1;
                offset += strides[axis];
                if counter[axis] < out_shape[axis] {
                    break;
                }
                offset -= strides[axis] * out_shape[axis];
                counter[axis] = 0;
            }
        }

        Ok(Self {
            data,
            shape: out_shape,
        })
    }

    /// Swaps two dimensions.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        let ndim = self.ndim();
        if dim0 >= ndim || dim1 >= ndim {
            return Err(Error::InvalidDimension {
                index: dim0.max(dim1) as i64,
                ndim,
            });
        }
        let mut perm: Vec<usize> = (0..ndim).collect();
        perm.swap(dim0, dim1);
        self.permute(&perm)
    }

    /// Concatenates tensors along `axis`.
    pub fn concat(tensors: &[&Self], axis: usize) -> Result<Self> {
        let first = tensors.first().ok_or(Error::EmptyTensor)?;
        let ndim = first.ndim();
        if axis >= ndim {
            return Err(Error::InvalidDimension {
                index: axis as i64,
                ndim,
            });
        }
        for t in tensors {
            let compatible = t.ndim() == ndim
                && t.shape
                    .iter()
                    .zip(first.shape.iter())
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(Error::shape_mismatch(&first.shape, &t.shape));
            }
        }

        let outer = numel(&first.shape[..axis]);
        let inner = numel(&first.shape[axis + 1..]);
        let mut out_shape = first.shape.clone();
        out_shape[axis] = tensors.iter().map(|t| t.shape[axis]).sum();

        let mut data = Vec::with_capacity(numel(&out_shape));
        for o in 0..outer {
            for t in tensors {
                let chunk = t.shape[axis] * inner;
                data.extend_from_slice(&t.data[o * chunk..(o + 1) * chunk]);
            }
        }

        Ok(Self {
            data,
            shape: out_shape,
        })
    }

    /// Selects `len` entries starting at `start` along `axis`.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Self> {
        if axis >= self.ndim() {
            return Err(Error::InvalidDimension {
                index: axis as i64,
                ndim: self.ndim(),
            });
        }
        if start + len > self.shape[axis] {
            return Err(Error::IndexOutOfBounds {
                index: start + len,
                size: self.shape[axis],
            });
        }
        let indices: Vec<i64> = (start..start + len).map(|i| i as i64).collect();
        self.gather(axis, &indices, &[len])
    }

    /// Gathers entries along `axis` (negative indices count from the end).
    ///
    /// The result has shape `shape[..axis] ++ index_shape ++ shape[axis + 1..]`.
    pub fn gather(&self, axis: usize, indices: &[i64], index_shape: &[usize]) -> Result<Self> {
        if axis >= self.ndim() {
            return Err(Error::InvalidDimension {
                index: axis as i64,
                ndim: self.ndim(),
            });
        }
        if indices.len() != numel(index_shape) {
            return Err(Error::LengthMismatch {
                len: indices.len(),
                shape: index_shape.to_vec(),
            });
        }

        let dim = self.shape[axis];
        let outer = numel(&self.shape[..axis]);
        let inner = numel(&self.shape[axis + 1..]);
        let resolved = indices
            .iter()
            .map(|&i| {
                let r = if i < 0 { i + dim as i64 } else { i };
                if r < 0 || r >= dim as i64 {
                    Err(Error::IndexOutOfBounds {
                        index: i.unsigned_abs() as usize,
                        size: dim,
                    })
                } else {
                    Ok(r as usize)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut data = Vec::with_capacity(outer * resolved.len() * inner);
        for o in 0..outer {
            for &idx in &resolved {
                let start = (o * dim + idx) * inner;
                data.extend_from_slice(&self.data[start..start + inner]);
            }
        }

        let mut out_shape = Shape::from_slice(&self.shape[..axis]);
        out_shape.extend_from_slice(index_shape);
        out_shape.extend_from_slice(&self.shape[axis + 1..]);
        Ok(Self {
            data,
            shape: out_shape,
        })
    }

    /// Broadcasts against `shape` (both sides may expand).
    pub fn expand(&self, shape: &[usize]) -> Result<Self> {
        let target = shape::broadcast_shape(&self.shape, shape)?;
        let ones = Tensor::<u8>::zeros(&target);
        self.zip_map(&ones, |v, _| v)
    }
}

impl<T: Element> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: Vec<&T> = self.data.iter().take(8).collect();
        f.debug_struct("Tensor")
            .field("dtype", &T::DTYPE)
            .field("shape", &self.shape.as_slice())
            .field("data", &preview)
            .finish()
    }
}

// =============================================================================
// Float Operations
// =============================================================================

impl Tensor<f32> {
    /// Element-wise addition with broadcasting.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a + b)
    }

    /// Element-wise subtraction with broadcasting.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a * b)
    }

    /// Element-wise division with broadcasting.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.zip_map(other, |a, b| a / b)
    }

    /// Multiplies every element by a scalar.
    pub fn mul_scalar(&self, value: f32) -> Self {
        self.map(|v| v * value)
    }

    /// Rectified linear unit.
    pub fn relu(&self) -> Self {
        self.map(|v| v.max(0.0))
    }

    /// Logistic sigmoid.
    pub fn sigmoid(&self) -> Self {
        self.map(ops::sigmoid)
    }

    /// Hyperbolic tangent.
    pub fn tanh(&self) -> Self {
        self.map(f32::tanh)
    }

    /// Exact GELU.
    pub fn gelu(&self) -> Self {
        self.map(ops::gelu)
    }

    /// Error function.
    pub fn erf(&self) -> Self {
        self.map(ops::erf)
    }

    /// Square root.
    pub fn sqrt(&self) -> Self {
        self.map(f32::sqrt)
    }

    /// Batched matrix multiplication.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        let (data, shape) = ops::matmul_kernel(&self.data, &self.shape, &other.data, &other.shape)?;
        Ok(Self { data, shape })
    }

    /// 2-D convolution with optional per-output-channel bias.
    pub fn conv2d(&self, weight: &Self, bias: Option<&Self>, params: &Conv2dParams) -> Result<Self> {
        let (mut data, shape) =
            ops::conv2d(&self.data, &self.shape, &weight.data, &weight.shape, params)?;
        if let Some(bias) = bias {
            let channels = shape[1];
            if bias.numel() != channels {
                return Err(Error::shape_mismatch(&[channels], bias.shape()));
            }
            let plane = shape[2] * shape[3];
            for (i, chunk) in data.chunks_mut(plane.max(1)).enumerate() {
                let b = bias.data[i % channels];
                chunk.iter_mut().for_each(|v| *v += b);
            }
        }
        Ok(Self { data, shape })
    }

    /// Softmax along `axis`.
    pub fn softmax(&self, axis: i64) -> Result<Self> {
        let axis = shape::normalize_dim(axis, self.ndim())?;
        let dim = self.shape[axis];
        let inner = numel(&self.shape[axis + 1..]);
        let outer = numel(&self.shape[..axis]);
        let mut data = self.data.clone();

        for o in 0..outer {
            for i in 0..inner {
                let base = o * dim * inner + i;
                let max = (0..dim)
                    .map(|d| data[base + d * inner])
                    .fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0f32;
                for d in 0..dim {
                    let e = (data[base + d * inner] - max).exp();
                    data[base + d * inner] = e;
                    sum += e;
                }
                for d in 0..dim {
                    data[base + d * inner] /= sum;
                }
            }
        }

        Ok(Self {
            data,
            shape: self.shape.clone(),
        })
    }

    /// Layer normalization over the dimensions from `axis` to the end.
    pub fn layer_norm(&self, axis: i64, scale: &Self, bias: Option<&Self>, epsilon: f32) -> Result<Self> {
        let axis = shape::normalize_dim(axis, self.ndim())?;
        let inner = numel(&self.shape[axis..]);
        if scale.numel() != inner {
            return Err(Error::shape_mismatch(&self.shape[axis..], scale.shape()));
        }
        if let Some(b) = bias {
            if b.numel() != inner {
                return Err(Error::shape_mismatch(&self.shape[axis..], b.shape()));
            }
        }

        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks(inner.max(1)) {
            let mean = row.iter().sum::<f32>() / inner as f32;
            let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / inner as f32;
            let inv_std = 1.0 / (var + epsilon).sqrt();
            for (j, &v) in row.iter().enumerate() {
                let shift = bias.map_or(0.0, |b| b.data[j]);
                data.push((v - mean) * inv_std * scale.data[j] + shift);
            }
        }

        Ok(Self {
            data,
            shape: self.shape.clone(),
        })
    }

    /// Mean over the given axes.
    pub fn reduce_mean(&self, axes: &[i64], keepdims: bool) -> Result<Self> {
        let mut resolved = axes
            .iter()
            .map(|&a| shape::normalize_dim(a, self.ndim()))
            .collect::<Result<Vec<_>>>()?;
        if resolved.is_empty() {
            resolved = (0..self.ndim()).collect();
        }
        resolved.sort_unstable();
        resolved.dedup();

        let mut current = self.clone();
        for &axis in resolved.iter().rev() {
            let dim = current.shape[axis];
            let outer = numel(&current.shape[..axis]);
            let inner = numel(&current.shape[axis + 1..]);
            let mut data = vec![0.0f32; outer * inner];
            for o in 0..outer {
                for d in 0..dim {
                    let base = (o * dim + d) * inner;
                    for i in 0..inner {
                        data[o * inner + i] += current.data[base + i];
                    }
                }
            }
            let denom = dim.max(1) as f32;
            data.iter_mut().for_each(|v| *v /= denom);
            let mut shape = current.shape.clone();
            if keepdims {
                shape[axis] = 1;
            } else {
                shape.remove(axis);
            }
            current = Self { data, shape };
        }

        Ok(current)
    }

    /// Largest absolute value (0 for an empty tensor).
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }

    /// Largest element-wise absolute difference between same-shaped tensors.
    pub fn max_abs_diff(&self, other: &Self) -> Result<f32> {
        if self.shape != other.shape {
            return Err(Error::shape_mismatch(&self.shape, &other.shape));
        }
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .fold(0.0f32, |m, (a, b)| m.max((a - b).abs())))
    }

    /// Returns true if all elements differ by at most `atol + rtol * |other|`.
    pub fn allclose(&self, other: &Self, rtol: f32, atol: f32) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= atol + rtol * b.abs())
    }

    /// Rounds every value to half precision.
    pub fn to_f16(&self) -> Tensor<f16> {
        self.map(f16::from_f32)
    }
}

impl Tensor<f16> {
    /// Widens to single precision.
    pub fn to_f32(&self) -> Tensor<f32> {
        self.map(f16::to_f32)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(data: &[f32], shape: &[usize]) -> Tensor<f32> {
        Tensor::from_slice(data, shape).unwrap()
    }

    #[test]
    fn test_from_vec_length_check() {
        assert!(Tensor::from_vec(vec![1.0f32, 2.0], &[3]).is_err());
        let x = t(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(x.get(&[1, 0]).unwrap(), 3.0);
    }

    #[test]
    fn test_reshape_and_flatten() {
        let x = Tensor::<f32>::zeros(&[2, 3, 4]);
        assert_eq!(x.reshape(&[0, -1]).unwrap().shape(), &[2, 12]);
        assert_eq!(x.flatten(1).unwrap().shape(), &[2, 12]);
        assert_eq!(x.flatten(0).unwrap().shape(), &[1, 24]);
    }

    #[test]
    fn test_permute() {
        let x = t(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let y = x.permute(&[1, 0]).unwrap();
        assert_eq!(y.shape(), &[3, 2]);
        assert_eq!(y.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_permute_3d() {
        let x = Tensor::from_vec((0..24).map(|v| v as f32).collect(), &[2, 3, 4]).unwrap();
        let y = x.permute(&[2, 0, 1]).unwrap();
        assert_eq!(y.shape(), &[4, 2, 3]);
        assert_eq!(y.get(&[1, 1, 2]).unwrap(), x.get(&[1, 2, 1]).unwrap());
    }

    #[test]
    fn test_concat_axis1() {
        let a = t(&[1.0, 2.0], &[2, 1]);
        let b = t(&[3.0, 4.0, 5.0, 6.0], &[2, 2]);
        let c = Tensor::concat(&[&a, &b], 1).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.as_slice(), &[1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_gather_scalar_index() {
        let x = Tensor::from_vec((0..12).map(|v| v as f32).collect(), &[2, 3, 2]).unwrap();
        let y = x.gather(1, &[0], &[]).unwrap();
        assert_eq!(y.shape(), &[2, 2]);
        assert_eq!(y.as_slice(), &[0.0, 1.0, 6.0, 7.0]);
        assert!(x.gather(1, &[3], &[]).is_err());
        let last = x.gather(1, &[-1], &[1]).unwrap();
        assert_eq!(last.shape(), &[2, 1, 2]);
    }

    #[test]
    fn test_expand() {
        let x = t(&[1.0, 2.0], &[1, 1, 2]);
        let y = x.expand(&[3, 1, 1]).unwrap();
        assert_eq!(y.shape(), &[3, 1, 2]);
        assert_eq!(y.as_slice(), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = t(&[1.0, 2.0, 3.0, 1.0, 1.0, 1.0], &[2, 3]);
        let y = x.softmax(-1).unwrap();
        for row in y.as_slice().chunks(3) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
        assert!((y.as_slice()[3] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_layer_norm() {
        let x = t(&[1.0, 2.0, 3.0, 4.0], &[1, 4]);
        let scale = Tensor::full(&[4], 1.0f32);
        let y = x.layer_norm(-1, &scale, None, 1e-5).unwrap();
        let mean: f32 = y.as_slice().iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        assert!(y.as_slice()[0] < 0.0 && y.as_slice()[3] > 0.0);
    }

    #[test]
    fn test_reduce_mean() {
        let x = t(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let y = x.reduce_mean(&[1], false).unwrap();
        assert_eq!(y.as_slice(), &[2.0, 5.0]);
        let z = x.reduce_mean(&[0, 1], true).unwrap();
        assert_eq!(z.shape(), &[1, 1]);
        assert!((z.as_slice()[0] - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_broadcast_add() {
        let x = t(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = t(&[10.0, 20.0], &[2]);
        assert_eq!(x.add(&b).unwrap().as_slice(), &[11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_conv2d_bias() {
        let x = Tensor::full(&[1, 1, 2, 2], 1.0f32);
        let w = Tensor::full(&[2, 1, 1, 1], 2.0f32);
        let b = t(&[0.5, -0.5], &[2]);
        let y = x.conv2d(&w, Some(&b), &Conv2dParams::default()).unwrap();
        assert_eq!(y.shape(), &[1, 2, 2, 2]);
        assert_eq!(&y.as_slice()[..4], &[2.5; 4]);
        assert_eq!(&y.as_slice()[4..], &[1.5; 4]);
    }

    #[test]
    fn test_max_abs_diff_and_allclose() {
        let a = t(&[1.0, 2.0], &[2]);
        let b = t(&[1.0, 2.5], &[2]);
        assert!((a.max_abs_diff(&b).unwrap() - 0.5).abs() < 1e-7);
        assert!(!a.allclose(&b, 0.0, 0.1));
        assert!(a.allclose(&b, 0.0, 0.5));
    }

    #[test]
    fn test_f16_round_trip() {
        let a = t(&[0.1, 1.0, -2.5], &[3]);
        let back = a.to_f16().to_f32();
        assert!(a.max_abs_diff(&back).unwrap() < 1e-3);
    }
}
