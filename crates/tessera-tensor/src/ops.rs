//! Kernels - Numeric Building Blocks
//!
//! Element-type generic kernels used by both the float tensor API and the
//! integer arithmetic of quantized operators: broadcasting binary maps,
//! batched matrix multiplication and grouped 2-D convolution.
//!
//! Kernels accumulate in a fixed order so results are bit-for-bit
//! reproducible regardless of thread count.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use core::ops::{Add, Mul};

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::shape::{broadcast_shape, broadcast_strides, numel, Shape};

// =============================================================================
// Broadcasting
// =============================================================================

/// Applies `f` element-wise over two broadcast-compatible buffers.
pub fn broadcast_zip<A, B, O, F>(
    a: &[A],
    a_shape: &[usize],
    b: &[B],
    b_shape: &[usize],
    f: F,
) -> Result<(Vec<O>, Shape)>
where
    A: Copy,
    B: Copy,
    F: Fn(A, B) -> O,
{
    if a_shape == b_shape {
        let data = a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect();
        return Ok((data, Shape::from_slice(a_shape)));
    }

    let out_shape = broadcast_shape(a_shape, b_shape)?;
    let a_strides = broadcast_strides(a_shape, &out_shape);
    let b_strides = broadcast_strides(b_shape, &out_shape);
    let total = numel(&out_shape);
    let ndim = out_shape.len();

    let mut data = Vec::with_capacity(total);
    let mut counter = vec![0usize; ndim];
    let (mut a_off, mut b_off) = (0usize, 0usize);

    for _ in 0..total {
        data.push(f(a[a_off], b[b_off]));

        // Advance the multi-index, carrying from the innermost axis.
        for axis in (0..ndim).rev() {
            counter[axis] += 1;
            a_off += a_strides[axis];
            b_off += b_strides[axis];
            if counter[axis] < out_shape[axis] {
                break;
            }
            a_off -= a_strides[axis] * out_shape[axis];
            b_off -= b_strides[axis] * out_shape[axis];
            counter[axis] = 0;
        }
    }

    Ok((data, out_shape))
}

// =============================================================================
// Matrix Multiplication
// =============================================================================

/// Batched matrix multiplication with `NumPy` batch broadcasting.
///
/// `a` is `[..., M, K]`, `b` is `[..., K, N]`; both must have rank >= 2.
pub fn matmul_kernel<T>(
    a: &[T],
    a_shape: &[usize],
    b: &[T],
    b_shape: &[usize],
) -> Result<(Vec<T>, Shape)>
where
    T: Copy + Default + Add<Output = T> + Mul<Output = T> + Send + Sync,
{
    if a_shape.len() < 2 || b_shape.len() < 2 {
        return Err(Error::invalid_operation(format!(
            "matmul requires rank >= 2, got {a_shape:?} and {b_shape:?}"
        )));
    }

    let (m, k) = (a_shape[a_shape.len() - 2], a_shape[a_shape.len() - 1]);
    let (k2, n) = (b_shape[b_shape.len() - 2], b_shape[b_shape.len() - 1]);
    if k != k2 {
        return Err(Error::shape_mismatch(&[m, k], &[k2, n]));
    }

    let a_batch = &a_shape[..a_shape.len() - 2];
    let b_batch = &b_shape[..b_shape.len() - 2];
    let batch_shape = broadcast_shape(a_batch, b_batch)?;
    let batches = numel(&batch_shape);

    let a_strides = broadcast_strides(a_batch, &batch_shape);
    let b_strides = broadcast_strides(b_batch, &batch_shape);
    let offsets: Vec<(usize, usize)> = (0..batches)
        .map(|batch| {
            let idx = crate::shape::unravel_index(batch, &batch_shape);
            let a_off: usize = idx.iter().zip(&a_strides).map(|(i, s)| i * s).sum();
            let b_off: usize = idx.iter().zip(&b_strides).map(|(i, s)| i * s).sum();
            (a_off * m * k, b_off * k * n)
        })
        .collect();

    let mut out = vec![T::default(); batches * m * n];
    if n > 0 {
        out.par_chunks_mut(n).enumerate().for_each(|(row, out_row)| {
            let (a_base, b_base) = offsets[row / m.max(1)];
            let r = row % m.max(1);
            let a_row = &a[a_base + r * k..a_base + (r + 1) * k];
            for (kk, &av) in a_row.iter().enumerate() {
                let b_row = &b[b_base + kk * n..b_base + (kk + 1) * n];
                for (o, &bv) in out_row.iter_mut().zip(b_row) {
                    *o = *o + av * bv;
                }
            }
        });
    }

    let mut out_shape = batch_shape;
    out_shape.push(m);
    out_shape.push(n);
    Ok((out, out_shape))
}

// =============================================================================
// Convolution
// =============================================================================

/// Parameters of a 2-D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dParams {
    /// Stride (height, width).
    pub stride: (usize, usize),
    /// Padding (top, left, bottom, right).
    pub padding: (usize, usize, usize, usize),
    /// Dilation (height, width).
    pub dilation: (usize, usize),
    /// Number of channel groups.
    pub groups: usize,
}

impl Default for Conv2dParams {
    fn default() -> Self {
        Self {
            stride: (1, 1),
            padding: (0, 0, 0, 0),
            dilation: (1, 1),
            groups: 1,
        }
    }
}

impl Conv2dParams {
    /// Creates parameters with the given stride and no padding.
    #[must_use]
    pub fn with_stride(stride: usize) -> Self {
        Self {
            stride: (stride, stride),
            ..Self::default()
        }
    }

    /// Computes the output spatial size for an input of `(h, w)` and kernel `(kh, kw)`.
    pub fn output_size(&self, h: usize, w: usize, kh: usize, kw: usize) -> Result<(usize, usize)> {
        if kh == 0 || kw == 0 {
            return Err(Error::invalid_operation("Kernel dimensions must be non-zero"));
        }
        let eff_kh = self.dilation.0 * (kh - 1) + 1;
        let eff_kw = self.dilation.1 * (kw - 1) + 1;
        let ph = h + self.padding.0 + self.padding.2;
        let pw = w + self.padding.1 + self.padding.3;
        if ph < eff_kh || pw < eff_kw || self.stride.0 == 0 || self.stride.1 == 0 {
            return Err(Error::invalid_operation(format!(
                "Kernel {kh}x{kw} does not fit input {h}x{w}"
            )));
        }
        Ok(((ph - eff_kh) / self.stride.0 + 1, (pw - eff_kw) / self.stride.1 + 1))
    }
}

/// Grouped 2-D convolution over `[N, C, H, W]` input and `[M, C/groups, kH, kW]` weight.
///
/// Padding contributes `T::default()`; callers working in a shifted integer
/// domain subtract zero points before calling.
pub fn conv2d<T>(
    input: &[T],
    input_shape: &[usize],
    weight: &[T],
    weight_shape: &[usize],
    params: &Conv2dParams,
) -> Result<(Vec<T>, Shape)>
where
    T: Copy + Default + Add<Output = T> + Mul<Output = T> + Send + Sync,
{
    if input_shape.len() != 4 || weight_shape.len() != 4 {
        return Err(Error::invalid_operation(format!(
            "conv2d expects 4-D input and weight, got {input_shape:?} and {weight_shape:?}"
        )));
    }
    let (batch, channels, h, w) = (input_shape[0], input_shape[1], input_shape[2], input_shape[3]);
    let (out_channels, group_channels, kh, kw) =
        (weight_shape[0], weight_shape[1], weight_shape[2], weight_shape[3]);
    let groups = params.groups.max(1);

    if channels != group_channels * groups || out_channels % groups != 0 {
        return Err(Error::shape_mismatch(
            &[out_channels, channels / groups, kh, kw],
            weight_shape,
        ));
    }

    let (oh, ow) = params.output_size(h, w, kh, kw)?;
    let plane = oh * ow;
    let out_per_group = out_channels / groups;
    let mut out = vec![T::default(); batch * out_channels * plane];

    if plane > 0 {
        out.par_chunks_mut(plane).enumerate().for_each(|(idx, out_plane)| {
            let n = idx / out_channels;
            let m = idx % out_channels;
            let g = m / out_per_group;

            for c in 0..group_channels {
                let ic = g * group_channels + c;
                let in_base = (n * channels + ic) * h * w;
                let w_base = (m * group_channels + c) * kh * kw;

                for ki in 0..kh {
                    for kj in 0..kw {
                        let wv = weight[w_base + ki * kw + kj];
                        for oy in 0..oh {
                            let iy = (oy * params.stride.0 + ki * params.dilation.0) as isize
                                - params.padding.0 as isize;
                            if iy < 0 || iy >= h as isize {
                                continue;
                            }
                            let row = in_base + iy as usize * w;
                            for ox in 0..ow {
                                let ix = (ox * params.stride.1 + kj * params.dilation.1) as isize
                                    - params.padding.1 as isize;
                                if ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                let o = &mut out_plane[oy * ow + ox];
                                *o = *o + input[row + ix as usize] * wv;
                            }
                        }
                    }
                }
            }
        });
    }

    Ok((out, Shape::from_slice(&[batch, out_channels, oh, ow])))
}

// =============================================================================
// Scalar Functions
// =============================================================================

/// Error function, Abramowitz & Stegun 7.1.26 (absolute error < 1.5e-7).
#[must_use]
pub fn erf(x: f32) -> f32 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = f64::from(x.abs());
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let y = 1.0 - poly * (-x * x).exp();
    sign * y as f32
}

/// Exact (erf-based) GELU.
#[must_use]
pub fn gelu(x: f32) -> f32 {
    0.5 * x * (1.0 + erf(x * core::f32::consts::FRAC_1_SQRT_2))
}

/// Logistic sigmoid.
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_zip_row() {
        let (data, shape) =
            broadcast_zip(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &[10.0f32, 20.0], &[2], |a, b| a + b)
                .unwrap();
        assert_eq!(shape.as_slice(), &[2, 2]);
        assert_eq!(data, vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_broadcast_zip_column() {
        let (data, _) =
            broadcast_zip(&[1i32, 2], &[2, 1], &[10i32, 20, 30], &[1, 3], |a, b| a * b).unwrap();
        assert_eq!(data, vec![10, 20, 30, 20, 40, 60]);
    }

    #[test]
    fn test_matmul_2d() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0];
        let (c, shape) = matmul_kernel(&a, &[2, 3], &b, &[3, 2]).unwrap();
        assert_eq!(shape.as_slice(), &[2, 2]);
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_broadcast_batch() {
        let a: Vec<i32> = (0..12).collect();
        let b = [1i32, 0, 0, 1, 1, 1];
        let (c, shape) = matmul_kernel(&a, &[2, 2, 3], &b, &[3, 2]).unwrap();
        assert_eq!(shape.as_slice(), &[2, 2, 2]);
        assert_eq!(&c[..2], &[2, 3]);
    }

    #[test]
    fn test_matmul_inner_mismatch() {
        assert!(matmul_kernel(&[0.0f32; 6], &[2, 3], &[0.0f32; 4], &[2, 2]).is_err());
    }

    #[test]
    fn test_conv2d_identity_kernel() {
        let input: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let (out, shape) =
            conv2d(&input, &[1, 1, 4, 4], &[1.0f32], &[1, 1, 1, 1], &Conv2dParams::default())
                .unwrap();
        assert_eq!(shape.as_slice(), &[1, 1, 4, 4]);
        assert_eq!(out, input);
    }

    #[test]
    fn test_conv2d_strided_patches() {
        let input = vec![1.0f32; 16];
        let weight = vec![1.0f32; 4];
        let params = Conv2dParams::with_stride(2);
        let (out, shape) = conv2d(&input, &[1, 1, 4, 4], &weight, &[1, 1, 2, 2], &params).unwrap();
        assert_eq!(shape.as_slice(), &[1, 1, 2, 2]);
        assert_eq!(out, vec![4.0; 4]);
    }

    #[test]
    fn test_conv2d_padding() {
        let params = Conv2dParams {
            padding: (1, 1, 1, 1),
            ..Conv2dParams::default()
        };
        let (out, shape) =
            conv2d(&[1.0f32; 4], &[1, 1, 2, 2], &[1.0f32; 9], &[1, 1, 3, 3], &params).unwrap();
        assert_eq!(shape.as_slice(), &[1, 1, 2, 2]);
        assert_eq!(out, vec![4.0; 4]);
    }

    #[test]
    fn test_erf_values() {
        assert!(erf(0.0).abs() < 1e-6);
        assert!((erf(1.0) - 0.842_700_8).abs() < 1e-5);
        assert!((erf(-1.0) + 0.842_700_8).abs() < 1e-5);
    }

    #[test]
    fn test_gelu_values() {
        assert!(gelu(0.0).abs() < 1e-7);
        assert!((gelu(1.0) - 0.841_344_7).abs() < 1e-5);
    }
}
