//! Shape - Tensor Dimension Management
//!
//! Shape arithmetic for contiguous row-major tensors: element counts, strides,
//! `NumPy` broadcasting, reshape resolution and axis normalization.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use smallvec::SmallVec;

use crate::error::{Error, Result};

// =============================================================================
// Type Aliases
// =============================================================================

/// Dimensions of a tensor. Graph tensors rarely exceed rank 6, so shapes stay
/// on the stack.
pub type Shape = SmallVec<[usize; 6]>;

/// Per-dimension step sizes, in elements.
pub type Strides = SmallVec<[usize; 6]>;

// =============================================================================
// Shape Utilities
// =============================================================================

/// Number of elements described by `shape`. A rank-0 shape holds one element.
#[must_use]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Like [`numel`], but `None` when the count does not fit in `usize`.
#[must_use]
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Row-major strides for a contiguous buffer of `shape`.
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Strides {
    let mut strides: Strides = shape
        .iter()
        .rev()
        .scan(1usize, |acc, &dim| {
            let stride = *acc;
            *acc *= dim;
            Some(stride)
        })
        .collect();
    strides.reverse();
    strides
}

/// Splits a flat offset into per-dimension coordinates.
#[must_use]
pub fn unravel_index(offset: usize, shape: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; shape.len()];
    let mut rest = offset;
    for (coord, &dim) in coords.iter_mut().zip(shape).rev() {
        if dim > 0 {
            *coord = rest % dim;
            rest /= dim;
        }
    }
    coords
}

// =============================================================================
// Broadcasting
// =============================================================================

/// Result shape of a broadcasting binary op on `lhs` and `rhs`.
///
/// Trailing dimensions are paired up; a pair is compatible when the sizes
/// match or either is 1, and the shorter shape is padded with leading 1s.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Result<Shape> {
    let rank = lhs.len().max(rhs.len());
    let padded = |shape: &[usize], i: usize| -> usize {
        let pad = rank - shape.len();
        if i < pad {
            1
        } else {
            shape[i - pad]
        }
    };

    (0..rank)
        .map(|i| match (padded(lhs, i), padded(rhs, i)) {
            (a, b) if a == b || b == 1 => Ok(a),
            (1, b) => Ok(b),
            _ => Err(Error::BroadcastError {
                shape1: lhs.to_vec(),
                shape2: rhs.to_vec(),
            }),
        })
        .collect()
}

/// Strides that read `shape` as if it had `target_shape`.
///
/// Broadcast dimensions get a stride of zero. `shape` must be broadcastable
/// to `target_shape`.
#[must_use]
pub fn broadcast_strides(shape: &[usize], target_shape: &[usize]) -> Strides {
    let own = contiguous_strides(shape);
    let pad = target_shape.len() - shape.len();

    target_shape
        .iter()
        .enumerate()
        .map(|(i, &target)| match i.checked_sub(pad) {
            Some(src) if shape[src] != 1 || target == 1 => own[src],
            _ => 0,
        })
        .collect()
}

// =============================================================================
// Shape Manipulation
// =============================================================================

/// Resolves a reshape target against the current shape.
///
/// A `0` copies the corresponding input dimension and a single `-1` is
/// inferred from the remaining element count.
pub fn reshape(current: &[usize], target: &[i64]) -> Result<Shape> {
    let total = numel(current);
    let mut resolved = Shape::with_capacity(target.len());
    let mut wildcard: Option<usize> = None;

    for (i, &dim) in target.iter().enumerate() {
        let size = match dim {
            -1 if wildcard.is_some() => {
                return Err(Error::invalid_operation("reshape accepts at most one -1"));
            }
            -1 => {
                wildcard = Some(i);
                1
            }
            0 => *current.get(i).ok_or(Error::InvalidDimension {
                index: i as i64,
                ndim: current.len(),
            })?,
            d if d < 0 => {
                return Err(Error::invalid_operation(format!("reshape dimension {d} is negative")));
            }
            d => d as usize,
        };
        resolved.push(size);
    }

    let known = numel(&resolved);
    match wildcard {
        Some(i) => {
            if known == 0 || total % known != 0 {
                return Err(Error::invalid_operation(format!(
                    "cannot infer -1 in {target:?} for {total} elements"
                )));
            }
            resolved[i] = total / known;
        }
        None if known != total => return Err(Error::shape_mismatch(current, &resolved)),
        None => {}
    }

    Ok(resolved)
}

/// Checks that `perm` is a permutation of `0..ndim`.
pub fn validate_permutation(perm: &[usize], ndim: usize) -> Result<()> {
    let mut seen = vec![false; ndim];
    let complete = perm.len() == ndim
        && perm
            .iter()
            .all(|&p| p < ndim && !std::mem::replace(&mut seen[p], true));
    if complete {
        Ok(())
    } else {
        Err(Error::invalid_operation(format!(
            "{perm:?} is not a permutation of {ndim} axes"
        )))
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Maps a possibly negative axis onto `0..ndim`.
pub fn normalize_dim(dim: i64, ndim: usize) -> Result<usize> {
    let rank = ndim as i64;
    let axis = if dim < 0 { dim + rank } else { dim };
    if (0..rank).contains(&axis) {
        Ok(axis as usize)
    } else {
        Err(Error::InvalidDimension { index: dim, ndim })
    }
}

/// Checks that `indices` address an element of `shape`.
pub fn validate_indices(indices: &[usize], shape: &[usize]) -> Result<()> {
    if indices.len() != shape.len() {
        return Err(Error::invalid_operation(format!(
            "rank {} tensor indexed with {} coordinates",
            shape.len(),
            indices.len()
        )));
    }
    match indices.iter().zip(shape).find(|&(&idx, &dim)| idx >= dim) {
        Some((&index, &size)) => Err(Error::IndexOutOfBounds { index, size }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel_and_strides() {
        assert_eq!(numel(&[2, 3, 4]), 24);
        assert_eq!(numel(&[]), 1);
        assert_eq!(contiguous_strides(&[2, 3, 4]).as_slice(), &[12, 4, 1]);
        assert!(contiguous_strides(&[]).is_empty());
    }

    #[test]
    fn test_checked_numel_overflow() {
        assert_eq!(checked_numel(&[2, 3, 4]), Some(24));
        assert_eq!(checked_numel(&[]), Some(1));
        assert_eq!(checked_numel(&[1 << 40, 1 << 40]), None);
    }

    #[test]
    fn test_unravel_index() {
        assert_eq!(unravel_index(5, &[2, 3]), vec![1, 2]);
        assert_eq!(unravel_index(23, &[2, 3, 4]), vec![1, 2, 3]);
    }

    #[test]
    fn test_broadcasting() {
        let shape = broadcast_shape(&[4, 1, 3], &[5, 3]).unwrap();
        assert_eq!(shape.as_slice(), &[4, 5, 3]);
        assert!(broadcast_shape(&[2, 3], &[4, 3]).is_err());

        assert_eq!(broadcast_strides(&[1, 3], &[2, 3]).as_slice(), &[0, 1]);
        assert_eq!(broadcast_strides(&[3], &[2, 2, 3]).as_slice(), &[0, 0, 1]);
    }

    #[test]
    fn test_reshape_infer_and_copy() {
        let shape = reshape(&[2, 3, 4], &[0, -1]).unwrap();
        assert_eq!(shape.as_slice(), &[2, 12]);
        let shape = reshape(&[2, 12], &[0, 0]).unwrap();
        assert_eq!(shape.as_slice(), &[2, 12]);
        assert!(reshape(&[2, 3], &[4, -1]).is_err());
        assert!(reshape(&[2, 3], &[-1, -1]).is_err());
        assert!(reshape(&[2, 3], &[5]).is_err());
    }

    #[test]
    fn test_validate_permutation() {
        assert!(validate_permutation(&[2, 0, 1], 3).is_ok());
        assert!(validate_permutation(&[0, 0, 1], 3).is_err());
        assert!(validate_permutation(&[0, 1], 3).is_err());
        assert!(validate_permutation(&[0, 3, 1], 3).is_err());
    }

    #[test]
    fn test_axes_and_indices() {
        assert_eq!(normalize_dim(-1, 3).unwrap(), 2);
        assert!(normalize_dim(3, 3).is_err());
        assert!(normalize_dim(-4, 3).is_err());
        assert!(validate_indices(&[1, 2], &[2, 3]).is_ok());
        assert!(validate_indices(&[2, 0], &[2, 3]).is_err());
        assert!(validate_indices(&[0], &[2, 3]).is_err());
    }
}
