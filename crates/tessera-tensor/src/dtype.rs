//! Data Types - Tensor Element Types
//!
//! Runtime `DType` tags and the `Element` trait implemented by every type a
//! tensor can store. The set mirrors the element types of the graph format:
//! single and half precision floats plus the integer encodings used by
//! quantized weights and index tensors.
//!
//! @version 0.1.0
//! @author Tessera Development Team

use core::fmt::Debug;

use half::f16;

// =============================================================================
// DType Enum
// =============================================================================

/// Element type tag carried by every tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// IEEE 754 binary16.
    F16,
    /// IEEE 754 binary32. The dtype of every float graph tensor.
    #[default]
    F32,
    /// `i8` weight codes.
    I8,
    /// `u8` weight codes.
    U8,
    /// `i32`, used for integer accumulators.
    I32,
    /// `i64`, used for shapes and gather indices.
    I64,
}

impl DType {
    /// Width of one element in bytes.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::F16 => 2,
            Self::F32 | Self::I32 => 4,
            Self::I64 => 8,
        }
    }

    /// Whether values of this type are floats.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::F32)
    }

    /// Whether values of this type are integers.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Short lowercase name, as printed in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I32 => "i32",
            Self::I64 => "i64",
        }
    }
}

impl core::fmt::Display for DType {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Element Trait
// =============================================================================

/// Scalar types a `Tensor` can hold.
pub trait Element: Copy + Clone + Debug + Default + PartialEq + Send + Sync + 'static {
    /// The runtime dtype for this element type.
    const DTYPE: DType;

    /// Runtime tag of `Self`.
    #[must_use]
    fn dtype() -> DType {
        Self::DTYPE
    }
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

impl_element! {
    f16 => F16,
    f32 => F32,
    i8 => I8,
    u8 => U8,
    i32 => I32,
    i64 => I64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F32.size_of(), 4);
        assert_eq!(DType::F16.size_of(), 2);
        assert_eq!(DType::I8.size_of(), 1);
        assert_eq!(DType::I64.size_of(), 8);
    }

    #[test]
    fn test_dtype_classes() {
        assert!(DType::F16.is_float());
        assert!(DType::U8.is_integer());
        assert!(!DType::F32.is_integer());
    }

    #[test]
    fn test_element_dtype() {
        assert_eq!(f32::dtype(), DType::F32);
        assert_eq!(<i8 as Element>::DTYPE, DType::I8);
        assert_eq!(f16::dtype(), DType::F16);
    }
}
