//! Element trait for mapping Rust types to DType

use super::{DType, Scalar};
use bytemuck::Pod;
use half::f16;
use std::fmt::Debug;

/// Trait for types that can be stored in an array
///
/// This trait connects Rust's type system to the runtime dtype system.
/// It's implemented for all primitive numeric types and `half::f16`.
///
/// `bool` is not an `Element` because it is not `Pod`; boolean arrays are
/// built with [`Array::from_bools`](crate::tensor::Array::from_bools).
pub trait Element: Copy + Send + Sync + Pod + Debug + PartialOrd + 'static {
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Convert to f64 for generic numeric operations
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type
    fn from_f64(v: f64) -> Self;

    /// Wrap this value as a typed scalar argument
    fn into_scalar(self) -> Scalar;

    /// Convert a scalar of any dtype into this type (C conversion rules)
    fn from_scalar(s: Scalar) -> Self;
}

macro_rules! impl_element_int {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    v as $t
                }

                #[inline]
                fn into_scalar(self) -> Scalar {
                    Scalar::$dtype(self)
                }

                #[inline]
                fn from_scalar(s: Scalar) -> Self {
                    if s.dtype().is_float() {
                        s.to_f64() as $t
                    } else {
                        s.to_i128() as $t
                    }
                }
            }
        )*
    };
}

impl_element_int!(
    i64 => I64,
    i32 => I32,
    i16 => I16,
    i8 => I8,
    u64 => U64,
    u32 => U32,
    u16 => U16,
    u8 => U8,
);

macro_rules! impl_element_float {
    ($($t:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$dtype;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    v as $t
                }

                #[inline]
                fn into_scalar(self) -> Scalar {
                    Scalar::$dtype(self)
                }

                #[inline]
                fn from_scalar(s: Scalar) -> Self {
                    if s.dtype().is_float() {
                        s.to_f64() as $t
                    } else {
                        s.to_i128() as $t
                    }
                }
            }
        )*
    };
}

impl_element_float!(f64 => F64, f32 => F32);

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        f16::from_f64(v)
    }

    #[inline]
    fn into_scalar(self) -> Scalar {
        Scalar::F16(self)
    }

    #[inline]
    fn from_scalar(s: Scalar) -> Self {
        f16::from_f64(s.to_f64())
    }
}
