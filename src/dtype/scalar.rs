//! Typed host scalars passed by value into kernels

use super::DType;
use half::f16;
use std::fmt;

/// A single host-side value with an element type
///
/// Scalars are accepted wherever a kernel parameter is not an array. They
/// never bind generic type tags: an elementwise kernel takes a scalar's type
/// from the arrays sharing its tag. Universal functions do count a scalar's
/// own dtype when checking which signature the inputs can be cast to. In both
/// cases the value is converted to the parameter's resolved type before launch.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit unsigned integer
    U64(u64),
    /// 16-bit float
    F16(f16),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
}

impl Scalar {
    /// Element type of this scalar
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::I8(_) => DType::I8,
            Self::I16(_) => DType::I16,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::U8(_) => DType::U8,
            Self::U16(_) => DType::U16,
            Self::U32(_) => DType::U32,
            Self::U64(_) => DType::U64,
            Self::F16(_) => DType::F16,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    /// Value as f64 (may lose precision for 64-bit integers)
    pub fn to_f64(&self) -> f64 {
        match *self {
            Self::Bool(v) => v as u8 as f64,
            Self::I8(v) => v as f64,
            Self::I16(v) => v as f64,
            Self::I32(v) => v as f64,
            Self::I64(v) => v as f64,
            Self::U8(v) => v as f64,
            Self::U16(v) => v as f64,
            Self::U32(v) => v as f64,
            Self::U64(v) => v as f64,
            Self::F16(v) => v.to_f64(),
            Self::F32(v) => v as f64,
            Self::F64(v) => v,
        }
    }

    /// Value as i128; floats truncate toward zero and saturate
    pub fn to_i128(&self) -> i128 {
        match *self {
            Self::Bool(v) => v as i128,
            Self::I8(v) => v as i128,
            Self::I16(v) => v as i128,
            Self::I32(v) => v as i128,
            Self::I64(v) => v as i128,
            Self::U8(v) => v as i128,
            Self::U16(v) => v as i128,
            Self::U32(v) => v as i128,
            Self::U64(v) => v as i128,
            Self::F16(v) => v.to_f64() as i128,
            Self::F32(v) => v as i128,
            Self::F64(v) => v as i128,
        }
    }

    /// Returns true if the value is nonzero
    pub fn is_truthy(&self) -> bool {
        match *self {
            Self::Bool(v) => v,
            _ if self.dtype().is_float() => self.to_f64() != 0.0,
            _ => self.to_i128() != 0,
        }
    }

    /// Convert to another dtype using C conversion semantics
    ///
    /// Integer narrowing wraps, float to integer truncates toward zero,
    /// and anything to bool tests for nonzero.
    pub fn cast(self, dtype: DType) -> Scalar {
        if self.dtype() == dtype {
            return self;
        }
        if dtype == DType::Bool {
            return Self::Bool(self.is_truthy());
        }
        if self.dtype().is_float() {
            let v = self.to_f64();
            match dtype {
                DType::I8 => Self::I8(v as i8),
                DType::I16 => Self::I16(v as i16),
                DType::I32 => Self::I32(v as i32),
                DType::I64 => Self::I64(v as i64),
                DType::U8 => Self::U8(v as u8),
                DType::U16 => Self::U16(v as u16),
                DType::U32 => Self::U32(v as u32),
                DType::U64 => Self::U64(v as u64),
                DType::F16 => Self::F16(f16::from_f64(v)),
                DType::F32 => Self::F32(v as f32),
                DType::F64 | DType::Bool => Self::F64(v),
            }
        } else {
            let v = self.to_i128();
            match dtype {
                DType::I8 => Self::I8(v as i8),
                DType::I16 => Self::I16(v as i16),
                DType::I32 => Self::I32(v as i32),
                DType::I64 => Self::I64(v as i64),
                DType::U8 => Self::U8(v as u8),
                DType::U16 => Self::U16(v as u16),
                DType::U32 => Self::U32(v as u32),
                DType::U64 => Self::U64(v as u64),
                DType::F16 => Self::F16(f16::from_f64(v as f64)),
                DType::F32 => Self::F32(v as f32),
                DType::F64 | DType::Bool => Self::F64(v as f64),
            }
        }
    }

    /// Read a scalar of the given dtype from host memory
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `dtype.size_in_bytes()` bytes.
    /// No alignment is required.
    pub unsafe fn read(ptr: *const u8, dtype: DType) -> Scalar {
        use std::ptr::read_unaligned as rd;
        unsafe {
            match dtype {
                DType::Bool => Self::Bool(rd(ptr) != 0),
                DType::I8 => Self::I8(rd(ptr as *const i8)),
                DType::I16 => Self::I16(rd(ptr as *const i16)),
                DType::I32 => Self::I32(rd(ptr as *const i32)),
                DType::I64 => Self::I64(rd(ptr as *const i64)),
                DType::U8 => Self::U8(rd(ptr)),
                DType::U16 => Self::U16(rd(ptr as *const u16)),
                DType::U32 => Self::U32(rd(ptr as *const u32)),
                DType::U64 => Self::U64(rd(ptr as *const u64)),
                DType::F16 => Self::F16(rd(ptr as *const f16)),
                DType::F32 => Self::F32(rd(ptr as *const f32)),
                DType::F64 => Self::F64(rd(ptr as *const f64)),
            }
        }
    }

    /// Write this scalar's bytes to host memory
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `self.dtype().size_in_bytes()` bytes.
    /// No alignment is required.
    pub unsafe fn write(self, ptr: *mut u8) {
        use std::ptr::write_unaligned as wr;
        unsafe {
            match self {
                Self::Bool(v) => wr(ptr, v as u8),
                Self::I8(v) => wr(ptr as *mut i8, v),
                Self::I16(v) => wr(ptr as *mut i16, v),
                Self::I32(v) => wr(ptr as *mut i32, v),
                Self::I64(v) => wr(ptr as *mut i64, v),
                Self::U8(v) => wr(ptr, v),
                Self::U16(v) => wr(ptr as *mut u16, v),
                Self::U32(v) => wr(ptr as *mut u32, v),
                Self::U64(v) => wr(ptr as *mut u64, v),
                Self::F16(v) => wr(ptr as *mut f16, v),
                Self::F32(v) => wr(ptr as *mut f32, v),
                Self::F64(v) => wr(ptr as *mut f64, v),
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::F16(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            _ => write!(f, "{}", self.to_i128()),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Scalar {
                #[inline]
                fn from(v: $t) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f16 => F16,
    f32 => F32,
    f64 => F64,
);
