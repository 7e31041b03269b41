//! Data type system for elemwise arrays
//!
//! This module provides the `DType` enum representing all supported element types,
//! the casting rules used to pick universal-function signatures, and the `Scalar`
//! host value that carries a typed number into a kernel launch.

mod element;
mod promotion;
mod scalar;

pub use element::Element;
pub use promotion::can_cast;
pub use scalar::Scalar;

use std::fmt;

// ============================================================================
// DType Enum
// ============================================================================

/// Element types understood by the kernel synthesizer
///
/// Every variant has a canonical name (used in parameter specs, e.g. `float32`),
/// a one-character code (used in universal-function signatures, e.g. `f`),
/// and a native C type name emitted into generated kernel source.
///
/// # Discriminant Values
///
/// - Floats: 0-9 (F64=0, F32=1, F16=2)
/// - Signed ints: 10-19 (I64=10, I32=11, I16=12, I8=13)
/// - Unsigned ints: 20-29 (U64=20, U32=21, U16=22, U8=23)
/// - Bool: 30
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DType {
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,

    /// 64-bit signed integer
    I64 = 10,
    /// 32-bit signed integer
    I32 = 11,
    /// 16-bit signed integer
    I16 = 12,
    /// 8-bit signed integer
    I8 = 13,

    /// 64-bit unsigned integer
    U64 = 20,
    /// 32-bit unsigned integer
    U32 = 21,
    /// 16-bit unsigned integer
    U16 = 22,
    /// 8-bit unsigned integer
    U8 = 23,

    /// Boolean type (one byte)
    Bool = 30,
}

impl DType {
    /// All supported dtypes, in kind order (bool, signed, unsigned, float)
    pub const ALL: [DType; 12] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F16,
        Self::F32,
        Self::F64,
    ];

    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F64 | Self::I64 | Self::U64 => 8,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F16 | Self::I16 | Self::U16 => 2,
            Self::I8 | Self::U8 | Self::Bool => 1,
        }
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F64 | Self::F32 | Self::F16)
    }

    /// Returns true if this is a signed integer type
    #[inline]
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::I64 | Self::I32 | Self::I16 | Self::I8)
    }

    /// Returns true if this is an unsigned integer type
    #[inline]
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::U64 | Self::U32 | Self::U16 | Self::U8)
    }

    /// Returns true if this is any integer type (signed or unsigned)
    #[inline]
    pub const fn is_int(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Returns true if this is a boolean type
    #[inline]
    pub const fn is_bool(self) -> bool {
        matches!(self, Self::Bool)
    }

    /// Canonical type name as written in parameter specs (e.g. "float32")
    pub const fn name(self) -> &'static str {
        match self {
            Self::F64 => "float64",
            Self::F32 => "float32",
            Self::F16 => "float16",
            Self::I64 => "int64",
            Self::I32 => "int32",
            Self::I16 => "int16",
            Self::I8 => "int8",
            Self::U64 => "uint64",
            Self::U32 => "uint32",
            Self::U16 => "uint16",
            Self::U8 => "uint8",
            Self::Bool => "bool",
        }
    }

    /// Parse a canonical type name. Aliases are not accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dt| dt.name() == name)
    }

    /// One-character type code used in universal-function signatures
    pub const fn char_code(self) -> char {
        match self {
            Self::Bool => '?',
            Self::I8 => 'b',
            Self::U8 => 'B',
            Self::I16 => 'h',
            Self::U16 => 'H',
            Self::I32 => 'i',
            Self::U32 => 'I',
            Self::I64 => 'l',
            Self::U64 => 'L',
            Self::F16 => 'e',
            Self::F32 => 'f',
            Self::F64 => 'd',
        }
    }

    /// Parse a one-character type code
    ///
    /// `q`/`Q` (long long) are accepted as synonyms of `l`/`L`.
    pub fn from_char(code: char) -> Option<Self> {
        match code {
            'q' => Some(Self::I64),
            'Q' => Some(Self::U64),
            _ => Self::ALL.into_iter().find(|dt| dt.char_code() == code),
        }
    }

    /// Native C type name used in generated kernel source
    pub const fn c_type(self) -> &'static str {
        match self {
            Self::F64 => "double",
            Self::F32 => "float",
            Self::F16 => "float16",
            Self::I64 => "long long",
            Self::I32 => "int",
            Self::I16 => "short",
            Self::I8 => "signed char",
            Self::U64 => "unsigned long long",
            Self::U32 => "unsigned int",
            Self::U16 => "unsigned short",
            Self::U8 => "unsigned char",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
