//! Casting rules used when matching arguments against typed signatures

use super::DType;

/// Check if a dtype can be cast to another without losing information
///
/// This is the "safe" casting rule used by universal functions when choosing
/// a loop: every value of `from` must be exactly representable in `to`.
///
/// - Bool casts to everything
/// - Integers widen within their signedness
/// - Unsigned integers cast to strictly wider signed integers
/// - Integers cast to floats whose mantissa holds them
/// - Floats only widen
pub fn can_cast(from: DType, to: DType) -> bool {
    use DType::*;

    if from == to {
        return true;
    }

    match (from, to) {
        (Bool, _) => true,

        // Integer widening
        (I8, I16 | I32 | I64) => true,
        (I16, I32 | I64) => true,
        (I32, I64) => true,
        (U8, U16 | U32 | U64 | I16 | I32 | I64) => true,
        (U16, U32 | U64 | I32 | I64) => true,
        (U32, U64 | I64) => true,

        // Integers to floats
        (I8 | U8, F16 | F32 | F64) => true,
        (I16 | U16, F32 | F64) => true,
        (I32 | U32 | I64 | U64, F64) => true,

        // Float widening
        (F16, F32 | F64) => true,
        (F32, F64) => true,

        _ => false,
    }
}
