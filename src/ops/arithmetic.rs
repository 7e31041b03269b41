//! Floor division with remainder

use super::builtin;
use crate::dtype::{DType, Scalar};
use crate::error::Result;
use crate::kernel::{UfuncSpec, UniversalFunction, create_ufunc};
use crate::runtime::cpu::{HostFrame, register_host_routine};
use std::sync::OnceLock;

const DIVMOD_NAME: &str = "elemwise_divmod";

const DIVMOD_TYPES: [&str; 10] = [
    "bb->bb", "BB->BB", "hh->hh", "HH->HH", "ii->ii", "II->II", "ll->ll", "LL->LL", "ff->ff",
    "dd->dd",
];

const FLOOR_DIVIDE: &str = r#"
template <typename T>
__device__ T _floor_divide(T x, T y) {
  if (y == 0) return 0;
  T q = x / y;
  if ((x % y != 0) && ((x < 0) != (y < 0))) --q;
  return q;
}
__device__ float _floor_divide(float x, float y) { return floorf(x / y); }
__device__ double _floor_divide(double x, double y) { return floor(x / y); }
"#;

fn floor_divide_int(x: i128, y: i128) -> i128 {
    if y == 0 {
        return 0;
    }
    let q = x / y;
    if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q }
}

fn divmod_host(f: &mut HostFrame<'_>) -> Result<()> {
    let (x, y) = (f.load_scalar(0)?, f.load_scalar(1)?);
    let (quot, rem) = match f.dtype(2)? {
        DType::F32 => {
            let (x, y): (f32, f32) = (f.load(0)?, f.load(1)?);
            let q = (x / y).floor();
            (Scalar::F32(q), Scalar::F32(x - q * y))
        }
        dt if dt.is_float() => {
            let (x, y) = (x.to_f64(), y.to_f64());
            let q = (x / y).floor();
            (Scalar::F64(q), Scalar::F64(x - q * y))
        }
        _ => {
            let (x, y) = (x.to_i128(), y.to_i128());
            let q = floor_divide_int(x, y);
            // stores wrap to the output width like the device assignment
            (Scalar::I64(q as i64), Scalar::I64((x - q * y) as i64))
        }
    };
    f.store_scalar(2, quot)?;
    f.store_scalar(3, rem)
}

/// Elementwise floor quotient and remainder
///
/// `divmod(x, y)` returns `(floor(x / y), x - floor(x / y) * y)`. Integer
/// division by zero yields a zero quotient.
pub fn divmod() -> Result<&'static UniversalFunction> {
    static DIVMOD: OnceLock<UniversalFunction> = OnceLock::new();
    builtin(&DIVMOD, || {
        register_host_routine(DIVMOD_NAME, divmod_host);
        let specs: Vec<UfuncSpec<'_>> = DIVMOD_TYPES.iter().map(|&s| s.into()).collect();
        create_ufunc(
            DIVMOD_NAME,
            &specs,
            Some("out0_type a = _floor_divide(in0, in1); out0 = a; out1 = in0 - a * in1"),
            FLOOR_DIVIDE,
            "Returns the floor quotient and the remainder of the inputs.",
        )
    })
}
