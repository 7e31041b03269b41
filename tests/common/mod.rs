//! Common test utilities
#![allow(dead_code)]

use elemwise::dtype::DType;
use elemwise::error::{Error, Result};
use elemwise::kernel::CompilationCache;
use elemwise::runtime::cpu::{CpuDevice, CpuRuntime, HostFrame};
use elemwise::tensor::Array;

/// Install a test logger once per process (RUST_LOG controls verbosity)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device 0 of the CPU runtime
pub fn cpu_device() -> CpuDevice {
    CpuDevice::new()
}

/// A private compilation cache so counters are not shared between tests
pub fn fresh_cache() -> CompilationCache<CpuRuntime> {
    CompilationCache::new()
}

/// Build a CPU array from host data
pub fn array<T: elemwise::dtype::Element>(data: &[T], shape: &[usize]) -> Array<CpuRuntime> {
    Array::from_slice(data, shape, &cpu_device()).unwrap()
}

/// Host routine for `z = x + y` over parameters 0, 1 (inputs) and 2 (output)
///
/// Arithmetic happens in the output's element type.
pub fn add_routine(f: &mut HostFrame<'_>) -> Result<()> {
    match f.dtype(2)? {
        DType::F16 => {
            let v = f.load::<half::f16>(0)?.to_f32() + f.load::<half::f16>(1)?.to_f32();
            f.store(2, half::f16::from_f32(v))
        }
        DType::F32 => {
            let v = f.load::<f32>(0)? + f.load::<f32>(1)?;
            f.store(2, v)
        }
        DType::F64 => {
            let v = f.load::<f64>(0)? + f.load::<f64>(1)?;
            f.store(2, v)
        }
        DType::I32 => {
            let v = f.load::<i32>(0)?.wrapping_add(f.load::<i32>(1)?);
            f.store(2, v)
        }
        DType::I64 => {
            let v = f.load::<i64>(0)?.wrapping_add(f.load::<i64>(1)?);
            f.store(2, v)
        }
        dtype => Err(Error::UnsupportedDType { dtype, op: "add" }),
    }
}

/// Host routine for `y = x` over parameters 0 (input) and 1 (output)
pub fn identity_routine(f: &mut HostFrame<'_>) -> Result<()> {
    let v = f.load_scalar(0)?;
    f.store_scalar(1, v)
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are close within tolerance
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}
