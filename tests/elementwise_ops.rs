//! Integration tests for user-defined elementwise kernels on the CPU runtime
//!
//! Tests verify:
//! - End-to-end results over broadcast, strided and scalar operands
//! - Generic type resolution and output allocation
//! - Raw parameters and explicit loop sizes
//! - Compilation cache reuse and the empty-input short circuit
//! - Error reporting for malformed calls

mod common;

use common::{add_routine, array, assert_allclose_f32, cpu_device, fresh_cache, identity_routine};
use elemwise::dtype::{DType, Scalar};
use elemwise::error::{Error, Result};
use elemwise::kernel::{Arg, CallOptions, ElementwiseKernel, KernelOptions};
use elemwise::runtime::cpu::{CpuDevice, CpuRuntime, HostFrame, register_host_routine};
use elemwise::runtime::using_device;
use elemwise::tensor::Array;
use std::sync::Arc;

fn add_kernel(name: &str) -> ElementwiseKernel {
    register_host_routine(name, add_routine);
    ElementwiseKernel::new(
        "T x, T y",
        "T z",
        "z = x + y",
        KernelOptions::new().name(name),
    )
    .unwrap()
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_add_1000_float32() {
    common::init_logging();
    let add = add_kernel("ew_add_1000");
    let cache = fresh_cache();

    let a: Vec<f32> = (0..1000).map(|i| i as f32 * 0.5).collect();
    let b: Vec<f32> = (0..1000).map(|i| 1000.0 - i as f32).collect();
    let x = array(&a, &[1000]);
    let y = array(&b, &[1000]);

    let z = add
        .call_with_cache(&[x.into(), y.into()], CallOptions::new(), &cache)
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(z.shape(), &[1000]);
    assert_eq!(z.dtype(), DType::F32);
    let expected: Vec<f32> = a.iter().zip(&b).map(|(p, q)| p + q).collect();
    assert_allclose_f32(&z.to_vec::<f32>().unwrap(), &expected, 0.0, 0.0, "add");
}

#[test]
fn test_broadcast_column_and_row() {
    let add = add_kernel("ew_add_broadcast");
    let cache = fresh_cache();

    let col = array(&[0i32, 10, 20], &[3, 1]);
    let row = array(&[1i32, 2, 3, 4], &[1, 4]);
    let z = add
        .call_with_cache(&[col.into(), row.into()], CallOptions::new(), &cache)
        .unwrap()
        .into_single()
        .unwrap();

    assert_eq!(z.shape(), &[3, 4]);
    assert_eq!(
        z.to_vec::<i32>().unwrap(),
        vec![1, 2, 3, 4, 11, 12, 13, 14, 21, 22, 23, 24]
    );
}

#[test]
fn test_broadcast_incompatible_shapes() {
    let add = add_kernel("ew_add_incompatible");
    let x = array(&[0.0f64; 6], &[2, 3]);
    let y = array(&[0.0f64; 4], &[4]);
    let err = add
        .call_with_cache(&[x.into(), y.into()], CallOptions::new(), &fresh_cache())
        .unwrap_err();
    assert!(matches!(err, Error::BroadcastError { .. }), "{err}");
}

#[test]
fn test_scalar_operand_is_converted() {
    register_host_routine("ew_axpy", |f: &mut HostFrame<'_>| {
        assert_eq!(f.dtype(0)?, DType::F32);
        let v = f.load::<f32>(0)? * f.load::<f32>(1)? + f.load::<f32>(2)?;
        f.store(3, v)
    });
    let axpy = ElementwiseKernel::new(
        "T a, T x, T y",
        "T z",
        "z = a * x + y",
        KernelOptions::new().name("ew_axpy"),
    )
    .unwrap();

    let x = array(&[1.0f32, 2.0, 3.0], &[3]);
    let y = array(&[0.5f32, 0.5, 0.5], &[3]);
    let z = axpy
        .call_with_cache(
            &[Arg::from(2.0f64), x.into(), y.into()],
            CallOptions::new(),
            &fresh_cache(),
        )
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.to_vec::<f32>().unwrap(), vec![2.5, 4.5, 6.5]);
}

#[test]
fn test_float16_operands() {
    let add = add_kernel("ew_add_f16");
    let h = |v: &[f32]| -> Vec<half::f16> { v.iter().map(|&x| half::f16::from_f32(x)).collect() };
    let x = array(&h(&[1.0, 2.5]), &[2]);
    let y = array(&h(&[0.5, 0.5]), &[2]);
    let z = add
        .call_with_cache(&[x.into(), y.into()], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.dtype(), DType::F16);
    assert_eq!(z.to_vec::<half::f16>().unwrap(), h(&[1.5, 3.0]));
}

// ============================================================================
// Types and outputs
// ============================================================================

#[test]
fn test_generic_output_allocated_with_input_type() {
    register_host_routine("ew_identity_alloc", identity_routine);
    let k = ElementwiseKernel::new(
        "T x",
        "T y",
        "y = x",
        KernelOptions::new().name("ew_identity_alloc"),
    )
    .unwrap();

    let x = array(&[1.0f32, 2.0], &[2]);
    let y = k
        .call_with_cache(&[x.clone().into()], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(y.dtype(), DType::F32);
    assert_eq!(y.shape(), &[2]);

    let wrong = Array::<CpuRuntime>::empty(&[2], DType::I32, &cpu_device()).unwrap();
    let err = k
        .call_with_cache(&[x.into(), wrong.into()], CallOptions::new(), &fresh_cache())
        .unwrap_err();
    assert!(matches!(err, Error::Type { .. }), "{err}");
}

#[test]
fn test_concrete_output_type() {
    register_host_routine("ew_to_int", |f: &mut HostFrame<'_>| {
        let v = f.load::<f64>(0)?;
        f.store(1, v as i64)
    });
    let k = ElementwiseKernel::new(
        "T x",
        "int64 y",
        "y = (long long)x",
        KernelOptions::new().name("ew_to_int"),
    )
    .unwrap();
    let y = k
        .call_with_cache(
            &[array(&[1.9f32, -2.9], &[2]).into()],
            CallOptions::new(),
            &fresh_cache(),
        )
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(y.dtype(), DType::I64);
    assert_eq!(y.to_vec::<i64>().unwrap(), vec![1, -2]);
}

#[test]
fn test_preallocated_output_is_written_in_place() {
    let add = add_kernel("ew_add_inplace");
    let out = Array::<CpuRuntime>::empty(&[2, 2], DType::F64, &cpu_device()).unwrap();
    let x = array(&[1.0f64, 2.0, 3.0, 4.0], &[2, 2]);
    let ret = add
        .call_with_cache(
            &[x.into(), Arg::from(10.0f64)],
            CallOptions::new().out(out.clone()),
            &fresh_cache(),
        )
        .unwrap()
        .into_single()
        .unwrap();
    assert!(ret.storage().same_buffer(out.storage()));
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![11.0, 12.0, 13.0, 14.0]);
}

#[test]
fn test_out_shape_mismatch() {
    let add = add_kernel("ew_add_mismatch");
    // the output would only cover the inputs through broadcasting
    let x = array(&[1.0f32; 12], &[3, 4]);
    let out = Array::<CpuRuntime>::empty(&[1, 4], DType::F32, &cpu_device()).unwrap();
    let err = add
        .call_with_cache(
            &[x.clone().into(), x.into(), out.into()],
            CallOptions::new(),
            &fresh_cache(),
        )
        .unwrap_err();
    match err {
        Error::Value { reason, .. } => assert!(reason.starts_with("out shape is mismatched")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_out_given_twice() {
    let add = add_kernel("ew_add_out_twice");
    let x = array(&[1.0f32; 2], &[2]);
    let out = Array::<CpuRuntime>::empty(&[2], DType::F32, &cpu_device()).unwrap();
    let err = add
        .call_with_cache(
            &[x.clone().into(), x.into(), (&out).into()],
            CallOptions::new().out(out),
            &fresh_cache(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Value { .. }));
}

// ============================================================================
// Raw parameters and loop size
// ============================================================================

#[test]
fn test_raw_input_reversed() {
    register_host_routine("ew_reverse", |f: &mut HostFrame<'_>| {
        let n = f.size();
        let v = f.raw_load_scalar(0, n - f.index() - 1)?;
        f.store_scalar(1, v)
    });
    let k = ElementwiseKernel::new(
        "raw T x",
        "T y",
        "y = x[_ind.size() - i - 1]",
        KernelOptions::new().name("ew_reverse"),
    )
    .unwrap();

    let x = array(&[1u16, 2, 3, 4, 5], &[5]);
    let y = Array::<CpuRuntime>::empty(&[5], DType::U16, &cpu_device()).unwrap();
    k.call_with_cache(&[x.into(), (&y).into()], CallOptions::new(), &fresh_cache())
        .unwrap();
    assert_eq!(y.to_vec::<u16>().unwrap(), vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_raw_input_with_explicit_size() {
    register_host_routine("ew_gather_even", |f: &mut HostFrame<'_>| {
        let v = f.raw_load_scalar(0, 2 * f.index())?;
        f.raw_store_scalar(1, f.index(), v)
    });
    let k = ElementwiseKernel::new(
        "raw T x",
        "raw T y",
        "y[i] = x[2 * i]",
        KernelOptions::new().name("ew_gather_even"),
    )
    .unwrap();

    let x = array(&[0i32, 1, 2, 3, 4, 5], &[6]);
    let y = Array::<CpuRuntime>::empty(&[3], DType::I32, &cpu_device()).unwrap();
    k.call_with_cache(
        &[x.into(), (&y).into()],
        CallOptions::new().size(3),
        &fresh_cache(),
    )
    .unwrap();
    assert_eq!(y.to_vec::<i32>().unwrap(), vec![0, 2, 4]);
}

#[test]
fn test_raw_output_without_array_is_undecided() {
    let k = ElementwiseKernel::new(
        "T x",
        "raw T y",
        "y[i] = x",
        KernelOptions::new().name("ew_raw_out"),
    )
    .unwrap();
    let err = k
        .call_with_cache(
            &[array(&[1.0f32], &[1]).into()],
            CallOptions::new(),
            &fresh_cache(),
        )
        .unwrap_err();
    match err {
        Error::Value { reason, .. } => assert_eq!(reason, "output array size is undecided"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_loop_size_undecided() {
    let k = ElementwiseKernel::new(
        "raw T x",
        "raw T y",
        "y[i] = x[i]",
        KernelOptions::new().name("ew_undecided"),
    )
    .unwrap();
    let x = array(&[1.0f32], &[1]);
    let err = k
        .call_with_cache(&[x.clone().into(), x.into()], CallOptions::new(), &fresh_cache())
        .unwrap_err();
    match err {
        Error::Value { reason, .. } => assert_eq!(reason, "loop size is undecided"),
        other => panic!("unexpected error {other:?}"),
    }
}

// ============================================================================
// Caching and dispatch
// ============================================================================

#[test]
fn test_same_signature_compiles_once() {
    let add = add_kernel("ew_add_cached");
    let cache = fresh_cache();

    for _ in 0..3 {
        let x = array(&[1.0f32, 2.0], &[2]);
        add.call_with_cache(&[x.clone().into(), x.into()], CallOptions::new(), &cache)
            .unwrap();
    }
    let stats = cache.stats();
    assert_eq!(stats.compiles, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(cache.len(), 1);

    let x = array(&[1i32, 2], &[2]);
    add.call_with_cache(&[x.clone().into(), x.into()], CallOptions::new(), &cache)
        .unwrap();
    assert_eq!(cache.stats().compiles, 2);
}

#[test]
fn test_empty_input_skips_compilation() {
    let add = add_kernel("ew_add_empty");
    let cache = fresh_cache();
    let x = array::<f32>(&[], &[0]);
    let z = add
        .call_with_cache(&[x.clone().into(), x.into()], CallOptions::new(), &cache)
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.shape(), &[0]);
    assert_eq!(cache.stats().compiles, 0);
    assert!(cache.is_empty());
}

#[test]
fn test_kernel_options_reach_source() {
    register_host_routine("ew_add_fragments", add_routine);
    let add = ElementwiseKernel::new(
        "T x, T y",
        "T z",
        "z = x + y",
        KernelOptions::new()
            .name("ew_add_fragments")
            .preamble("#define SCALE 1")
            .loop_prep("int visited = 0")
            .after_loop("(void)visited")
            .option("--use_fast_math"),
    )
    .unwrap();
    let cache = fresh_cache();
    let x = array(&[1.0f32, 2.0], &[2]);
    let z = add
        .call_with_cache(&[x.clone().into(), x.into()], CallOptions::new(), &cache)
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.to_vec::<f32>().unwrap(), vec![2.0, 4.0]);

    let kernels = cache.kernels();
    assert_eq!(kernels.len(), 1);
    let src = kernels[0].source();
    assert_eq!(src.options, vec!["--use_fast_math".to_string()]);
    let pos = |needle: &str| src.code.find(needle).unwrap_or_else(|| panic!("{needle}"));
    assert!(pos("typedef float T;") < pos("#define SCALE 1"));
    assert!(pos("#define SCALE 1") < pos("void ew_add_fragments("));
    assert!(pos("void ew_add_fragments(") < pos("int visited = 0;"));
    assert!(pos("int visited = 0;") < pos("ELEMWISE_FOR(i, _ind.size())"));
    assert!(pos("z = x + y;") < pos("(void)visited;"));
}

#[test]
fn test_missing_host_routine_is_compile_error() {
    let k = ElementwiseKernel::new(
        "T x",
        "T y",
        "y = x",
        KernelOptions::new().name("ew_never_registered"),
    )
    .unwrap();
    let err = k
        .call_with_cache(
            &[array(&[1.0f32], &[1]).into()],
            CallOptions::new(),
            &fresh_cache(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Compile { .. }), "{err}");
}

#[test]
fn test_host_routine_errors_propagate() {
    register_host_routine("ew_failing", |_: &mut HostFrame<'_>| -> Result<()> {
        Err(Error::Internal("routine failed".into()))
    });
    let k = ElementwiseKernel::new("T x", "T y", "y = x", KernelOptions::new().name("ew_failing"))
        .unwrap();
    let err = k
        .call_with_cache(
            &[array(&[1u8], &[1]).into()],
            CallOptions::new(),
            &fresh_cache(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
}

#[test]
fn test_array_on_other_device() {
    let add = add_kernel("ew_add_devices");
    let other = CpuDevice::with_index(1);
    let x = Array::<CpuRuntime>::from_slice(&[1.0f32], &[1], &other).unwrap();

    let err = add
        .call_with_cache(&[x.clone().into(), x.clone().into()], CallOptions::new(), &fresh_cache())
        .unwrap_err();
    match err {
        Error::Value { reason, .. } => {
            assert!(reason.contains("array device = 1 while current = 0"), "{reason}")
        }
        other => panic!("unexpected error {other:?}"),
    }

    let cache = fresh_cache();
    let z = using_device(1, || {
        add.call_with_cache(&[x.clone().into(), x.into()], CallOptions::new(), &cache)
    })
    .unwrap()
    .into_single()
    .unwrap();
    assert_eq!(z.to_vec::<f32>().unwrap(), vec![2.0]);
}

#[test]
fn test_shared_runtime_cache() {
    let add = add_kernel("ew_add_shared_cache");
    let x = array(&[1i64, 2, 3], &[3]);
    let z = add
        .call::<CpuRuntime>(&[x.clone().into(), Arg::Scalar(Scalar::I64(5))], CallOptions::new())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.to_vec::<i64>().unwrap(), vec![6, 7, 8]);
}

#[test]
fn test_concurrent_calls() {
    let add = Arc::new(add_kernel("ew_add_threads"));
    let cache = Arc::new(fresh_cache());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let add = add.clone();
            let cache = cache.clone();
            std::thread::spawn(move || {
                let x = array(&[t as f64; 8], &[8]);
                add.call_with_cache(&[x.clone().into(), x.into()], CallOptions::new(), &cache)
                    .unwrap()
                    .into_single()
                    .unwrap()
                    .to_vec::<f64>()
                    .unwrap()
            })
        })
        .collect();

    for (t, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap(), vec![2.0 * t as f64; 8]);
    }
    assert_eq!(cache.stats().compiles, 1);
}
