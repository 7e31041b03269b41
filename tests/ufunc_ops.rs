//! Integration tests for universal functions on the CPU runtime
//!
//! Tests verify:
//! - Signature selection by safe casting and by requested dtype
//! - Scalar operands and all-scalar calls
//! - The `out` option and its conflict with positional outputs
//! - The built-in copy, copy_where and divmod functions

mod common;

use common::{add_routine, array, cpu_device, fresh_cache};
use elemwise::dtype::{DType, Scalar};
use elemwise::error::Error;
use elemwise::kernel::{Arg, CallOptions, UniversalFunction, create_ufunc};
use elemwise::ops;
use elemwise::runtime::cpu::{CpuRuntime, register_host_routine};
use elemwise::tensor::Array;

fn add_ufunc(name: &str) -> UniversalFunction {
    register_host_routine(name, add_routine);
    create_ufunc(
        name,
        &["ii->i".into(), "ll->l".into(), "ff->f".into(), "dd->d".into()],
        Some("out0 = in0 + in1"),
        "",
        "",
    )
    .unwrap()
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_int_int_selects_int_loop() {
    common::init_logging();
    let add = add_ufunc("uf_add_ii");
    let x = array(&[1i32, 2, 3], &[3]);
    let y = array(&[10i32, 20, 30], &[3]);
    let z = add
        .call_with_cache(&[x.into(), y.into()], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.dtype(), DType::I32);
    assert_eq!(z.to_vec::<i32>().unwrap(), vec![11, 22, 33]);
}

#[test]
fn test_int_float_selects_double_loop() {
    let add = add_ufunc("uf_add_if");
    let x = array(&[1i32, 2], &[2]);
    let y = array(&[0.5f32, 0.25], &[2]);
    let z = add
        .call_with_cache(&[x.into(), y.into()], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.dtype(), DType::F64);
    assert_eq!(z.to_vec::<f64>().unwrap(), vec![1.5, 2.25]);
}

#[test]
fn test_scalar_literal_types() {
    let add = add_ufunc("uf_add_literal");
    let x = array(&[1i32, 2], &[2]);

    // an i64 literal is int64, which does not fit the int32 loop
    let z = add
        .call_with_cache(&[(&x).into(), Arg::from(1i64)], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.dtype(), DType::I64);
    assert_eq!(z.to_vec::<i64>().unwrap(), vec![2, 3]);

    let z = add
        .call_with_cache(&[x.into(), Arg::from(1.5f64)], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.dtype(), DType::F64);
    assert_eq!(z.to_vec::<f64>().unwrap(), vec![2.5, 3.5]);
}

#[test]
fn test_requested_dtype() {
    let add = add_ufunc("uf_add_dtype");
    let x = array(&[1i32, 2], &[2]);
    let z = add
        .call_with_cache(
            &[(&x).into(), (&x).into()],
            CallOptions::new().dtype(DType::F32),
            &fresh_cache(),
        )
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.dtype(), DType::F32);
    assert_eq!(z.to_vec::<f32>().unwrap(), vec![2.0, 4.0]);

    let err = add
        .call_with_cache(
            &[(&x).into(), x.into()],
            CallOptions::new().dtype(DType::U8),
            &fresh_cache(),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn test_no_matching_signature() {
    let add = add_ufunc("uf_add_nomatch");
    let x = array(&[1u64], &[1]);
    let y = array(&[half::f16::ONE], &[1]);
    // uint64 only reaches float64, float16 reaches float64 too, so dd->d matches
    assert!(
        add.call_with_cache(&[x.into(), y.into()], CallOptions::new(), &fresh_cache())
            .is_ok()
    );

    let only_int = {
        register_host_routine("uf_add_int_only", add_routine);
        create_ufunc("uf_add_int_only", &["ii->i".into()], Some("out0 = in0 + in1"), "", "")
            .unwrap()
    };
    let x = array(&[1.0f32], &[1]);
    let err = only_int
        .call_with_cache(&[(&x).into(), x.into()], CallOptions::new(), &fresh_cache())
        .unwrap_err();
    match err {
        Error::Type { reason, .. } => assert!(reason.contains("uf_add_int_only"), "{reason}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_unsupported_operand_kind() {
    let add = add_ufunc("uf_add_unsupported");
    let args: Vec<Arg<CpuRuntime>> = vec![array(&[1i32], &[1]).into(), "two".into()];
    let err = add
        .call_with_cache(&args, CallOptions::new(), &fresh_cache())
        .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn test_wrong_argument_count() {
    let add = add_ufunc("uf_add_count");
    let args: Vec<Arg<CpuRuntime>> = vec![1i32.into()];
    let err = add
        .call_with_cache(&args, CallOptions::new(), &fresh_cache())
        .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

// ============================================================================
// Shapes and outputs
// ============================================================================

#[test]
fn test_all_scalar_call_gives_zero_dim_output() {
    let add = add_ufunc("uf_add_scalars");
    let args: Vec<Arg<CpuRuntime>> = vec![Scalar::I32(2).into(), Scalar::I32(3).into()];
    let z = add
        .call_with_cache(&args, CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.ndim(), 0);
    assert_eq!(z.to_vec::<i32>().unwrap(), vec![5]);
}

#[test]
fn test_broadcast_into_out() {
    let add = add_ufunc("uf_add_out");
    let x = array(&[1.0f64, 2.0, 3.0], &[3]);
    let y = array(&[10.0f64, 20.0], &[2, 1]);
    let out = Array::<CpuRuntime>::empty(&[2, 3], DType::F64, &cpu_device()).unwrap();
    let z = add
        .call_with_cache(
            &[x.into(), y.into()],
            CallOptions::new().out(out.clone()),
            &fresh_cache(),
        )
        .unwrap()
        .into_single()
        .unwrap();
    assert!(z.storage().same_buffer(out.storage()));
    assert_eq!(
        out.to_vec::<f64>().unwrap(),
        vec![11.0, 12.0, 13.0, 21.0, 22.0, 23.0]
    );
}

#[test]
fn test_out_conflicts_with_positional_output() {
    let add = add_ufunc("uf_add_conflict");
    let x = array(&[1i32], &[1]);
    let out = Array::<CpuRuntime>::empty(&[1], DType::I32, &cpu_device()).unwrap();
    let err = add
        .call_with_cache(
            &[(&x).into(), (&x).into(), (&out).into()],
            CallOptions::new().out(out),
            &fresh_cache(),
        )
        .unwrap_err();
    match err {
        Error::Value { reason, .. } => assert!(reason.contains("positional and keyword")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_empty_operands() {
    let add = add_ufunc("uf_add_empty");
    let cache = fresh_cache();
    let x = array::<i32>(&[], &[0, 3]);
    let z = add
        .call_with_cache(&[(&x).into(), (&x).into()], CallOptions::new(), &cache)
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(z.shape(), &[0, 3]);
    assert_eq!(cache.stats().compiles, 0);
}

// ============================================================================
// Built-ins
// ============================================================================

#[test]
fn test_copy_of_transposed_view() {
    let copy = ops::copy().unwrap();
    let x = array(&[1i16, 2, 3, 4, 5, 6], &[2, 3]).transpose(0, 1).unwrap();
    let y = copy
        .call_with_cache(&[x.into()], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(y.shape(), &[3, 2]);
    assert!(y.is_contiguous());
    assert_eq!(y.to_vec::<i16>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
}

#[test]
fn test_copy_bool() {
    let copy = ops::copy().unwrap();
    let x = Array::<CpuRuntime>::from_bools(&[true, false, true], &[3], &cpu_device()).unwrap();
    let y = copy
        .call_with_cache(&[x.into()], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(y.dtype(), DType::Bool);
    assert_eq!(y.to_bools().unwrap(), vec![true, false, true]);
}

#[test]
fn test_copy_where_with_broadcast_mask() {
    let copy_where = ops::copy_where().unwrap();
    let x = array(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2]);
    let mask = Array::<CpuRuntime>::from_bools(&[false, true], &[2], &cpu_device()).unwrap();
    let out = array(&[0.0f32; 4], &[2, 2]);
    copy_where
        .call_with_cache(
            &[x.into(), mask.into(), (&out).into()],
            CallOptions::new(),
            &fresh_cache(),
        )
        .unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![0.0, 2.0, 0.0, 4.0]);
}

#[test]
fn test_divmod_returns_two_outputs() {
    let divmod = ops::divmod().unwrap();
    assert_eq!(divmod.nout(), 2);
    assert!(divmod.types().contains(&"ll->ll".to_string()));

    let x = array(&[-7i64, 7, 0], &[3]);
    let y = array(&[3i64, -3, 5], &[3]);
    let outs = divmod
        .call_with_cache(&[x.into(), y.into()], CallOptions::new(), &fresh_cache())
        .unwrap()
        .into_vec();
    assert_eq!(outs[0].to_vec::<i64>().unwrap(), vec![-3, -3, 0]);
    assert_eq!(outs[1].to_vec::<i64>().unwrap(), vec![2, -2, 0]);
}
