//! Copy and masked copy

use super::builtin;
use crate::error::Result;
use crate::kernel::{UfuncSpec, UniversalFunction, create_ufunc};
use crate::runtime::cpu::{HostFrame, register_host_routine};
use std::sync::OnceLock;

const COPY_NAME: &str = "elemwise_copy";
const COPY_WHERE_NAME: &str = "elemwise_copy_where";

const COPY_TYPES: [&str; 12] = [
    "?->?", "b->b", "B->B", "h->h", "H->H", "i->i", "I->I", "l->l", "L->L", "e->e", "f->f",
    "d->d",
];

const COPY_WHERE_TYPES: [&str; 12] = [
    "??->?", "b?->b", "B?->B", "h?->h", "H?->H", "i?->i", "I?->I", "l?->l", "L?->L", "e?->e",
    "f?->f", "d?->d",
];

/// Elementwise copy, converting to the output's element type
///
/// `copy(x)` allocates a contiguous copy; `copy(x, out)` writes into `out`,
/// which must have the broadcast shape of `x` and `out`.
pub fn copy() -> Result<&'static UniversalFunction> {
    static COPY: OnceLock<UniversalFunction> = OnceLock::new();
    builtin(&COPY, || {
        register_host_routine(COPY_NAME, |f: &mut HostFrame<'_>| {
            let v = f.load_scalar(0)?;
            f.store_scalar(1, v)
        });
        let specs: Vec<UfuncSpec<'_>> = COPY_TYPES.iter().map(|&s| s.into()).collect();
        create_ufunc(
            COPY_NAME,
            &specs,
            Some("out0 = in0"),
            "",
            "Copies the input elementwise into the output.",
        )
    })
}

/// Elementwise copy of `x` into `out` where `mask` is true
///
/// Called as `copy_where(x, mask, out)`. Elements where the mask is false
/// keep their previous value.
pub fn copy_where() -> Result<&'static UniversalFunction> {
    static COPY_WHERE: OnceLock<UniversalFunction> = OnceLock::new();
    builtin(&COPY_WHERE, || {
        register_host_routine(COPY_WHERE_NAME, |f: &mut HostFrame<'_>| {
            if f.load_scalar(1)?.is_truthy() {
                let v = f.load_scalar(0)?;
                f.store_scalar(2, v)?;
            }
            Ok(())
        });
        let specs: Vec<UfuncSpec<'_>> = COPY_WHERE_TYPES.iter().map(|&s| s.into()).collect();
        create_ufunc(
            COPY_WHERE_NAME,
            &specs,
            Some("if (in1) out0 = in0"),
            "",
            "Copies the first input into the output where the second input is true.",
        )
    })
}
