//! Built-in universal functions
//!
//! Each function is defined once per process on first use. Defining it also
//! registers the host routine that executes it on the CPU runtime.
//!
//! | Function | Signatures | Body |
//! |----------|------------|------|
//! | [`copy`] | `?->?` ... `d->d` | `out0 = in0` |
//! | [`copy_where`] | `??->?` ... `d?->d` | `if (in1) out0 = in0` |
//! | [`divmod`] | `bb->bb` ... `dd->dd` | floor quotient and remainder |

mod arithmetic;
mod copy;

pub use arithmetic::divmod;
pub use copy::{copy, copy_where};

use crate::error::Result;
use crate::kernel::UniversalFunction;
use std::sync::OnceLock;

/// Return the function in `slot`, defining it with `build` on first use
///
/// Concurrent first uses may each build; one definition wins.
fn builtin(
    slot: &'static OnceLock<UniversalFunction>,
    build: impl FnOnce() -> Result<UniversalFunction>,
) -> Result<&'static UniversalFunction> {
    if let Some(f) = slot.get() {
        return Ok(f);
    }
    let f = build()?;
    Ok(slot.get_or_init(|| f))
}
