//! # elemwise
//!
//! **Specialized elementwise kernels for strided, broadcast device arrays.**
//!
//! elemwise lets you describe a per-element operation once, as a short body
//! over typed parameters, and run it over arrays of any shape, stride layout
//! and element type. Each call resolves generic types from the operands,
//! broadcasts them, collapses contiguous axes, and launches a kernel that is
//! synthesized and compiled once per type/rank signature and device.
//!
//! ## Features
//!
//! - **Elementwise kernels**: generic type tags, raw (unbroadcast) parameters,
//!   scalar arguments, explicit loop sizes
//! - **Universal functions**: a table of concrete signatures with NumPy-style
//!   safe-cast selection
//! - **Dimension reduction**: contiguous axes are merged before launch
//! - **Compilation cache**: one compilation per signature and device, shared
//!   across threads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use elemwise::prelude::*;
//!
//! let device = CpuRuntime::current_device()?;
//! let x = Array::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0], &[3], &device)?;
//! let y = Array::<CpuRuntime>::from_slice(&[4.0f32, 5.0, 6.0], &[3], &device)?;
//!
//! let add = ElementwiseKernel::new("T x, T y", "T z", "z = x + y", KernelOptions::new().name("add"))?;
//! let z = add.call(&[x.into(), y.into()], CallOptions::new())?.into_single()?;
//! ```
//!
//! On the CPU runtime, a kernel named `add` runs the host routine registered
//! with [`runtime::cpu::register_host_routine`] under that name.
//!
//! ## Feature Flags
//!
//! - `cuda`: NVIDIA CUDA backend (NVRTC compilation through `cudarc`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod dtype;
pub mod error;
pub mod kernel;
pub mod ops;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{DType, Element, Scalar};
    pub use crate::error::{Error, Result};
    pub use crate::kernel::{
        Arg, CallOptions, CompilationCache, ElementwiseKernel, KernelOptions, Outputs,
        UniversalFunction, create_ufunc,
    };
    pub use crate::runtime::cpu::{CpuRuntime, HostFrame, register_host_routine};
    pub use crate::runtime::{Device, Runtime};
    pub use crate::tensor::{Array, Layout};

    #[cfg(feature = "cuda")]
    pub use crate::runtime::cuda::CudaRuntime;
}
