//! Runtime backends for kernel execution
//!
//! This module defines the `Runtime` trait and provides implementations
//! for the CPU (host reference executor) and CUDA backends.
//!
//! # Architecture
//!
//! ```text
//! Runtime (backend identity)
//! ├── Device (identifies a specific GPU/CPU by ordinal)
//! ├── Kernel (compiled kernel bound to one device)
//! └── CompilationCache (process-wide, keyed per device)
//! ```

mod scope;
mod traits;

pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use scope::{DeviceGuard, current_device_index, using_device};
pub use traits::{ArrayArg, Device, Kernel, KernelArg, Runtime};

/// Drop every compiled kernel held by the built-in runtimes' caches
///
/// Kernels still referenced by callers stay alive until those references drop.
pub fn clear_all_kernel_caches() {
    cpu::CpuRuntime::kernel_cache().clear();
    #[cfg(feature = "cuda")]
    cuda::CudaRuntime::kernel_cache().clear();
}
