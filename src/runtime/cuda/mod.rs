//! CUDA runtime implementation
//!
//! Synthesized kernel source is compiled at run time with NVRTC through
//! `cudarc`, loaded into a per-device context, and launched on that device's
//! stream. Launches are asynchronous; host copies and
//! [`Runtime::synchronize`](crate::runtime::Runtime::synchronize) wait for them.

mod client;
mod device;
mod kernel;
mod runtime;

pub use device::CudaDevice;
pub use kernel::{BLOCK_SIZE, CudaKernel};
pub use runtime::CudaRuntime;
