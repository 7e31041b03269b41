//! CPU runtime implementation
//!
//! The CPU runtime uses standard heap allocation and serves as the reference
//! executor for synthesized kernels. Device source cannot run on the host, so
//! each kernel name is bound to a Rust routine registered with
//! [`register_host_routine`]; the launcher drives it with the same iteration
//! and stride arithmetic the device kernels use.

mod device;
mod kernel;
mod runtime;

pub use device::CpuDevice;
pub use kernel::{HostFrame, HostKernel, HostRoutine, register_host_routine};
pub use runtime::CpuRuntime;
