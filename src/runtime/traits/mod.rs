//! Runtime traits for compute backend abstraction

pub mod device;
pub mod kernel;
pub mod runtime;

pub use device::Device;
pub use kernel::{ArrayArg, Kernel, KernelArg};
pub use runtime::Runtime;
