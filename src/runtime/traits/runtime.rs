//! Core trait for compute backends

use crate::error::Result;
use crate::kernel::{CompilationCache, KernelSource};

/// Core trait for compute backends
///
/// `Runtime` abstracts over different compute devices (CPU, GPU).
/// It uses static dispatch via generics for zero-cost abstraction.
///
/// # Associated Types
///
/// - `Device`: Identifies a specific compute unit (e.g., GPU 0, GPU 1)
/// - `Kernel`: A compiled kernel loaded on one device
///
/// # Example
///
/// ```ignore
/// let device = CpuRuntime::current_device()?;
/// let ptr = CpuRuntime::allocate(1024, &device)?;
/// // ... use memory ...
/// CpuRuntime::deallocate(ptr, 1024, &device);
/// ```
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: super::Device;

    /// Compiled kernel type
    type Kernel: super::Kernel;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Get the device with the given ordinal
    fn device(index: usize) -> Result<Self::Device>;

    /// Get the calling thread's current device
    fn current_device() -> Result<Self::Device> {
        Self::device(crate::runtime::current_device_index())
    }

    /// Allocate zero-initialized device memory
    ///
    /// Returns a device pointer (u64), 0 for empty allocations.
    /// Returns `Err(OutOfMemory)` if allocation fails.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64>;

    /// Deallocate device memory
    fn deallocate(ptr: u64, size_bytes: usize, device: &Self::Device);

    /// Copy data from host to device
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()>;

    /// Copy data from device to host
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()>;

    /// Block until all launched work on `device` has finished
    fn synchronize(device: &Self::Device) -> Result<()>;

    /// Compile synthesized kernel source and load it on `device`
    fn compile(source: &KernelSource, device: &Self::Device) -> Result<Self::Kernel>;

    /// Process-wide compiled kernel cache for this runtime
    fn kernel_cache() -> &'static CompilationCache<Self>;
}
