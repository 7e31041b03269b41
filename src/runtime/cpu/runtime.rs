//! CPU runtime implementation

use super::device::CpuDevice;
use super::kernel::{HostKernel, lookup_host_routine};
use crate::error::{Error, Result};
use crate::kernel::{CompilationCache, KernelSource};
use crate::runtime::Runtime;
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
use std::sync::OnceLock;

const ALIGN: usize = 64;

/// CPU compute runtime
///
/// Memory is allocated on the heap using the system allocator. Kernels are
/// "loaded" by binding the synthesized source to a registered host routine
/// (see [`register_host_routine`](super::register_host_routine)).
#[derive(Clone, Debug, Default)]
pub struct CpuRuntime;

impl Runtime for CpuRuntime {
    type Device = CpuDevice;
    type Kernel = HostKernel;

    fn name() -> &'static str {
        "cpu"
    }

    fn device(index: usize) -> Result<Self::Device> {
        Ok(CpuDevice::with_index(index))
    }

    fn allocate(size_bytes: usize, _device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let layout = AllocLayout::from_size_align(size_bytes, ALIGN)
            .map_err(|_| Error::OutOfMemory { size: size_bytes })?;

        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };

        if ptr.is_null() {
            return Err(Error::OutOfMemory { size: size_bytes });
        }

        Ok(ptr as u64)
    }

    fn deallocate(ptr: u64, size_bytes: usize, _device: &Self::Device) {
        if ptr == 0 || size_bytes == 0 {
            return;
        }

        // Same layout that allocate() accepted for this size
        if let Ok(layout) = AllocLayout::from_size_align(size_bytes, ALIGN) {
            unsafe {
                dealloc(ptr as *mut u8, layout);
            }
        }
    }

    fn copy_to_device(src: &[u8], dst: u64, _device: &Self::Device) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }

        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }

    fn copy_from_device(src: u64, dst: &mut [u8], _device: &Self::Device) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }

        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn synchronize(_device: &Self::Device) -> Result<()> {
        // Host launches complete before returning
        Ok(())
    }

    fn compile(source: &KernelSource, device: &Self::Device) -> Result<Self::Kernel> {
        let routine = lookup_host_routine(&source.name).ok_or_else(|| {
            Error::compile(
                &source.name,
                format!("no host routine registered for kernel '{}'", source.name),
            )
        })?;
        log::debug!("bound host routine '{}' on {:?}", source.name, device);
        Ok(HostKernel::new(source.clone(), routine))
    }

    fn kernel_cache() -> &'static CompilationCache<Self> {
        static CACHE: OnceLock<CompilationCache<CpuRuntime>> = OnceLock::new();
        CACHE.get_or_init(CompilationCache::new)
    }
}
