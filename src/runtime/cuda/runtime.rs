//! CUDA runtime implementation

use super::client::{cached_client, client_for};
use super::device::CudaDevice;
use super::kernel::CudaKernel;
use crate::error::{Error, Result};
use crate::kernel::{CompilationCache, KernelSource};
use crate::runtime::Runtime;
use cudarc::driver::safe::CudaContext;
use cudarc::driver::sys::{self, CUresult};
use cudarc::nvrtc::{CompileOptions, compile_ptx_with_opts};
use std::sync::OnceLock;

/// CUDA Runtime adapter
///
/// Kernels are compiled from synthesized source with NVRTC and loaded into
/// the device's context; launches are queued on a per-device stream.
#[derive(Clone, Debug, Default)]
pub struct CudaRuntime;

impl Runtime for CudaRuntime {
    type Device = CudaDevice;
    type Kernel = CudaKernel;

    fn name() -> &'static str {
        "cuda"
    }

    fn device(index: usize) -> Result<Self::Device> {
        let count = CudaContext::device_count()? as usize;
        if index >= count {
            return Err(Error::value_error(
                "device",
                format!("CUDA device {index} requested but {count} are available"),
            ));
        }
        Ok(CudaDevice::new(index))
    }

    /// Allocate zeroed GPU memory on the device's stream.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let client = client_for(device)?;
        let stream = client.stream.cu_stream();

        unsafe {
            let mut ptr: u64 = 0;
            let mut result = sys::cuMemAllocAsync(&mut ptr, size_bytes, stream);

            if result != CUresult::CUDA_SUCCESS {
                // Flush pending stream-ordered frees and retry once
                let _ = client.stream.synchronize();
                result = sys::cuMemAllocAsync(&mut ptr, size_bytes, stream);
            }
            if result != CUresult::CUDA_SUCCESS {
                return Err(Error::OutOfMemory { size: size_bytes });
            }

            let result = sys::cuMemsetD8Async(ptr, 0, size_bytes, stream);
            if result != CUresult::CUDA_SUCCESS {
                sys::cuMemFreeAsync(ptr, stream);
                return Err(Error::Backend(format!(
                    "CUDA memset of {size_bytes} bytes failed ({result:?})"
                )));
            }
            Ok(ptr)
        }
    }

    fn deallocate(ptr: u64, _size_bytes: usize, device: &Self::Device) {
        if ptr == 0 {
            return;
        }

        // Without a cached client the context is gone and the driver reclaimed the memory
        let Some(client) = cached_client(device.index) else {
            return;
        };
        if client.context.bind_to_thread().is_err() {
            return;
        }

        let result = unsafe { sys::cuMemFreeAsync(ptr, client.stream.cu_stream()) };
        if result != CUresult::CUDA_SUCCESS {
            log::warn!("cuMemFreeAsync failed for ptr 0x{ptr:x}: {result:?}");
        }
    }

    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }

        let client = client_for(device)?;

        unsafe {
            let result = sys::cuMemcpyHtoDAsync_v2(
                dst,
                src.as_ptr() as *const std::ffi::c_void,
                src.len(),
                client.stream.cu_stream(),
            );

            if result != CUresult::CUDA_SUCCESS {
                return Err(Error::Backend(format!(
                    "CUDA host-to-device copy failed: {} bytes ({result:?})",
                    src.len()
                )));
            }
        }

        // The host buffer may be freed as soon as we return
        client.stream.synchronize()?;
        Ok(())
    }

    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }

        let client = client_for(device)?;

        unsafe {
            let result = sys::cuMemcpyDtoHAsync_v2(
                dst.as_mut_ptr() as *mut std::ffi::c_void,
                src,
                dst.len(),
                client.stream.cu_stream(),
            );

            if result != CUresult::CUDA_SUCCESS {
                return Err(Error::Backend(format!(
                    "CUDA device-to-host copy failed: {} bytes ({result:?})",
                    dst.len()
                )));
            }
        }

        client.stream.synchronize()?;
        Ok(())
    }

    fn synchronize(device: &Self::Device) -> Result<()> {
        client_for(device)?.stream.synchronize()?;
        Ok(())
    }

    fn compile(source: &KernelSource, device: &Self::Device) -> Result<Self::Kernel> {
        let client = client_for(device)?;

        let opts = CompileOptions {
            options: source.options.clone(),
            ..Default::default()
        };
        let ptx = compile_ptx_with_opts(&source.code, opts)
            .map_err(|e| Error::compile(&source.name, e.to_string()))?;

        let module = client.context.load_module(ptx)?;
        let function = module.load_function(&source.name)?;
        log::debug!("loaded kernel '{}' on cuda:{}", source.name, device.index);

        Ok(CudaKernel::new(
            source.name.clone(),
            module,
            function,
            client.stream.clone(),
        ))
    }

    fn kernel_cache() -> &'static CompilationCache<Self> {
        static CACHE: OnceLock<CompilationCache<CudaRuntime>> = OnceLock::new();
        CACHE.get_or_init(CompilationCache::new)
    }
}
