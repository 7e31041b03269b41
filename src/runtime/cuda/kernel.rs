//! Launching NVRTC-compiled kernels

use crate::dtype::Scalar;
use crate::error::{Error, Result};
use crate::kernel::MAX_NDIM;
use crate::runtime::{ArrayArg, Kernel, KernelArg};
use cudarc::driver::safe::{CudaFunction, CudaModule, CudaStream, LaunchConfig};
use cudarc::driver::{DeviceRepr, PushKernelArg};
use std::sync::Arc;

/// Threads per block for elementwise launches
pub const BLOCK_SIZE: u32 = 256;

/// Upper bound on blocks; the grid-stride loop covers the rest
const MAX_GRID: u32 = 65535;

/// Host mirror of the device `CArray<T, ndim>` layout
#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct CArrayArg {
    data: u64,
    size: i64,
    shape: [i64; MAX_NDIM],
    strides: [i64; MAX_NDIM],
}

// SAFETY: plain-old-data matching the device struct field for field
unsafe impl DeviceRepr for CArrayArg {}

/// Host mirror of the device `CIndexer<ndim>` layout
#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct CIndexerArg {
    size: i64,
    shape: [i64; MAX_NDIM],
    index: [i64; MAX_NDIM],
}

// SAFETY: plain-old-data matching the device struct field for field
unsafe impl DeviceRepr for CIndexerArg {}

enum Marshalled {
    Array(CArrayArg),
    Indexer(CIndexerArg),
    Scalar(Scalar),
}

/// A kernel loaded into one device's context
pub struct CudaKernel {
    name: String,
    // Keeps the module loaded for as long as the function is reachable
    _module: Arc<CudaModule>,
    function: CudaFunction,
    stream: Arc<CudaStream>,
}

impl CudaKernel {
    pub(super) fn new(
        name: String,
        module: Arc<CudaModule>,
        function: CudaFunction,
        stream: Arc<CudaStream>,
    ) -> Self {
        Self {
            name,
            _module: module,
            function,
            stream,
        }
    }

    fn launch_error(&self, reason: impl Into<String>) -> Error {
        Error::Launch {
            kernel: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn marshal_array(&self, a: &ArrayArg) -> Result<CArrayArg> {
        if a.shape.len() > MAX_NDIM {
            return Err(self.launch_error(format!(
                "array rank {} exceeds the supported maximum of {MAX_NDIM}",
                a.shape.len()
            )));
        }
        let mut arg = CArrayArg {
            data: a.data_ptr(),
            size: a.size() as i64,
            shape: [0; MAX_NDIM],
            strides: [0; MAX_NDIM],
        };
        for (d, (&dim, &stride)) in a.shape.iter().zip(a.strides.iter()).enumerate() {
            arg.shape[d] = dim as i64;
            arg.strides[d] = stride as i64;
        }
        Ok(arg)
    }

    fn marshal(&self, args: &[KernelArg]) -> Result<Vec<Marshalled>> {
        args.iter()
            .map(|arg| {
                Ok(match arg {
                    KernelArg::Array(a) => Marshalled::Array(self.marshal_array(a)?),
                    KernelArg::Scalar(s) => Marshalled::Scalar(*s),
                    KernelArg::Indexer(ind) => {
                        if ind.ndim() > MAX_NDIM {
                            return Err(self.launch_error(format!(
                                "iteration rank {} exceeds the supported maximum of {MAX_NDIM}",
                                ind.ndim()
                            )));
                        }
                        let mut arg = CIndexerArg {
                            size: ind.size() as i64,
                            shape: [0; MAX_NDIM],
                            index: [0; MAX_NDIM],
                        };
                        for (d, &dim) in ind.shape().iter().enumerate() {
                            arg.shape[d] = dim as i64;
                        }
                        Marshalled::Indexer(arg)
                    }
                })
            })
            .collect()
    }
}

impl Kernel for CudaKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn launch(&self, size: usize, args: &[KernelArg]) -> Result<()> {
        let marshalled = self.marshal(args)?;

        let blocks = size.div_ceil(BLOCK_SIZE as usize).min(MAX_GRID as usize) as u32;
        let cfg = LaunchConfig {
            grid_dim: (blocks.max(1), 1, 1),
            block_dim: (BLOCK_SIZE, 1, 1),
            shared_mem_bytes: 0,
        };

        let mut builder = self.stream.launch_builder(&self.function);
        for arg in &marshalled {
            match arg {
                Marshalled::Array(a) => builder.arg(a),
                Marshalled::Indexer(i) => builder.arg(i),
                Marshalled::Scalar(s) => match s {
                    Scalar::Bool(v) => builder.arg(v),
                    Scalar::I8(v) => builder.arg(v),
                    Scalar::I16(v) => builder.arg(v),
                    Scalar::I32(v) => builder.arg(v),
                    Scalar::I64(v) => builder.arg(v),
                    Scalar::U8(v) => builder.arg(v),
                    Scalar::U16(v) => builder.arg(v),
                    Scalar::U32(v) => builder.arg(v),
                    Scalar::U64(v) => builder.arg(v),
                    Scalar::F16(v) => builder.arg(v),
                    Scalar::F32(v) => builder.arg(v),
                    Scalar::F64(v) => builder.arg(v),
                },
            };
        }

        log::trace!(
            "launch '{}' over {size} elements ({} blocks x {BLOCK_SIZE})",
            self.name,
            cfg.grid_dim.0
        );

        // SAFETY: arguments were marshalled in the order and layout the
        // synthesized signature declares, and every array pointer is a live
        // allocation on this device.
        unsafe { builder.launch(cfg) }.map_err(|e| self.launch_error(format!("{e:?}")))?;
        Ok(())
    }
}
