//! Compiled kernels and their launch arguments

use crate::dtype::{DType, Scalar};
use crate::error::Result;
use crate::kernel::Indexer;
use crate::tensor::{Shape, Strides};

/// A compiled, launchable kernel bound to one device
pub trait Kernel: Send + Sync + 'static {
    /// Entry point name
    fn name(&self) -> &str;

    /// Run the kernel over `size` iteration steps
    ///
    /// `args` follow the kernel's parameter order with the indexer last.
    /// Launches may be asynchronous; see [`Runtime::synchronize`](super::Runtime::synchronize).
    fn launch(&self, size: usize, args: &[KernelArg]) -> Result<()>;
}

/// A strided array as seen by a kernel
#[derive(Clone, Debug)]
pub struct ArrayArg {
    /// Base pointer of the storage buffer
    pub ptr: u64,
    /// Element offset of the view's first element
    pub offset: usize,
    /// Element type
    pub dtype: DType,
    /// Extents (the reduced iteration shape for indexed arrays)
    pub shape: Shape,
    /// Element strides matching `shape`
    pub strides: Strides,
    /// Whether the kernel dereferences this array at the iteration index
    /// (false for `raw` parameters)
    pub indexed: bool,
}

impl ArrayArg {
    /// Address of the view's first element
    #[inline]
    pub fn data_ptr(&self) -> u64 {
        self.ptr + (self.offset * self.dtype.size_in_bytes()) as u64
    }

    /// Number of elements in the view
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }
}

/// One marshalled kernel argument
#[derive(Clone, Debug)]
pub enum KernelArg {
    /// Array view
    Array(ArrayArg),
    /// By-value scalar, already converted to the parameter's type
    Scalar(Scalar),
    /// Iteration indexer (always the trailing argument)
    Indexer(Indexer),
}
