//! CUDA device implementation

use crate::runtime::Device;

/// A CUDA GPU addressed by ordinal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CudaDevice {
    /// Index of the GPU device (0, 1, 2, ...)
    pub(crate) index: usize,
}

impl CudaDevice {
    /// Create a handle for the GPU with the given ordinal
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl Device for CudaDevice {
    fn id(&self) -> usize {
        self.index
    }

    fn name(&self) -> String {
        format!("cuda:{}", self.index)
    }
}
