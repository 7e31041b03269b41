//! CPU device implementation

use crate::runtime::Device;

/// A logical host device
///
/// All CPU devices share host memory; the ordinal keeps device checks and
/// per-device kernel caches observable on machines without accelerators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuDevice {
    id: usize,
}

impl CpuDevice {
    /// Create the default CPU device (ordinal 0)
    pub fn new() -> Self {
        Self { id: 0 }
    }

    /// Create a logical CPU device with the given ordinal
    pub fn with_index(id: usize) -> Self {
        Self { id }
    }
}

impl Device for CpuDevice {
    fn id(&self) -> usize {
        self.id
    }

    fn name(&self) -> String {
        format!("cpu:{}", self.id)
    }
}
