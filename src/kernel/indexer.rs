//! Iteration-space indexer passed as the trailing kernel argument

use crate::tensor::Shape;

/// Maps linear iteration steps to multi-indices over a shape
///
/// On the device the synthesized `CIndexer<ndim>` performs the same
/// row-major unravelling; this host-side value carries the shape across the
/// launch boundary and drives the CPU executor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Indexer {
    shape: Shape,
}

impl Indexer {
    /// Create an indexer over `shape`
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.iter().copied().collect(),
        }
    }

    /// Iteration shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Rank of the iteration space
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of iteration steps
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Write the row-major multi-index of step `i` into `idx`
    ///
    /// `idx` must have length `ndim()`.
    pub fn unravel(&self, mut i: usize, idx: &mut [usize]) {
        debug_assert_eq!(idx.len(), self.shape.len());
        for (slot, &dim) in idx.iter_mut().zip(self.shape.iter()).rev() {
            if dim == 0 {
                *slot = 0;
                continue;
            }
            *slot = i % dim;
            i /= dim;
        }
    }

    /// Element offset of step `i` for a view with the given strides
    pub fn offset_of(&self, mut i: usize, strides: &[isize]) -> isize {
        debug_assert_eq!(strides.len(), self.shape.len());
        let mut offset = 0isize;
        for (&dim, &stride) in self.shape.iter().zip(strides.iter()).rev() {
            if dim == 0 {
                continue;
            }
            offset += (i % dim) as isize * stride;
            i /= dim;
        }
        offset
    }
}
