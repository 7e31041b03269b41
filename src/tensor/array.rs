//! Core Array type

use super::{Layout, Storage};
use crate::dtype::{DType, Element, Scalar};
use crate::error::{Error, Result};
use crate::kernel::Indexer;
use crate::runtime::{Device, Runtime};
use std::fmt;

/// N-dimensional strided array stored on a compute device
///
/// `Array` consists of:
/// - **Storage**: Reference-counted device memory
/// - **Layout**: Shape, element strides, and offset defining the view into storage
///
/// # Zero-Copy Views
///
/// `transpose`, `narrow`, `broadcast_to`, `reshape` and `with_layout` create
/// arrays that share the same underlying storage. Kernels write through such
/// views, so a preallocated output can be any non-overlapping view.
///
/// # Example
///
/// ```ignore
/// use elemwise::prelude::*;
///
/// let device = CpuDevice::new();
/// let a = Array::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &device)?;
/// let b = a.transpose(-1, -2)?; // shares storage with a
/// ```
pub struct Array<R: Runtime> {
    storage: Storage<R>,
    layout: Layout,
}

impl<R: Runtime> Array<R> {
    /// Create an array from storage and layout
    pub fn from_parts(storage: Storage<R>, layout: Layout) -> Self {
        Self { storage, layout }
    }

    /// Create an array from a slice of host data
    ///
    /// Returns an error if `data.len()` does not equal the product of `shape`,
    /// or if memory allocation fails.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize], device: &R::Device) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::shape_mismatch(shape, &[data.len()]));
        }

        let storage = Storage::from_slice(data, device)?;
        Ok(Self::from_parts(storage, Layout::contiguous(shape)))
    }

    /// Create a bool array from host booleans
    pub fn from_bools(data: &[bool], shape: &[usize], device: &R::Device) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::shape_mismatch(shape, &[data.len()]));
        }

        let bytes: Vec<u8> = data.iter().map(|&b| b as u8).collect();
        let storage = Storage::from_bytes(&bytes, DType::Bool, device)?;
        Ok(Self::from_parts(storage, Layout::contiguous(shape)))
    }

    /// Create a 0-dimensional array holding one scalar
    pub fn from_scalar(value: Scalar, device: &R::Device) -> Result<Self> {
        let dtype = value.dtype();
        let mut bytes = vec![0u8; dtype.size_in_bytes()];
        // SAFETY: the buffer is exactly one element of `dtype`
        unsafe { value.write(bytes.as_mut_ptr()) };
        let storage = Storage::from_bytes(&bytes, dtype, device)?;
        Ok(Self::from_parts(storage, Layout::scalar()))
    }

    /// Allocate a contiguous zero-filled array
    pub fn empty(shape: &[usize], dtype: DType, device: &R::Device) -> Result<Self> {
        let len: usize = shape.iter().product();
        let storage = Storage::new(len, dtype, device)?;
        Ok(Self::from_parts(storage, Layout::contiguous(shape)))
    }

    // ===== Accessors =====

    /// Get the underlying storage
    #[inline]
    pub fn storage(&self) -> &Storage<R> {
        &self.storage
    }

    /// Get the layout
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Get the strides (in elements)
    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Total number of elements in the view
    #[inline]
    pub fn numel(&self) -> usize {
        self.layout.elem_count()
    }

    /// Get the element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Get the device
    #[inline]
    pub fn device(&self) -> &R::Device {
        self.storage.device()
    }

    /// Check if the view is contiguous
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    // ===== Views =====

    /// Swap two axes (zero-copy)
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Result<Self> {
        let layout = self.layout.transpose(dim0, dim1).ok_or_else(|| {
            Error::value_error(
                "transpose",
                format!("axes ({dim0}, {dim1}) out of range for rank {}", self.ndim()),
            )
        })?;
        Ok(self.share(layout))
    }

    /// Narrow an axis to `start..start + length` (zero-copy)
    pub fn narrow(&self, dim: isize, start: usize, length: usize) -> Result<Self> {
        let axis = self.layout.normalize_dim(dim).ok_or_else(|| {
            Error::value_error(
                "narrow",
                format!("axis {dim} out of range for rank {}", self.ndim()),
            )
        })?;
        let layout = self
            .layout
            .narrow(axis, start, length)
            .ok_or_else(|| Error::shape_mismatch(&[self.shape()[axis]], &[start, length]))?;
        Ok(self.share(layout))
    }

    /// Broadcast to a target shape (zero-copy, stride 0 on replicated axes)
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self> {
        let layout = self
            .layout
            .broadcast_to(shape)
            .ok_or_else(|| Error::broadcast(self.shape(), shape))?;
        Ok(self.share(layout))
    }

    /// Reshape a contiguous array (zero-copy)
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        let layout = self
            .layout
            .reshape(shape)
            .ok_or_else(|| Error::shape_mismatch(shape, self.shape()))?;
        Ok(self.share(layout))
    }

    /// Re-view the same storage with an explicit layout
    ///
    /// Every element reachable through `layout` must lie inside the storage.
    pub fn with_layout(&self, layout: Layout) -> Result<Self> {
        if layout.elem_count() > 0 {
            let (lo, hi) = element_span(&layout);
            if lo < 0 || hi >= self.storage.len() as isize {
                return Err(Error::value_error(
                    "with_layout",
                    format!(
                        "{layout:?} reaches elements {lo}..={hi} of a buffer of {}",
                        self.storage.len()
                    ),
                ));
            }
        }
        Ok(self.share(layout))
    }

    fn share(&self, layout: Layout) -> Self {
        Self {
            storage: self.storage.clone(),
            layout,
        }
    }

    // ===== Data Access =====

    /// Copy the viewed elements to host memory in row-major order
    ///
    /// `T` must match the array's dtype exactly.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype() {
            return Err(Error::type_error(
                "to_vec",
                format!("array has dtype {} but {} was requested", self.dtype(), T::DTYPE),
            ));
        }
        self.gather(|bytes| bytemuck::pod_read_unaligned::<T>(bytes))
    }

    /// Copy a bool array to host memory in row-major order
    pub fn to_bools(&self) -> Result<Vec<bool>> {
        if self.dtype() != DType::Bool {
            return Err(Error::type_error(
                "to_bools",
                format!("array has dtype {}", self.dtype()),
            ));
        }
        self.gather(|bytes| bytes[0] != 0)
    }

    /// Copy the viewed elements to host memory as typed scalars
    pub fn to_scalars(&self) -> Result<Vec<Scalar>> {
        let dtype = self.dtype();
        // SAFETY: gather hands out exactly one element's bytes
        self.gather(|bytes| unsafe { Scalar::read(bytes.as_ptr(), dtype) })
    }

    fn gather<T>(&self, read: impl Fn(&[u8]) -> T) -> Result<Vec<T>> {
        let numel = self.numel();
        if numel == 0 {
            return Ok(Vec::new());
        }

        R::synchronize(self.device())?;
        let bytes = self.storage.to_bytes()?;
        let elem = self.dtype().size_in_bytes();
        let indexer = Indexer::new(self.shape());
        let base = self.layout.offset() as isize;

        (0..numel)
            .map(|i| {
                let start = (base + indexer.offset_of(i, self.strides())) as usize * elem;
                bytes
                    .get(start..start + elem)
                    .map(&read)
                    .ok_or_else(|| Error::Internal(format!("element {i} lies outside storage")))
            })
            .collect()
    }
}

/// Lowest and highest storage element reachable through a non-empty layout
fn element_span(layout: &Layout) -> (isize, isize) {
    let mut lo = layout.offset() as isize;
    let mut hi = lo;
    for (&dim, &stride) in layout.shape().iter().zip(layout.strides()) {
        let reach = (dim as isize - 1) * stride;
        if reach < 0 {
            lo += reach;
        } else {
            hi += reach;
        }
    }
    (lo, hi)
}

impl<R: Runtime> Clone for Array<R> {
    /// Clone creates a new array sharing the same storage (zero-copy)
    fn clone(&self) -> Self {
        self.share(self.layout.clone())
    }
}

impl<R: Runtime> fmt::Debug for Array<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("shape", &self.shape())
            .field("strides", &self.strides())
            .field("dtype", &self.dtype())
            .field("device", &self.device().id())
            .finish()
    }
}

impl<R: Runtime> fmt::Display for Array<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({:?}, dtype={})", self.shape(), self.dtype())
    }
}
