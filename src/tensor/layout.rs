//! Layout: shape, strides, and offset describing a strided view

use smallvec::SmallVec;
use std::fmt;

/// Most arrays have 4 or fewer dimensions, so we stack-allocate up to 4
const STACK_DIMS: usize = 4;

/// Shape type: extent of each axis
pub type Shape = SmallVec<[usize; STACK_DIMS]>;

/// Strides type: element offsets between consecutive elements along each axis
///
/// Strides are in ELEMENTS, not bytes. A stride of 0 replicates one element
/// along an axis (broadcasting).
pub type Strides = SmallVec<[isize; STACK_DIMS]>;

/// Layout describes how an array view maps indices to storage elements
///
/// Address of element at indices [i0, i1, ..., in]:
///   offset + i0 * strides[0] + i1 * strides[1] + ... + in * strides[n]
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Shape,
    strides: Strides,
    /// Starting element index in the underlying storage
    offset: usize,
}

impl Layout {
    /// Create a new contiguous (row-major) layout from a shape
    ///
    /// # Example
    /// ```
    /// use elemwise::tensor::Layout;
    /// let layout = Layout::contiguous(&[2, 3, 4]);
    /// assert_eq!(layout.shape(), &[2, 3, 4]);
    /// assert_eq!(layout.strides(), &[12, 4, 1]);
    /// ```
    pub fn contiguous(shape: &[usize]) -> Self {
        let shape: Shape = shape.iter().copied().collect();
        let strides = contiguous_strides(&shape);
        Self {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Create a layout with explicit shape, strides, and offset
    pub fn new(shape: Shape, strides: Strides, offset: usize) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        Self {
            shape,
            strides,
            offset,
        }
    }

    /// Create a 0-dimensional layout
    pub fn scalar() -> Self {
        Self {
            shape: SmallVec::new(),
            strides: SmallVec::new(),
            offset: 0,
        }
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the strides
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Get the offset
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of dimensions (rank)
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    #[inline]
    pub fn elem_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if the layout is 0-dimensional
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Check if memory is contiguous (row-major order, zero offset)
    ///
    /// Strides of axes with extent 1 are ignored.
    pub fn is_contiguous(&self) -> bool {
        if self.offset != 0 {
            return false;
        }
        let expected = contiguous_strides(&self.shape);
        self.shape
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&dim, (&s, &e))| dim == 1 || s == e)
    }

    /// Normalize an axis index (negative counts from the end)
    pub fn normalize_dim(&self, d: isize) -> Option<usize> {
        let ndim = self.ndim() as isize;
        let idx = if d < 0 { ndim + d } else { d };
        if idx >= 0 && idx < ndim {
            Some(idx as usize)
        } else {
            None
        }
    }

    /// Compute the storage element index for the given indices
    pub fn index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.ndim() {
            return None;
        }
        if indices.iter().zip(self.shape.iter()).any(|(i, d)| i >= d) {
            return None;
        }

        let mut linear = self.offset as isize;
        for (&idx, &stride) in indices.iter().zip(self.strides.iter()) {
            linear += idx as isize * stride;
        }
        Some(linear as usize)
    }

    /// Create a transposed layout (swap two axes)
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Option<Self> {
        let d0 = self.normalize_dim(dim0)?;
        let d1 = self.normalize_dim(dim1)?;

        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape.swap(d0, d1);
        strides.swap(d0, d1);

        Some(Self::new(shape, strides, self.offset))
    }

    /// Restrict one axis to `start..start + length`
    pub fn narrow(&self, dim: usize, start: usize, length: usize) -> Option<Self> {
        let extent = *self.shape.get(dim)?;
        if start.checked_add(length)? > extent {
            return None;
        }

        let mut shape = self.shape.clone();
        shape[dim] = length;
        let offset = self.offset as isize + start as isize * self.strides[dim];

        Some(Self::new(shape, self.strides.clone(), offset as usize))
    }

    /// Create a reshaped layout (if contiguous)
    ///
    /// Returns None if the layout is not contiguous or element counts differ
    pub fn reshape(&self, new_shape: &[usize]) -> Option<Self> {
        if !self.is_contiguous() {
            return None;
        }
        let new_count: usize = new_shape.iter().product();
        if new_count != self.elem_count() {
            return None;
        }
        Some(Self::contiguous(new_shape))
    }

    /// Create a broadcast layout with the target shape
    ///
    /// Leading axes are added and extent-1 axes are replicated with stride 0.
    /// Returns None if the shapes are not broadcastable.
    pub fn broadcast_to(&self, target: &[usize]) -> Option<Self> {
        if target.len() < self.ndim() {
            return None;
        }

        let mut shape = Shape::with_capacity(target.len());
        let mut strides = Strides::with_capacity(target.len());

        let pad = target.len() - self.ndim();
        for &t in &target[..pad] {
            shape.push(t);
            strides.push(0);
        }

        for ((&s, &st), &t) in self
            .shape
            .iter()
            .zip(self.strides.iter())
            .zip(&target[pad..])
        {
            if s == t {
                shape.push(t);
                strides.push(st);
            } else if s == 1 {
                shape.push(t);
                strides.push(0);
            } else {
                return None;
            }
        }

        Some(Self::new(shape, strides, self.offset))
    }
}

fn contiguous_strides(shape: &[usize]) -> Strides {
    let mut strides: Strides = SmallVec::with_capacity(shape.len());
    let mut stride = 1isize;
    for &dim in shape.iter().rev() {
        strides.push(stride);
        stride *= dim.max(1) as isize;
    }
    strides.reverse();
    strides
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layout {{ shape: {:?}, strides: {:?}, offset: {} }}",
            self.shape.as_slice(),
            self.strides.as_slice(),
            self.offset
        )
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.shape.as_slice())
    }
}

/// Compute the broadcast shape of two shapes (right-aligned)
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Shape> {
    let max_ndim = a.len().max(b.len());
    let mut result = Shape::with_capacity(max_ndim);

    for i in 0..max_ndim {
        let a_dim = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let b_dim = if i < b.len() { b[b.len() - 1 - i] } else { 1 };

        if a_dim == b_dim || b_dim == 1 {
            result.push(a_dim);
        } else if a_dim == 1 {
            result.push(b_dim);
        } else {
            return None;
        }
    }

    result.reverse();
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_layout() {
        let layout = Layout::contiguous(&[2, 3, 4]);
        assert_eq!(layout.shape(), &[2, 3, 4]);
        assert_eq!(layout.strides(), &[12, 4, 1]);
        assert_eq!(layout.elem_count(), 24);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn test_scalar_layout() {
        let layout = Layout::scalar();
        assert!(layout.is_scalar());
        assert_eq!(layout.elem_count(), 1);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn test_transpose() {
        let layout = Layout::contiguous(&[2, 3, 4]);
        let transposed = layout.transpose(-1, -2).unwrap();
        assert_eq!(transposed.shape(), &[2, 4, 3]);
        assert_eq!(transposed.strides(), &[12, 1, 4]);
        assert!(!transposed.is_contiguous());
    }

    #[test]
    fn test_narrow() {
        let layout = Layout::contiguous(&[4, 5]);
        let narrowed = layout.narrow(1, 1, 3).unwrap();
        assert_eq!(narrowed.shape(), &[4, 3]);
        assert_eq!(narrowed.strides(), &[5, 1]);
        assert_eq!(narrowed.offset(), 1);
        assert!(!narrowed.is_contiguous());
        assert!(layout.narrow(1, 3, 3).is_none());
    }

    #[test]
    fn test_reshape() {
        let layout = Layout::contiguous(&[2, 3, 4]);
        let reshaped = layout.reshape(&[6, 4]).unwrap();
        assert_eq!(reshaped.shape(), &[6, 4]);
        assert!(layout.transpose(0, 1).unwrap().reshape(&[24]).is_none());
    }

    #[test]
    fn test_broadcast_to() {
        let layout = Layout::contiguous(&[3, 1]);
        let b = layout.broadcast_to(&[2, 3, 4]).unwrap();
        assert_eq!(b.shape(), &[2, 3, 4]);
        assert_eq!(b.strides(), &[0, 1, 0]);
        assert!(layout.broadcast_to(&[3, 2, 4]).is_none());
    }

    #[test]
    fn test_broadcast_shapes() {
        assert_eq!(
            broadcast_shapes(&[3, 1], &[1, 4]),
            Some(SmallVec::from_slice(&[3, 4]))
        );
        assert_eq!(
            broadcast_shapes(&[2, 3, 4], &[4]),
            Some(SmallVec::from_slice(&[2, 3, 4]))
        );
        assert_eq!(broadcast_shapes(&[2, 3], &[4]), None);
    }

    #[test]
    fn test_index() {
        let layout = Layout::contiguous(&[2, 3]);
        assert_eq!(layout.index(&[0, 2]), Some(2));
        assert_eq!(layout.index(&[1, 0]), Some(3));
        assert_eq!(layout.index(&[2, 0]), None);
    }
}
