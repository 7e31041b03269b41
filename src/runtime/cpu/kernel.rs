//! Host execution of synthesized kernels
//!
//! The host "loader" cannot run device source. Instead each kernel name is
//! bound to a registered Rust routine that implements the same per-element
//! operation. The launcher walks the iteration space with the same indexer
//! and stride arithmetic the device header uses, and hands the routine a
//! [`HostFrame`] for the current element.

use crate::dtype::{DType, Element, Scalar};
use crate::error::{Error, Result};
use crate::kernel::KernelSource;
use crate::runtime::{ArrayArg, Kernel, KernelArg};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A per-element host routine
pub type HostRoutine = Arc<dyn Fn(&mut HostFrame<'_>) -> Result<()> + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, HostRoutine>> {
    static ROUTINES: OnceLock<RwLock<HashMap<String, HostRoutine>>> = OnceLock::new();
    ROUTINES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Bind a kernel name to the host routine that executes it on the CPU runtime
///
/// The routine is called once per iteration step. Registering a name again
/// replaces the routine for kernels compiled afterwards.
pub fn register_host_routine<F>(kernel_name: impl Into<String>, routine: F)
where
    F: Fn(&mut HostFrame<'_>) -> Result<()> + Send + Sync + 'static,
{
    let name = kernel_name.into();
    if registry().write().insert(name.clone(), Arc::new(routine)).is_some() {
        log::debug!("replaced host routine '{name}'");
    }
}

pub(super) fn lookup_host_routine(name: &str) -> Option<HostRoutine> {
    registry().read().get(name).cloned()
}

/// A kernel bound to a host routine
pub struct HostKernel {
    source: KernelSource,
    routine: HostRoutine,
}

impl HostKernel {
    pub(super) fn new(source: KernelSource, routine: HostRoutine) -> Self {
        Self { source, routine }
    }

    /// The synthesized source this kernel was built from
    pub fn source(&self) -> &KernelSource {
        &self.source
    }
}

impl std::fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostKernel")
            .field("name", &self.source.name)
            .finish()
    }
}

impl Kernel for HostKernel {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn launch(&self, size: usize, args: &[KernelArg]) -> Result<()> {
        let launch_error = |reason: String| Error::Launch {
            kernel: self.source.name.clone(),
            reason,
        };

        let (indexer, params) = match args.split_last() {
            Some((KernelArg::Indexer(indexer), params)) => (indexer, params),
            _ => return Err(launch_error("missing trailing indexer argument".into())),
        };
        if indexer.size() != size {
            return Err(launch_error(format!(
                "launch size {size} does not match indexer size {}",
                indexer.size()
            )));
        }
        for (p, arg) in params.iter().enumerate() {
            if let KernelArg::Array(a) = arg {
                if a.indexed && a.shape.len() != indexer.ndim() {
                    return Err(launch_error(format!(
                        "argument {p} has rank {} but the iteration space has rank {}",
                        a.shape.len(),
                        indexer.ndim()
                    )));
                }
            }
        }

        log::trace!("host launch '{}' over {size} elements", self.source.name);

        let mut idx: SmallVec<[usize; 8]> = SmallVec::from_elem(0, indexer.ndim());
        let mut frame = HostFrame {
            kernel: &self.source.name,
            args: params,
            ptrs: vec![std::ptr::null_mut(); params.len()],
            index: 0,
            size,
        };

        for i in 0..size {
            indexer.unravel(i, &mut idx);
            for (slot, arg) in frame.ptrs.iter_mut().zip(params) {
                if let KernelArg::Array(a) = arg {
                    if a.indexed {
                        *slot = element_ptr(a, &idx);
                    }
                }
            }
            frame.index = i;
            (self.routine)(&mut frame)?;
        }
        Ok(())
    }
}

fn element_ptr(a: &ArrayArg, idx: &[usize]) -> *mut u8 {
    let elem: isize = idx
        .iter()
        .zip(a.strides.iter())
        .map(|(&i, &s)| i as isize * s)
        .sum();
    let byte = (a.offset as isize + elem) * a.dtype.size_in_bytes() as isize;
    (a.ptr as isize + byte) as *mut u8
}

/// Access to the kernel arguments at one iteration step
///
/// Parameters are addressed by their position in the kernel's parameter list
/// (inputs first, then outputs). Non-raw arrays are read and written at the
/// current element; raw arrays are addressed by a flat index over their own
/// shape; scalars are read by value.
pub struct HostFrame<'a> {
    kernel: &'a str,
    args: &'a [KernelArg],
    ptrs: Vec<*mut u8>,
    index: usize,
    size: usize,
}

impl HostFrame<'_> {
    /// Linear iteration index of the current step
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Total number of iteration steps
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of parameters (excluding the indexer)
    #[inline]
    pub fn num_params(&self) -> usize {
        self.args.len()
    }

    fn error(&self, param: usize, reason: impl std::fmt::Display) -> Error {
        Error::Launch {
            kernel: self.kernel.to_string(),
            reason: format!("parameter {param}: {reason}"),
        }
    }

    fn arg(&self, param: usize) -> Result<&KernelArg> {
        self.args
            .get(param)
            .ok_or_else(|| self.error(param, "no such parameter"))
    }

    fn raw_array(&self, param: usize) -> Result<&ArrayArg> {
        match self.arg(param)? {
            KernelArg::Array(a) => Ok(a),
            _ => Err(self.error(param, "not an array")),
        }
    }

    /// Element type of a parameter
    pub fn dtype(&self, param: usize) -> Result<DType> {
        match self.arg(param)? {
            KernelArg::Array(a) => Ok(a.dtype),
            KernelArg::Scalar(s) => Ok(s.dtype()),
            KernelArg::Indexer(_) => Err(self.error(param, "indexer has no dtype")),
        }
    }

    /// Read a scalar parameter or the current element of an array parameter
    pub fn load_scalar(&self, param: usize) -> Result<Scalar> {
        match self.arg(param)? {
            KernelArg::Scalar(s) => Ok(*s),
            KernelArg::Array(a) if a.indexed => {
                // SAFETY: the launcher pointed ptrs[param] at an element of this view
                Ok(unsafe { Scalar::read(self.ptrs[param], a.dtype) })
            }
            KernelArg::Array(_) => Err(self.error(param, "raw array needs a flat index")),
            KernelArg::Indexer(_) => Err(self.error(param, "cannot load the indexer")),
        }
    }

    /// Read a parameter converted to `T` with C conversion rules
    pub fn load<T: Element>(&self, param: usize) -> Result<T> {
        Ok(T::from_scalar(self.load_scalar(param)?))
    }

    /// Write the current element of an array parameter
    ///
    /// The value is converted to the array's dtype.
    pub fn store_scalar(&mut self, param: usize, value: Scalar) -> Result<()> {
        match self.arg(param)? {
            KernelArg::Array(a) if a.indexed => {
                let value = value.cast(a.dtype);
                // SAFETY: the launcher pointed ptrs[param] at an element of this view
                unsafe { value.write(self.ptrs[param]) };
                Ok(())
            }
            KernelArg::Array(_) => Err(self.error(param, "raw array needs a flat index")),
            _ => Err(self.error(param, "only arrays can be stored to")),
        }
    }

    /// Write the current element of an array parameter from a typed value
    pub fn store<T: Element>(&mut self, param: usize, value: T) -> Result<()> {
        self.store_scalar(param, value.into_scalar())
    }

    /// Number of elements of an array parameter
    pub fn raw_len(&self, param: usize) -> Result<usize> {
        Ok(self.raw_array(param)?.size())
    }

    fn raw_ptr(&self, param: usize, flat: usize) -> Result<(*mut u8, DType)> {
        let a = self.raw_array(param)?;
        let len = a.size();
        if flat >= len {
            return Err(self.error(param, format!("index {flat} out of bounds for {len}")));
        }
        let mut idx: SmallVec<[usize; 8]> = SmallVec::from_elem(0, a.shape.len());
        let mut rem = flat;
        for (slot, &dim) in idx.iter_mut().zip(a.shape.iter()).rev() {
            *slot = rem % dim;
            rem /= dim;
        }
        Ok((element_ptr(a, &idx), a.dtype))
    }

    /// Read element `flat` (row-major over the array's own shape)
    pub fn raw_load_scalar(&self, param: usize, flat: usize) -> Result<Scalar> {
        let (ptr, dtype) = self.raw_ptr(param, flat)?;
        // SAFETY: raw_ptr bounds-checked `flat` against the view
        Ok(unsafe { Scalar::read(ptr, dtype) })
    }

    /// Write element `flat` (row-major over the array's own shape)
    pub fn raw_store_scalar(&mut self, param: usize, flat: usize, value: Scalar) -> Result<()> {
        let (ptr, dtype) = self.raw_ptr(param, flat)?;
        // SAFETY: raw_ptr bounds-checked `flat` against the view
        unsafe { value.cast(dtype).write(ptr) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Indexer;

    fn source(name: &str) -> KernelSource {
        KernelSource {
            name: name.to_string(),
            code: String::new(),
            options: Vec::new(),
        }
    }

    fn array(data: &mut [i32], shape: &[usize], strides: &[isize], indexed: bool) -> KernelArg {
        KernelArg::Array(ArrayArg {
            ptr: data.as_mut_ptr() as u64,
            offset: 0,
            dtype: DType::I32,
            shape: shape.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
            indexed,
        })
    }

    #[test]
    fn test_launch_walks_strided_views() {
        register_host_routine("host_kernel_test_double", |f: &mut HostFrame<'_>| {
            let x: i32 = f.load(0)?;
            f.store(1, x * 2)
        });
        let kernel = HostKernel::new(
            source("host_kernel_test_double"),
            lookup_host_routine("host_kernel_test_double").unwrap(),
        );

        // input is a transposed 2x3 view of [0, 1, 2, 3, 4, 5]
        let mut input = [0, 1, 2, 3, 4, 5];
        let mut output = [0; 6];
        let args = vec![
            array(&mut input, &[3, 2], &[1, 3], true),
            array(&mut output, &[3, 2], &[2, 1], true),
            KernelArg::Indexer(Indexer::new(&[3, 2])),
        ];
        kernel.launch(6, &args).unwrap();
        assert_eq!(output, [0, 6, 2, 8, 4, 10]);
    }

    #[test]
    fn test_raw_access_and_bounds() {
        register_host_routine("host_kernel_test_raw", |f: &mut HostFrame<'_>| {
            let n = f.raw_len(0)?;
            let i = f.index();
            let v = f.raw_load_scalar(0, n - 1 - i)?;
            f.store_scalar(1, v)?;
            assert!(f.raw_load_scalar(0, n).is_err());
            Ok(())
        });
        let kernel = HostKernel::new(
            source("host_kernel_test_raw"),
            lookup_host_routine("host_kernel_test_raw").unwrap(),
        );

        let mut input = [1, 2, 3, 4];
        let mut output = [0; 4];
        let args = vec![
            array(&mut input, &[4], &[1], false),
            array(&mut output, &[4], &[1], true),
            KernelArg::Indexer(Indexer::new(&[4])),
        ];
        kernel.launch(4, &args).unwrap();
        assert_eq!(output, [4, 3, 2, 1]);
    }

    #[test]
    fn test_launch_requires_indexer() {
        let noop: HostRoutine = Arc::new(|_: &mut HostFrame<'_>| -> Result<()> { Ok(()) });
        let kernel = HostKernel::new(source("host_kernel_test_noop"), noop);
        let err = kernel.launch(1, &[KernelArg::Scalar(Scalar::I32(1))]).unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));

        let args = vec![KernelArg::Indexer(Indexer::new(&[2]))];
        assert!(kernel.launch(3, &args).is_err());
    }
}
