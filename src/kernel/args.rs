//! Call arguments and their signature-relevant summary

use crate::dtype::{DType, Element, Scalar};
use crate::error::{Error, Result};
use crate::runtime::{Device, Runtime};
use crate::tensor::Array;

/// A value passed to a kernel invocation
pub enum Arg<R: Runtime> {
    /// Device array
    Array(Array<R>),
    /// Host scalar passed by value
    Scalar(Scalar),
    /// A value of a kind kernels cannot take; rejected with a type error
    Unsupported(&'static str),
}

impl<R: Runtime> Arg<R> {
    /// Element type of an array or scalar argument
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Self::Array(a) => Some(a.dtype()),
            Self::Scalar(s) => Some(s.dtype()),
            Self::Unsupported(_) => None,
        }
    }

    /// The array, if this argument is one
    pub fn as_array(&self) -> Option<&Array<R>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl<R: Runtime> Clone for Arg<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Array(a) => Self::Array(a.clone()),
            Self::Scalar(s) => Self::Scalar(*s),
            Self::Unsupported(kind) => Self::Unsupported(kind),
        }
    }
}

impl<R: Runtime> std::fmt::Debug for Arg<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Array(a) => write!(f, "{a:?}"),
            Self::Scalar(s) => write!(f, "Scalar({s:?})"),
            Self::Unsupported(kind) => write!(f, "Unsupported({kind})"),
        }
    }
}

impl<R: Runtime> From<Array<R>> for Arg<R> {
    fn from(a: Array<R>) -> Self {
        Self::Array(a)
    }
}

impl<R: Runtime> From<&Array<R>> for Arg<R> {
    fn from(a: &Array<R>) -> Self {
        Self::Array(a.clone())
    }
}

impl<R: Runtime> From<Scalar> for Arg<R> {
    fn from(s: Scalar) -> Self {
        Self::Scalar(s)
    }
}

impl<R: Runtime> From<bool> for Arg<R> {
    fn from(v: bool) -> Self {
        Self::Scalar(Scalar::Bool(v))
    }
}

impl<R: Runtime> From<&str> for Arg<R> {
    fn from(_: &str) -> Self {
        Self::Unsupported("str")
    }
}

macro_rules! impl_arg_from_element {
    ($($t:ty),*) => {
        $(
            impl<R: Runtime> From<$t> for Arg<R> {
                fn from(v: $t) -> Self {
                    Self::Scalar(v.into_scalar())
                }
            }
        )*
    };
}

impl_arg_from_element!(i8, i16, i32, i64, u8, u16, u32, u64, half::f16, f32, f64);

/// Kind of a marshalled argument
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Array view
    Array,
    /// By-value scalar
    Scalar,
    /// Iteration indexer
    Indexer,
}

/// Per-argument part of a kernel cache key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArgInfo {
    /// Argument kind
    pub kind: ArgKind,
    /// Element type (None for the indexer)
    pub dtype: Option<DType>,
    /// Rank of the array or iteration space (0 for scalars)
    pub ndim: usize,
}

impl ArgInfo {
    /// Summary of an array of the given type and rank
    pub fn array(dtype: DType, ndim: usize) -> Self {
        Self {
            kind: ArgKind::Array,
            dtype: Some(dtype),
            ndim,
        }
    }

    /// Summary of a scalar of the given type
    pub fn scalar(dtype: DType) -> Self {
        Self {
            kind: ArgKind::Scalar,
            dtype: Some(dtype),
            ndim: 0,
        }
    }

    /// Summary of the indexer over an iteration space of rank `ndim`
    pub fn indexer(ndim: usize) -> Self {
        Self {
            kind: ArgKind::Indexer,
            dtype: None,
            ndim,
        }
    }
}

/// Reject unsupported argument kinds and arrays on a device other than `device`
pub(crate) fn check_args<R: Runtime>(op: &str, args: &[Arg<R>], device: &R::Device) -> Result<()> {
    for arg in args {
        match arg {
            Arg::Array(a) if !a.device().is_same(device) => {
                return Err(Error::value_error(
                    op,
                    format!(
                        "array device must be same as the current device: \
                         array device = {} while current = {}",
                        a.device().id(),
                        device.id()
                    ),
                ));
            }
            Arg::Unsupported(kind) => {
                return Err(Error::type_error(op, format!("unsupported type {kind}")));
            }
            _ => {}
        }
    }
    Ok(())
}
