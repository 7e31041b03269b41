//! Error types for elemwise

use crate::dtype::DType;
use thiserror::Error;

/// Result type alias using elemwise's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while defining or invoking kernels
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed parameter specification text
    #[error("Syntax error in parameter spec '{spec}': {reason}")]
    Syntax {
        /// The offending spec entry
        spec: String,
        /// What is wrong with it
        reason: String,
    },

    /// Argument kind, count, or element type is not acceptable
    #[error("Type error in '{op}': {reason}")]
    Type {
        /// The operation name
        op: String,
        /// Description of the mismatch
        reason: String,
    },

    /// Argument value is not acceptable (sizes, devices, names)
    #[error("Value error in '{op}': {reason}")]
    Value {
        /// The operation name
        op: String,
        /// Description of the problem
        reason: String,
    },

    /// Shapes cannot be broadcast together
    #[error("Cannot broadcast shapes {lhs:?} and {rhs:?}")]
    BroadcastError {
        /// Shape accumulated so far
        lhs: Vec<usize>,
        /// Shape that could not be merged into it
        rhs: Vec<usize>,
    },

    /// Shape mismatch between a buffer and its expected extent
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Element type is not supported by a runtime or operation
    #[error("Unsupported dtype {dtype} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// The native compiler (or host loader) rejected the synthesized kernel
    #[error("Failed to compile kernel '{kernel}':\n{log}")]
    Compile {
        /// Kernel entry point name
        kernel: String,
        /// Compiler diagnostics
        log: String,
    },

    /// Kernel launch failed
    #[error("Failed to launch kernel '{kernel}': {reason}")]
    Launch {
        /// Kernel entry point name
        kernel: String,
        /// Reason reported by the runtime
        reason: String,
    },

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),

    /// CUDA driver error
    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a syntax error for a parameter spec entry
    pub fn syntax(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Syntax {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    /// Create a type error attributed to an operation
    pub fn type_error(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Type {
            op: op.into(),
            reason: reason.into(),
        }
    }

    /// Create a value error attributed to an operation
    pub fn value_error(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Value {
            op: op.into(),
            reason: reason.into(),
        }
    }

    /// Create a broadcast error
    pub fn broadcast(lhs: &[usize], rhs: &[usize]) -> Self {
        Self::BroadcastError {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create a compile error
    pub fn compile(kernel: impl Into<String>, log: impl Into<String>) -> Self {
        Self::Compile {
            kernel: kernel.into(),
            log: log.into(),
        }
    }
}
