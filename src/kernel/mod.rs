//! Elementwise kernel specialization and dispatch
//!
//! An operation is described once, as a parameter list plus a per-element
//! body. Each call goes through the same pipeline:
//!
//! ```text
//! args ─► device check ─► broadcast ─► type resolution ─► output allocation
//!      ─► dimension reduction ─► cache lookup (or synthesize + compile) ─► launch
//! ```
//!
//! [`ElementwiseKernel`] resolves generic type tags from its operands;
//! [`UniversalFunction`] instead picks among registered concrete signatures.

mod args;
mod broadcast;
mod cache;
mod codegen;
mod dispatch;
mod elementwise;
mod indexer;
mod param;
mod reduce_dims;
mod types;
mod ufunc;

pub use args::{Arg, ArgInfo, ArgKind};
pub use broadcast::broadcast_shape;
pub use cache::{ArgumentSignature, CacheStats, CompilationCache};
pub use codegen::{KernelSource, KernelTemplate, MAX_NDIM, TypedefStyle, synthesize};
pub use elementwise::{CallOptions, ElementwiseKernel, KernelOptions, Outputs};
pub use indexer::Indexer;
pub use param::{INDEXER_KEYWORD, ParamInfo, ParamKind, parse_params};
pub use reduce_dims::reduce_dims;
pub use types::TypeSignature;
pub use ufunc::{UfuncOp, UfuncSpec, UniversalFunction, create_ufunc};
