//! Array types and memory layout
//!
//! This module provides the `Array` type, an n-dimensional strided view over
//! reference-counted storage on a compute device (CPU, GPU).

mod array;
mod layout;
mod storage;

pub use array::Array;
pub use layout::{Layout, Shape, Strides, broadcast_shapes};
pub use storage::Storage;
