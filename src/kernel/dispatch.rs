//! Output preparation and kernel launch shared by both operation kinds

use super::args::{Arg, ArgInfo};
use super::cache::{ArgumentSignature, CompilationCache};
use super::codegen::{KernelTemplate, synthesize};
use super::indexer::Indexer;
use super::param::ParamInfo;
use super::reduce_dims::reduce_dims;
use super::types::TypeSignature;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::{ArrayArg, Device, Kernel, KernelArg, Runtime};
use crate::tensor::{Array, Layout};
use std::sync::Arc;

/// Validate supplied outputs, or allocate them when none are given
///
/// Supplied outputs must be arrays whose shape equals `out_shape`, except
/// for raw output parameters, which may have any shape. Without supplied
/// outputs, a raw output parameter leaves the output size undecided.
pub(crate) fn get_out_args<R: Runtime>(
    op: &str,
    out_args: &[Arg<R>],
    out_types: &[DType],
    out_shape: &[usize],
    out_params: Option<&[ParamInfo]>,
    device: &R::Device,
) -> Result<Vec<Array<R>>> {
    let is_raw = |k: usize| out_params.and_then(|p| p.get(k)).is_some_and(|p| p.raw);

    if out_args.is_empty() {
        if out_params.is_some_and(|p| p.iter().any(|p| p.raw)) {
            return Err(Error::value_error(op, "output array size is undecided"));
        }
        return out_types
            .iter()
            .map(|&dt| Array::empty(out_shape, dt, device))
            .collect();
    }

    out_args
        .iter()
        .enumerate()
        .map(|(k, arg)| {
            let a = arg.as_array().ok_or_else(|| {
                Error::type_error(op, "output arguments must be arrays")
            })?;
            if a.shape() != out_shape && !is_raw(k) {
                return Err(Error::value_error(
                    op,
                    format!(
                        "out shape is mismatched: expected {out_shape:?}, got {:?}",
                        a.shape()
                    ),
                ));
            }
            Ok(a.clone())
        })
        .collect()
}

/// One resolved invocation ready to run
pub(crate) struct Launch<'a, R: Runtime> {
    /// The operation's fixed description
    pub template: &'a Arc<KernelTemplate>,
    /// Resolved types
    pub types: &'a TypeSignature,
    /// Inputs then outputs; non-raw arrays already have the iteration shape
    /// and scalars already have their resolved type
    pub args: &'a [Arg<R>],
    /// Shape the indexer walks
    pub shape: &'a [usize],
    /// Whether contiguous axes may be merged
    pub reduce: bool,
    /// Device the kernel runs on
    pub device: &'a R::Device,
    /// Cache that owns compiled kernels
    pub cache: &'a CompilationCache<R>,
}

impl<R: Runtime> Launch<'_, R> {
    /// Compile (or fetch) the kernel for this call and launch it
    ///
    /// An empty iteration space returns without synthesizing anything.
    pub fn run(&self) -> Result<()> {
        let size: usize = self.shape.iter().product();
        if size == 0 {
            log::trace!("'{}': empty iteration space, nothing to launch", self.template.name);
            return Ok(());
        }

        let params = &self.template.params;
        let layouts: Vec<Layout> = self
            .args
            .iter()
            .map(|a| match a {
                Arg::Array(a) => a.layout().clone(),
                _ => Layout::scalar(),
            })
            .collect();

        let indexed: Vec<usize> = self
            .args
            .iter()
            .zip(params.iter())
            .enumerate()
            .filter(|(_, (a, p))| !p.raw && matches!(a, Arg::Array(_)))
            .map(|(k, _)| k)
            .collect();

        let (shape, layouts) = self.reduced(&layouts, &indexed);

        let mut kernel_args = Vec::with_capacity(self.args.len() + 1);
        let mut infos = Vec::with_capacity(self.args.len() + 1);
        let mut out_raw_types = Vec::new();
        for (k, ((arg, p), layout)) in self.args.iter().zip(params.iter()).zip(layouts).enumerate() {
            match arg {
                Arg::Array(a) => {
                    infos.push(ArgInfo::array(a.dtype(), layout.ndim()));
                    if k >= self.template.nin {
                        out_raw_types.push(a.dtype());
                    }
                    kernel_args.push(KernelArg::Array(ArrayArg {
                        ptr: a.storage().ptr(),
                        offset: layout.offset(),
                        dtype: a.dtype(),
                        shape: layout.shape().iter().copied().collect(),
                        strides: layout.strides().iter().copied().collect(),
                        indexed: !p.raw,
                    }));
                }
                Arg::Scalar(s) => {
                    infos.push(ArgInfo::scalar(s.dtype()));
                    kernel_args.push(KernelArg::Scalar(*s));
                }
                Arg::Unsupported(kind) => {
                    return Err(Error::type_error(
                        &self.template.name,
                        format!("unsupported type {kind}"),
                    ));
                }
            }
        }

        let indexer = Indexer::new(&shape);
        infos.push(ArgInfo::indexer(indexer.ndim()));
        kernel_args.push(KernelArg::Indexer(indexer));

        let sig = ArgumentSignature {
            device_id: self.device.id(),
            args: infos,
            types: self.types.clone(),
            template: self.template.clone(),
        };

        let kernel = self.cache.get_or_compile(&sig, || {
            let source = synthesize(self.template, &sig.args, self.types, &out_raw_types)?;
            log::debug!(
                "compiling '{}' for {} ({} bytes of source)",
                source.name,
                self.device.name(),
                source.code.len()
            );
            R::compile(&source, self.device)
        })?;

        log::trace!("launching '{}' over {size} elements", kernel.name());
        kernel.launch(size, &kernel_args)
    }

    fn reduced(&self, layouts: &[Layout], indexed: &[usize]) -> (Vec<usize>, Vec<Layout>) {
        let mut layouts = layouts.to_vec();
        if !self.reduce {
            return (self.shape.to_vec(), layouts);
        }

        let views: Vec<&Layout> = indexed.iter().map(|&k| &layouts[k]).collect();
        match reduce_dims(self.shape, &views) {
            Some((shape, views)) => {
                for (&k, view) in indexed.iter().zip(views) {
                    layouts[k] = view;
                }
                (shape.to_vec(), layouts)
            }
            None => (self.shape.to_vec(), layouts),
        }
    }
}
