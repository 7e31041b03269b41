//! User-defined elementwise kernels

use super::args::{Arg, check_args};
use super::broadcast::broadcast_args;
use super::cache::CompilationCache;
use super::codegen::{KernelTemplate, TypedefStyle};
use super::dispatch::{Launch, get_out_args};
use super::param::{ParamInfo, is_identifier, parse_params, validate_params};
use super::types::resolve_types;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::tensor::Array;
use std::sync::Arc;

// ============================================================================
// Options
// ============================================================================

/// Construction-time options of an [`ElementwiseKernel`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelOptions {
    name: String,
    reduce_dims: bool,
    preamble: String,
    loop_prep: String,
    after_loop: String,
    options: Vec<String>,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            name: "kernel".to_string(),
            reduce_dims: true,
            preamble: String::new(),
            loop_prep: String::new(),
            after_loop: String::new(),
            options: Vec::new(),
        }
    }
}

impl KernelOptions {
    /// Default options: entry point `kernel`, dimension reduction on
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point name; also the key for CPU host routines
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keep the broadcast rank instead of merging contiguous axes
    pub fn reduce_dims(mut self, enabled: bool) -> Self {
        self.reduce_dims = enabled;
        self
    }

    /// Source inserted above the kernel function
    pub fn preamble(mut self, code: impl Into<String>) -> Self {
        self.preamble = code.into();
        self
    }

    /// Statements run once per thread before the loop
    pub fn loop_prep(mut self, code: impl Into<String>) -> Self {
        self.loop_prep = code.into();
        self
    }

    /// Statements run once per thread after the loop
    pub fn after_loop(mut self, code: impl Into<String>) -> Self {
        self.after_loop = code.into();
        self
    }

    /// Append a native compiler option
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }
}

/// Per-call options
pub struct CallOptions<R: Runtime> {
    /// Loop size overriding the broadcast shape (elementwise kernels only)
    pub size: Option<usize>,
    /// Output array, as an alternative to passing it positionally
    pub out: Option<Array<R>>,
    /// Requested output type (universal functions only)
    pub dtype: Option<DType>,
}

impl<R: Runtime> CallOptions<R> {
    /// No overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loop size
    pub fn size(mut self, n: usize) -> Self {
        self.size = Some(n);
        self
    }

    /// Write into `out`
    pub fn out(mut self, out: Array<R>) -> Self {
        self.out = Some(out);
        self
    }

    /// Select the signature producing `dtype`
    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }
}

impl<R: Runtime> Default for CallOptions<R> {
    fn default() -> Self {
        Self {
            size: None,
            out: None,
            dtype: None,
        }
    }
}

impl<R: Runtime> std::fmt::Debug for CallOptions<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("size", &self.size)
            .field("out", &self.out)
            .field("dtype", &self.dtype)
            .finish()
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Arrays produced by a call
///
/// A single output is returned bare; any other count as a list.
pub enum Outputs<R: Runtime> {
    /// Exactly one output
    Single(Array<R>),
    /// Zero or several outputs, in declaration order
    Multiple(Vec<Array<R>>),
}

impl<R: Runtime> std::fmt::Debug for Outputs<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(a) => f.debug_tuple("Single").field(a).finish(),
            Self::Multiple(v) => f.debug_tuple("Multiple").field(v).finish(),
        }
    }
}

impl<R: Runtime> Outputs<R> {
    pub(crate) fn from_vec(mut outs: Vec<Array<R>>) -> Self {
        if outs.len() == 1 {
            if let Some(out) = outs.pop() {
                return Self::Single(out);
            }
        }
        Self::Multiple(outs)
    }

    /// Number of arrays
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(v) => v.len(),
        }
    }

    /// Returns true if there are no outputs
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The only output
    pub fn into_single(self) -> Result<Array<R>> {
        match self {
            Self::Single(a) => Ok(a),
            Self::Multiple(v) => Err(Error::value_error(
                "into_single",
                format!("expected one output, got {}", v.len()),
            )),
        }
    }

    /// All outputs in declaration order
    pub fn into_vec(self) -> Vec<Array<R>> {
        match self {
            Self::Single(a) => vec![a],
            Self::Multiple(v) => v,
        }
    }
}

// ============================================================================
// ElementwiseKernel
// ============================================================================

/// A per-element operation over generically typed parameters
///
/// The operation is written in the device language against the declared
/// parameter names. Each call resolves the generic tags from its operands,
/// broadcasts non-raw arrays, allocates missing outputs, and launches a
/// kernel specialized to the resolved types and ranks. Specializations are
/// compiled once per device and reused.
///
/// Within the operation, `i` is the linear iteration index and `_ind` the
/// indexer (`_ind.size()` is the loop size). Raw parameters are passed as
/// whole arrays and indexed explicitly.
///
/// # Example
///
/// ```ignore
/// let add = ElementwiseKernel::new(
///     "T x, T y",
///     "T z",
///     "z = x + y",
///     KernelOptions::new().name("my_add"),
/// )?;
/// let z = add.call::<CudaRuntime>(&[x.into(), y.into()], CallOptions::new())?;
/// ```
#[derive(Debug)]
pub struct ElementwiseKernel {
    in_params: Arc<[ParamInfo]>,
    out_params: Arc<[ParamInfo]>,
    template: Arc<KernelTemplate>,
    reduce_dims: bool,
}

impl ElementwiseKernel {
    /// Parse and validate a kernel definition
    ///
    /// # Errors
    ///
    /// `Error::Syntax` for malformed parameter lists; `Error::Value` for a
    /// parameter named `i`, duplicate or reserved names, or an entry point
    /// name that is not an identifier.
    pub fn new(
        in_params: &str,
        out_params: &str,
        operation: impl Into<String>,
        options: KernelOptions,
    ) -> Result<Self> {
        let ins = parse_params(in_params, true)?;
        let outs = parse_params(out_params, false)?;

        let mut params: Vec<ParamInfo> = ins.iter().chain(outs.iter()).cloned().collect();
        validate_params(&options.name, &params)?;
        if !is_identifier(&options.name) {
            return Err(Error::value_error(
                &options.name,
                "kernel name must be a valid identifier",
            ));
        }
        params.push(ParamInfo::indexer());

        let template = KernelTemplate {
            name: options.name,
            params: params.into(),
            nin: ins.len(),
            operation: operation.into(),
            preamble: options.preamble,
            loop_prep: options.loop_prep,
            after_loop: options.after_loop,
            options: options.options,
            style: TypedefStyle::Tags,
        };

        Ok(Self {
            in_params: ins,
            out_params: outs,
            template: Arc::new(template),
            reduce_dims: options.reduce_dims,
        })
    }

    /// Entry point name
    pub fn name(&self) -> &str {
        &self.template.name
    }

    /// Number of inputs
    pub fn nin(&self) -> usize {
        self.in_params.len()
    }

    /// Number of outputs
    pub fn nout(&self) -> usize {
        self.out_params.len()
    }

    /// Parsed input parameters
    pub fn in_params(&self) -> &[ParamInfo] {
        &self.in_params
    }

    /// Parsed output parameters
    pub fn out_params(&self) -> &[ParamInfo] {
        &self.out_params
    }

    /// Run the kernel on the current device using the runtime's shared cache
    ///
    /// `args` holds the inputs, optionally followed by every output.
    pub fn call<R: Runtime>(&self, args: &[Arg<R>], opts: CallOptions<R>) -> Result<Outputs<R>> {
        self.call_with_cache(args, opts, R::kernel_cache())
    }

    /// Run the kernel, compiling into and reusing kernels from `cache`
    pub fn call_with_cache<R: Runtime>(
        &self,
        args: &[Arg<R>],
        opts: CallOptions<R>,
        cache: &CompilationCache<R>,
    ) -> Result<Outputs<R>> {
        let name = self.name();
        let (nin, nout) = (self.nin(), self.nout());

        if args.len() != nin && args.len() != nin + nout {
            return Err(Error::type_error(
                name,
                format!(
                    "wrong number of arguments: expected {nin} or {}, got {}",
                    nin + nout,
                    args.len()
                ),
            ));
        }
        if opts.dtype.is_some() {
            return Err(Error::value_error(
                name,
                "'dtype' is only accepted by universal functions",
            ));
        }

        let mut args = args.to_vec();
        if let Some(out) = opts.out {
            if args.len() != nin {
                return Err(Error::value_error(
                    name,
                    "cannot specify 'out' as both a positional and keyword argument",
                ));
            }
            if nout != 1 {
                return Err(Error::value_error(
                    name,
                    format!("'out' needs a kernel with one output, this one has {nout}"),
                ));
            }
            args.push(Arg::Array(out));
        }

        let device = R::current_device()?;
        check_args(name, &args, &device)?;

        let n = opts.size;
        let broadcasted = broadcast_args(name, &args, &self.template.params, n.is_none())?;

        let loop_shape: Vec<usize> = match (&broadcasted.shape, n) {
            (Some(shape), Some(n)) if shape.as_slice() != [n] => {
                return Err(Error::value_error(
                    name,
                    format!("size {n} does not match the broadcast shape {:?}", shape.as_slice()),
                ));
            }
            (Some(shape), _) => shape.to_vec(),
            (None, Some(n)) => vec![n],
            (None, None) => return Err(Error::value_error(name, "loop size is undecided")),
        };

        let (in_args, out_args) = broadcasted.args.split_at(nin);
        let in_dtypes: Vec<Option<DType>> = in_args
            .iter()
            .map(|a| a.as_array().map(Array::dtype))
            .collect();
        let out_dtypes: Option<Vec<Option<DType>>> = (!out_args.is_empty())
            .then(|| out_args.iter().map(|a| a.as_array().map(Array::dtype)).collect());

        let types = resolve_types(
            name,
            &self.in_params,
            &self.out_params,
            &in_dtypes,
            out_dtypes.as_deref(),
        )?;

        let mut call_args: Vec<Arg<R>> = in_args
            .iter()
            .zip(&types.in_types)
            .map(|(a, &dt)| match a {
                Arg::Scalar(s) => Arg::Scalar(s.cast(dt)),
                other => other.clone(),
            })
            .collect();

        let outs = get_out_args(
            name,
            &args[nin..],
            &types.out_types,
            &loop_shape,
            Some(&self.out_params),
            &device,
        )?;
        call_args.extend(outs.iter().map(|a| Arg::Array(a.clone())));

        Launch {
            template: &self.template,
            types: &types,
            args: &call_args,
            shape: &loop_shape,
            reduce: self.reduce_dims,
            device: &device,
            cache,
        }
        .run()?;

        Ok(Outputs::from_vec(outs))
    }
}
