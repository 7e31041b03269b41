//! Universal functions: one operation, several registered type signatures

use super::args::{Arg, check_args};
use super::broadcast::broadcast_shape;
use super::cache::CompilationCache;
use super::codegen::{KernelTemplate, TypedefStyle};
use super::dispatch::{Launch, get_out_args};
use super::elementwise::{CallOptions, Outputs};
use super::param::{ParamInfo, ParamKind, is_identifier};
use super::types::TypeSignature;
use crate::dtype::{DType, can_cast};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One registered signature and the body that implements it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UfuncOp {
    /// Input types
    pub in_types: Vec<DType>,
    /// Output types
    pub out_types: Vec<DType>,
    /// Per-element body over `in0..`, `out0..`
    pub routine: String,
}

impl UfuncOp {
    /// Signature rendered with type codes, e.g. `"ii->i"`
    pub fn signature(&self) -> String {
        let codes = |ts: &[DType]| ts.iter().map(|t| t.char_code()).collect::<String>();
        format!("{}->{}", codes(&self.in_types), codes(&self.out_types))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum RoutineKey {
    InTypes(Vec<DType>),
    Dtype(DType),
}

/// An elementwise function with a fixed arity and a table of typed loops
///
/// Inputs may be arrays or scalars. A call picks the first registered
/// signature whose inputs every operand can be safely cast to, or with an
/// explicit `dtype`, the first signature producing that type. Selections
/// (including failed ones) are memoized per function.
pub struct UniversalFunction {
    name: String,
    nin: usize,
    nout: usize,
    ops: Vec<UfuncOp>,
    templates: Vec<Arc<KernelTemplate>>,
    doc: String,
    routine_table: RwLock<HashMap<RoutineKey, Option<usize>>>,
}

impl UniversalFunction {
    /// Define a universal function from its signature table
    ///
    /// # Errors
    ///
    /// `Error::Value` if `name` is not an identifier, `ops` is empty, or a
    /// signature's arity differs from `nin`/`nout`.
    pub fn new(
        name: impl Into<String>,
        nin: usize,
        nout: usize,
        ops: Vec<UfuncOp>,
        preamble: impl Into<String>,
        doc: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let preamble = preamble.into();

        if !is_identifier(&name) {
            return Err(Error::value_error(&name, "function name must be a valid identifier"));
        }
        if ops.is_empty() {
            return Err(Error::value_error(&name, "at least one signature is required"));
        }
        if let Some(op) = ops
            .iter()
            .find(|op| op.in_types.len() != nin || op.out_types.len() != nout)
        {
            return Err(Error::value_error(
                &name,
                format!(
                    "signature {} does not take {nin} inputs and {nout} outputs",
                    op.signature()
                ),
            ));
        }

        let param = |prefix: &str, k: usize, is_const: bool| ParamInfo {
            name: format!("{prefix}{k}"),
            kind: ParamKind::Generic('T'),
            raw: false,
            is_const,
        };
        let params: Arc<[ParamInfo]> = (0..nin)
            .map(|k| param("in", k, true))
            .chain((0..nout).map(|k| param("out", k, false)))
            .chain(std::iter::once(ParamInfo::indexer()))
            .collect();

        let templates = ops
            .iter()
            .map(|op| {
                Arc::new(KernelTemplate {
                    name: name.clone(),
                    params: params.clone(),
                    nin,
                    operation: op.routine.clone(),
                    preamble: preamble.clone(),
                    loop_prep: String::new(),
                    after_loop: String::new(),
                    options: Vec::new(),
                    style: TypedefStyle::Positional,
                })
            })
            .collect();

        Ok(Self {
            name,
            nin,
            nout,
            ops,
            templates,
            doc: doc.into(),
            routine_table: RwLock::new(HashMap::new()),
        })
    }

    /// Function name (also the kernel entry point)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of inputs
    pub fn nin(&self) -> usize {
        self.nin
    }

    /// Number of outputs
    pub fn nout(&self) -> usize {
        self.nout
    }

    /// Number of inputs plus outputs
    pub fn nargs(&self) -> usize {
        self.nin + self.nout
    }

    /// Documentation string
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Registered signatures in declaration order, as `"ii->i"` strings
    pub fn types(&self) -> Vec<String> {
        self.ops.iter().map(UfuncOp::signature).collect()
    }

    /// Registered signatures
    pub fn ops(&self) -> &[UfuncOp] {
        &self.ops
    }

    fn guess_routine(&self, in_types: &[DType], dtype: Option<DType>) -> Result<usize> {
        let key = match dtype {
            Some(dt) => RoutineKey::Dtype(dt),
            None => RoutineKey::InTypes(in_types.to_vec()),
        };

        let cached = self.routine_table.read().get(&key).copied();
        let found = match cached {
            Some(found) => found,
            None => {
                let found = match dtype {
                    Some(dt) => self
                        .ops
                        .iter()
                        .position(|op| op.out_types.iter().all(|&t| t == dt)),
                    None => self.ops.iter().position(|op| {
                        in_types
                            .iter()
                            .zip(&op.in_types)
                            .all(|(&from, &to)| can_cast(from, to))
                    }),
                };
                self.routine_table.write().insert(key, found);
                found
            }
        };

        found.ok_or_else(|| {
            let got = match dtype {
                Some(dt) => format!("dtype={dt}"),
                None => in_types
                    .iter()
                    .map(|t| t.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            Error::type_error(
                &self.name,
                format!("wrong type of arguments for {} ({got})", self.name),
            )
        })
    }

    /// Apply the function on the current device using the runtime's shared cache
    ///
    /// `args` holds the inputs, optionally followed by every output.
    pub fn call<R: Runtime>(&self, args: &[Arg<R>], opts: CallOptions<R>) -> Result<Outputs<R>> {
        self.call_with_cache(args, opts, R::kernel_cache())
    }

    /// Apply the function, compiling into and reusing kernels from `cache`
    pub fn call_with_cache<R: Runtime>(
        &self,
        args: &[Arg<R>],
        opts: CallOptions<R>,
        cache: &CompilationCache<R>,
    ) -> Result<Outputs<R>> {
        let name = self.name.as_str();
        if args.len() != self.nin && args.len() != self.nargs() {
            return Err(Error::type_error(
                name,
                format!(
                    "wrong number of arguments for {name}: expected {} or {}, got {}",
                    self.nin,
                    self.nargs(),
                    args.len()
                ),
            ));
        }
        if opts.size.is_some() {
            return Err(Error::value_error(
                name,
                "'size' is only accepted by elementwise kernels",
            ));
        }

        let mut args = args.to_vec();
        if let Some(out) = opts.out {
            if args.len() != self.nin {
                return Err(Error::value_error(
                    name,
                    "cannot specify 'out' as both a positional and keyword argument",
                ));
            }
            if self.nout != 1 {
                return Err(Error::value_error(
                    name,
                    format!("'out' needs a function with one output, {name} has {}", self.nout),
                ));
            }
            args.push(Arg::Array(out));
        }

        let device = R::current_device()?;
        check_args(name, &args, &device)?;

        let shape = broadcast_shape(args.iter().filter_map(|a| a.as_array().map(|a| a.shape())))?
            .unwrap_or_default();

        let (in_args, out_args) = args.split_at(self.nin);
        let in_types = in_args
            .iter()
            .map(|a| {
                a.dtype()
                    .ok_or_else(|| Error::type_error(name, "unsupported argument type"))
            })
            .collect::<Result<Vec<_>>>()?;

        let idx = self.guess_routine(&in_types, opts.dtype)?;
        let op = &self.ops[idx];

        let mut call_args = in_args
            .iter()
            .zip(&op.in_types)
            .map(|(a, &dt)| match a {
                Arg::Array(a) => Ok(Arg::Array(a.broadcast_to(&shape)?)),
                Arg::Scalar(s) => Ok(Arg::Scalar(s.cast(dt))),
                Arg::Unsupported(kind) => {
                    Err(Error::type_error(name, format!("unsupported type {kind}")))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let outs = get_out_args(name, out_args, &op.out_types, &shape, None, &device)?;
        if shape.contains(&0) {
            return Ok(Outputs::from_vec(outs));
        }
        call_args.extend(outs.iter().map(|a| Arg::Array(a.clone())));

        let types = TypeSignature {
            in_types: op.in_types.clone(),
            out_types: op.out_types.clone(),
            bindings: Vec::new(),
        };

        Launch {
            template: &self.templates[idx],
            types: &types,
            args: &call_args,
            shape: &shape,
            reduce: true,
            device: &device,
            cache,
        }
        .run()?;

        Ok(Outputs::from_vec(outs))
    }
}

impl fmt::Debug for UniversalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ufunc '{}'>", self.name)
    }
}

impl fmt::Display for UniversalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ufunc '{}'>", self.name)
    }
}

// ============================================================================
// Signature strings
// ============================================================================

/// One entry of a [`create_ufunc`] signature list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UfuncSpec<'a> {
    /// Signature using the function-wide routine, e.g. `"ff->f"`
    Sig(&'a str),
    /// Signature with its own routine
    WithRoutine(&'a str, &'a str),
}

impl<'a> From<&'a str> for UfuncSpec<'a> {
    fn from(sig: &'a str) -> Self {
        Self::Sig(sig)
    }
}

impl<'a> From<(&'a str, &'a str)> for UfuncSpec<'a> {
    fn from((sig, routine): (&'a str, &'a str)) -> Self {
        Self::WithRoutine(sig, routine)
    }
}

fn parse_type_codes(sig: &str, codes: &str) -> Result<Vec<DType>> {
    codes
        .chars()
        .map(|c| {
            DType::from_char(c)
                .ok_or_else(|| Error::syntax(sig, format!("unknown type code '{c}'")))
        })
        .collect()
}

fn parse_signature(sig: &str) -> Result<(Vec<DType>, Vec<DType>)> {
    let parts: Vec<&str> = sig.split("->").collect();
    match parts.as_slice() {
        [both] => {
            let types = parse_type_codes(sig, both.trim())?;
            Ok((types.clone(), types))
        }
        [ins, outs] => Ok((
            parse_type_codes(sig, ins.trim())?,
            parse_type_codes(sig, outs.trim())?,
        )),
        _ => Err(Error::syntax(sig, "expected '<inputs>-><outputs>'")),
    }
}

/// Build a universal function from signature strings
///
/// Each signature lists input type codes, `->`, and output type codes
/// (`"ii->i"`). A signature without `->` uses the same codes for inputs and
/// outputs. Entries without their own routine use `routine`. The arity is
/// taken from the first signature.
///
/// # Errors
///
/// `Error::Syntax` for unknown type codes or malformed signatures;
/// `Error::Value` when a signature has no routine or the arities disagree.
pub fn create_ufunc(
    name: &str,
    specs: &[UfuncSpec<'_>],
    routine: Option<&str>,
    preamble: &str,
    doc: &str,
) -> Result<UniversalFunction> {
    let ops = specs
        .iter()
        .map(|spec| {
            let (sig, body) = match *spec {
                UfuncSpec::Sig(sig) => (
                    sig,
                    routine.ok_or_else(|| {
                        Error::value_error(name, format!("no routine for signature '{sig}'"))
                    })?,
                ),
                UfuncSpec::WithRoutine(sig, body) => (sig, body),
            };
            let (in_types, out_types) = parse_signature(sig)?;
            Ok(UfuncOp {
                in_types,
                out_types,
                routine: body.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let (nin, nout) = ops
        .first()
        .map(|op| (op.in_types.len(), op.out_types.len()))
        .unwrap_or_default();
    UniversalFunction::new(name, nin, nout, ops, preamble, doc)
}
