//! Resolution of generic type tags against actual operand types

use super::param::{ParamInfo, ParamKind};
use crate::dtype::DType;
use crate::error::{Error, Result};

/// Concrete types chosen for one invocation
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeSignature {
    /// Resolved type of each input parameter
    pub in_types: Vec<DType>,
    /// Resolved type of each output parameter
    pub out_types: Vec<DType>,
    /// Tag bindings in the order they were first made
    pub bindings: Vec<(char, DType)>,
}

impl TypeSignature {
    /// Concrete type a tag is bound to
    pub fn binding(&self, tag: char) -> Option<DType> {
        self.bindings
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|&(_, dt)| dt)
    }
}

struct Binder<'a> {
    op: &'a str,
    bindings: Vec<(char, DType)>,
}

impl Binder<'_> {
    fn lookup(&self, tag: char) -> Option<DType> {
        self.bindings
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|&(_, dt)| dt)
    }

    fn bind(&mut self, param: &ParamInfo, actual: DType) -> Result<()> {
        let expected = match param.kind {
            ParamKind::Concrete(dt) => Some(dt),
            ParamKind::Generic(tag) => {
                let bound = self.lookup(tag);
                if bound.is_none() {
                    self.bindings.push((tag, actual));
                }
                bound
            }
            ParamKind::Indexer => None,
        };
        match expected {
            Some(dt) if dt != actual => Err(Error::type_error(
                self.op,
                format!(
                    "type is mismatched for '{}': expected {dt}, got {actual}",
                    param.name
                ),
            )),
            _ => Ok(()),
        }
    }

    fn resolve(&self, param: &ParamInfo) -> Result<DType> {
        match param.kind {
            ParamKind::Concrete(dt) => Ok(dt),
            ParamKind::Generic(tag) => self.lookup(tag).ok_or_else(|| {
                Error::type_error(self.op, format!("cannot determine type of {tag}"))
            }),
            ParamKind::Indexer => Err(Error::type_error(
                self.op,
                format!("'{}' has no element type", param.name),
            )),
        }
    }
}

/// Bind generic tags to concrete types and resolve every parameter
///
/// `in_dtypes` has one entry per input: the array's dtype, or `None` for a
/// scalar (scalars never bind a tag). `out_dtypes` is `None` when outputs are
/// allocated by the call; otherwise every entry must be `Some` (an array).
/// Outputs are bound before inputs.
///
/// # Errors
///
/// `Error::Type` when an output is not an array, an operand disagrees with a
/// concrete or already-bound type, or a tag is left unbound.
pub(crate) fn resolve_types(
    op: &str,
    in_params: &[ParamInfo],
    out_params: &[ParamInfo],
    in_dtypes: &[Option<DType>],
    out_dtypes: Option<&[Option<DType>]>,
) -> Result<TypeSignature> {
    debug_assert_eq!(in_params.len(), in_dtypes.len());
    let mut binder = Binder {
        op,
        bindings: Vec::new(),
    };

    if let Some(out_dtypes) = out_dtypes {
        debug_assert_eq!(out_params.len(), out_dtypes.len());
        for (p, dt) in out_params.iter().zip(out_dtypes) {
            let dt = dt.ok_or_else(|| {
                Error::type_error(op, format!("output argument '{}' must be an array", p.name))
            })?;
            binder.bind(p, dt)?;
        }
    }

    for (p, dt) in in_params.iter().zip(in_dtypes) {
        if let Some(dt) = dt {
            binder.bind(p, *dt)?;
        }
    }

    let in_types = in_params
        .iter()
        .map(|p| binder.resolve(p))
        .collect::<Result<Vec<_>>>()?;
    let out_types = out_params
        .iter()
        .map(|p| binder.resolve(p))
        .collect::<Result<Vec<_>>>()?;

    Ok(TypeSignature {
        in_types,
        out_types,
        bindings: binder.bindings,
    })
}
