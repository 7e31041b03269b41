//! Shape negotiation across kernel operands

use super::args::Arg;
use super::param::ParamInfo;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::tensor::{Shape, broadcast_shapes};

/// Right-aligned broadcast of a set of shapes
///
/// Returns `None` when no shape is given.
pub fn broadcast_shape<'a, I>(shapes: I) -> Result<Option<Shape>>
where
    I: IntoIterator<Item = &'a [usize]>,
{
    let mut acc: Option<Shape> = None;
    for shape in shapes {
        acc = Some(match acc {
            None => shape.iter().copied().collect(),
            Some(prev) => {
                broadcast_shapes(&prev, shape).ok_or_else(|| Error::broadcast(&prev, shape))?
            }
        });
    }
    Ok(acc)
}

/// Result of broadcasting the operands of one call
pub(crate) struct Broadcasted<R: Runtime> {
    /// Common shape, `None` when no non-raw array took part
    pub shape: Option<Shape>,
    /// Arguments with every non-raw array re-viewed to `shape`
    pub args: Vec<Arg<R>>,
}

/// Broadcast the non-raw array arguments to a common shape
///
/// Raw parameters and scalars do not take part. With `size_error`, a call in
/// which no array determines the shape is rejected as having an undecided
/// loop size.
pub(crate) fn broadcast_args<R: Runtime>(
    op: &str,
    args: &[Arg<R>],
    params: &[ParamInfo],
    size_error: bool,
) -> Result<Broadcasted<R>> {
    let participates = |arg: &Arg<R>, p: &ParamInfo| !p.raw && matches!(arg, Arg::Array(_));

    let shape = broadcast_shape(
        args.iter()
            .zip(params)
            .filter(|(a, p)| participates(*a, *p))
            .filter_map(|(a, _)| a.as_array().map(|a| a.shape())),
    )?;

    if shape.is_none() && size_error {
        return Err(Error::value_error(op, "loop size is undecided"));
    }

    let target = shape.clone().unwrap_or_default();
    let args = args
        .iter()
        .zip(params)
        .map(|(arg, p)| match arg {
            Arg::Array(a) if participates(arg, p) => Ok(Arg::Array(a.broadcast_to(&target)?)),
            _ => Ok(arg.clone()),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Broadcasted { shape, args })
}
