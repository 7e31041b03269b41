//! Collapsing of axes that are contiguous for every operand

use crate::tensor::{Layout, Shape, Strides};

/// Merge adjacent axes that are contiguous in all views, then drop extent-1 axes
///
/// Axes `i-1, i` merge when every view satisfies
/// `strides[i] * shape[i] == strides[i-1]`. Iteration order and the set of
/// visited elements are unchanged; only the number of axes shrinks.
///
/// Every layout must already have the iteration shape `shape`. Returns
/// `None` when the rank is at most one or nothing can be removed.
pub fn reduce_dims(shape: &[usize], layouts: &[&Layout]) -> Option<(Shape, Vec<Layout>)> {
    if shape.len() <= 1 {
        return None;
    }

    let mut merged: Shape = shape.iter().copied().collect();
    for i in 1..merged.len() {
        let contiguous = layouts
            .iter()
            .all(|l| l.strides()[i] * merged[i] as isize == l.strides()[i - 1]);
        if contiguous {
            merged[i] *= merged[i - 1];
            merged[i - 1] = 1;
        }
    }

    let reduced: Shape = merged.iter().copied().filter(|&d| d != 1).collect();
    if reduced.as_slice() == shape {
        return None;
    }

    let views = layouts
        .iter()
        .map(|l| {
            let strides: Strides = l
                .strides()
                .iter()
                .zip(merged.iter())
                .filter(|&(_, &d)| d != 1)
                .map(|(&s, _)| s)
                .collect();
            Layout::new(reduced.clone(), strides, l.offset())
        })
        .collect();

    log::trace!("reduced iteration shape {shape:?} -> {:?}", reduced.as_slice());
    Some((reduced, views))
}
