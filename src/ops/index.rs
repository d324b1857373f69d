//! Basic indexing with integers and Python-style slices.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, IntoNode, NodeId, Op};
use crate::shape::Shape;

use ndarray::SliceInfoElem;
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// One entry of an index expression. Integer entries drop their axis; slices follow
/// Python semantics, including negative bounds and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexItem {
    At(isize),
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: Option<isize>,
    },
}

impl IndexItem {
    /// The full slice `:`.
    pub fn full() -> Self {
        IndexItem::Slice {
            start: None,
            stop: None,
            step: None,
        }
    }

    pub fn slice(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
        IndexItem::Slice { start, stop, step }
    }
}

impl From<isize> for IndexItem {
    fn from(index: isize) -> Self {
        IndexItem::At(index)
    }
}

impl From<Range<isize>> for IndexItem {
    fn from(r: Range<isize>) -> Self {
        IndexItem::slice(Some(r.start), Some(r.end), None)
    }
}

impl From<RangeFrom<isize>> for IndexItem {
    fn from(r: RangeFrom<isize>) -> Self {
        IndexItem::slice(Some(r.start), None, None)
    }
}

impl From<RangeTo<isize>> for IndexItem {
    fn from(r: RangeTo<isize>) -> Self {
        IndexItem::slice(None, Some(r.end), None)
    }
}

impl From<RangeFull> for IndexItem {
    fn from(_: RangeFull) -> Self {
        IndexItem::full()
    }
}

/// Formats an index expression as Python would print it, e.g. `0, 1:, :-1:-1`.
pub(crate) fn format_index(index: &[IndexItem]) -> String {
    index
        .iter()
        .map(|item| match item {
            IndexItem::At(i) => i.to_string(),
            IndexItem::Slice { start, stop, step } => {
                let mut part = String::new();
                if let Some(start) = start {
                    part.push_str(&start.to_string());
                }
                part.push(':');
                if let Some(stop) = stop {
                    part.push_str(&stop.to_string());
                }
                if let Some(step) = step {
                    part.push(':');
                    part.push_str(&step.to_string());
                }
                part
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolved `(start, step, len)` of a slice over an axis of size `dim`, as Python's
/// `slice.indices` computes it.
fn slice_indices(
    start: Option<isize>,
    stop: Option<isize>,
    step: Option<isize>,
    dim: usize,
) -> Result<(isize, isize, usize), Error> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::InvalidOperation("slice step cannot be zero".to_string()));
    }
    let len = dim as isize;
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: isize| {
        if bound < 0 {
            (bound + len).max(lower)
        } else {
            bound.min(upper)
        }
    };
    let start = start.map_or(if step > 0 { lower } else { upper }, clamp);
    let stop = stop.map_or(if step > 0 { upper } else { lower }, clamp);
    let count = if step > 0 && stop > start {
        (stop - start - 1) / step + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) / (-step) + 1
    } else {
        0
    };
    Ok((start, step, count as usize))
}

/// Output length of a slice over a possibly unknown dimension.
fn slice_len(item: &IndexItem, dim: Option<usize>) -> Result<Option<usize>, Error> {
    match (item, dim) {
        (IndexItem::Slice { start, stop, step }, Some(dim)) => {
            Ok(Some(slice_indices(*start, *stop, *step, dim)?.2))
        }
        _ => Ok(None),
    }
}

fn normalize_index(index: isize, size: usize) -> Result<usize, Error> {
    let resolved = if index < 0 { index + size as isize } else { index };
    if resolved < 0 || resolved as usize >= size {
        return Err(Error::IndexOutOfBounds { index, size });
    }
    Ok(resolved as usize)
}

fn indexed_shape(shape: &Shape, index: &[IndexItem]) -> Result<Shape, Error> {
    if index.len() > shape.rank() {
        return Err(Error::InvalidOperation(format!(
            "too many indices ({}) for shape {}",
            index.len(),
            shape
        )));
    }
    let mut dims = Vec::with_capacity(shape.rank());
    for (item, &dim) in index.iter().zip(shape.dims()) {
        match item {
            IndexItem::At(i) => {
                if let Some(d) = dim {
                    normalize_index(*i, d)?;
                }
            }
            slice => dims.push(slice_len(slice, dim)?),
        }
    }
    dims.extend_from_slice(&shape.dims()[index.len()..]);
    Ok(Shape::new(dims))
}

/// Converts an index expression into an ndarray slice covering every axis of `shape`.
pub(crate) fn slice_info(index: &[IndexItem], shape: &[usize]) -> Result<Vec<SliceInfoElem>, Error> {
    if index.len() > shape.len() {
        return Err(Error::InvalidOperation(format!(
            "too many indices ({}) for shape {:?}",
            index.len(),
            shape
        )));
    }
    let mut info = Vec::with_capacity(shape.len());
    for (i, &dim) in shape.iter().enumerate() {
        let item = index.get(i).copied().unwrap_or_else(IndexItem::full);
        let elem = match item {
            IndexItem::At(index) => SliceInfoElem::Index(normalize_index(index, dim)? as isize),
            IndexItem::Slice { start, stop, step } => {
                let (start, step, count) = slice_indices(start, stop, step, dim)?;
                if count == 0 {
                    SliceInfoElem::Slice {
                        start: 0,
                        end: Some(0),
                        step: 1,
                    }
                } else if step > 0 {
                    SliceInfoElem::Slice {
                        start,
                        end: Some(start + (count as isize - 1) * step + 1),
                        step,
                    }
                } else {
                    // ndarray walks a negative step backwards from the end of [start, end).
                    let lowest = start + (count as isize - 1) * step;
                    SliceInfoElem::Slice {
                        start: lowest,
                        end: Some(start + 1),
                        step,
                    }
                }
            }
        };
        info.push(elem);
    }
    Ok(info)
}

impl Graph {
    /// `x[index]` with basic (integer and slice) indexing.
    pub fn getitem(&mut self, x: NodeId, index: &[IndexItem]) -> Result<NodeId, Error> {
        let shape = indexed_shape(self.shape(x)?, index)?;
        let op = Op::Getitem {
            index: index.to_vec(),
        };
        Ok(self.push(op, vec![x], shape))
    }

    /// A copy of `x` with `x[index]` replaced by `value` (broadcast). Not differentiable.
    pub fn setitem(
        &mut self,
        x: NodeId,
        index: &[IndexItem],
        value: impl IntoNode,
    ) -> Result<NodeId, Error> {
        let value = value.into_node(self)?;
        let x_shape = self.shape(x)?.clone();
        indexed_shape(&x_shape, index)?;
        let op = Op::Setitem {
            index: index.to_vec(),
        };
        Ok(self.push(op, vec![x, value], x_shape))
    }
}

pub(crate) fn getitem_forward(index: &[IndexItem], x: &Array) -> Result<Array, Error> {
    Ok(x.slice(&slice_info(index, x.shape())?))
}

pub(crate) fn getitem_gradients(
    index: &[IndexItem],
    grad: &Array,
    x: &Array,
) -> Result<Vec<Option<Array>>, Error> {
    let mut scattered = Array::zeros(x.shape());
    scattered.scatter_add(&slice_info(index, x.shape())?, grad)?;
    Ok(vec![Some(scattered)])
}

pub(crate) fn setitem_forward(index: &[IndexItem], x: &Array, value: &Array) -> Result<Array, Error> {
    let mut updated = x.clone();
    updated.assign(&slice_info(index, x.shape())?, value)?;
    Ok(updated)
}
