//! Reductions. Every reduction node keeps the reduced axes with size 1; the visible
//! non-keepdims form is a `squeeze` on top of it.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId, Op};
use crate::shape::{normalize_axes, normalize_axis, Shape};

use ndarray::Axis;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Prod,
    Min,
    Max,
}

impl ReduceOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Mean => "mean",
            ReduceOp::Prod => "prod",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
        }
    }
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ReduceOp::Sum => "Sum",
            ReduceOp::Mean => "Mean",
            ReduceOp::Prod => "Prod",
            ReduceOp::Min => "Min",
            ReduceOp::Max => "Max",
        };
        write!(f, "{}", name)
    }
}

impl Graph {
    fn reduction(
        &mut self,
        op: ReduceOp,
        x: NodeId,
        axis: Option<&[isize]>,
        keepdims: bool,
    ) -> Result<NodeId, Error> {
        let input_shape = self.shape(x)?.clone();
        let axes = normalize_axes(axis, input_shape.rank())?;
        let kept: Vec<Option<usize>> = input_shape
            .dims()
            .iter()
            .enumerate()
            .map(|(i, &d)| if axes.contains(&i) { Some(1) } else { d })
            .collect();
        let inner = self.push(
            Op::Reduce {
                op,
                axes: axes.clone(),
            },
            vec![x],
            Shape::new(kept),
        );
        if keepdims || axes.is_empty() {
            return Ok(inner);
        }
        let squeezed: Vec<Option<usize>> = input_shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, &d)| d)
            .collect();
        Ok(self.push(Op::Squeeze { axes }, vec![inner], Shape::new(squeezed)))
    }

    /// Sum over `axis` (all axes when `None`).
    pub fn sum(&mut self, x: NodeId, axis: Option<&[isize]>, keepdims: bool) -> Result<NodeId, Error> {
        self.reduction(ReduceOp::Sum, x, axis, keepdims)
    }

    pub fn mean(&mut self, x: NodeId, axis: Option<&[isize]>, keepdims: bool) -> Result<NodeId, Error> {
        self.reduction(ReduceOp::Mean, x, axis, keepdims)
    }

    /// Product over `axis`. Its gradient divides by `x`, so zeros in `x` yield non-finite
    /// gradients.
    pub fn prod(&mut self, x: NodeId, axis: Option<&[isize]>, keepdims: bool) -> Result<NodeId, Error> {
        self.reduction(ReduceOp::Prod, x, axis, keepdims)
    }

    pub fn min(&mut self, x: NodeId, axis: Option<&[isize]>, keepdims: bool) -> Result<NodeId, Error> {
        self.reduction(ReduceOp::Min, x, axis, keepdims)
    }

    pub fn max(&mut self, x: NodeId, axis: Option<&[isize]>, keepdims: bool) -> Result<NodeId, Error> {
        self.reduction(ReduceOp::Max, x, axis, keepdims)
    }

    /// Index of the first maximum along `axis`, or into the flattened tensor when `None`.
    pub fn argmax(&mut self, x: NodeId, axis: Option<isize>) -> Result<NodeId, Error> {
        let input_shape = self.shape(x)?.clone();
        let (axis, shape) = match axis {
            None => (None, Shape::scalar()),
            Some(axis) => {
                let axis = normalize_axis(axis, input_shape.rank())?;
                let mut dims = input_shape.dims().to_vec();
                dims.remove(axis);
                (Some(axis), Shape::new(dims))
            }
        };
        Ok(self.push(Op::Argmax { axis }, vec![x], shape))
    }
}

fn first_argmax<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let mut best = f64::NEG_INFINITY;
    let mut best_index = 0usize;
    for (i, &v) in values.enumerate() {
        if i == 0 || v > best {
            best = v;
            best_index = i;
        }
    }
    best_index as f64
}

pub(crate) fn reduce_forward(op: ReduceOp, axes: &[usize], x: &Array) -> Result<Array, Error> {
    match op {
        ReduceOp::Sum => x.sum_axes_keepdims(axes),
        ReduceOp::Mean => {
            let count: usize = axes.iter().map(|&a| x.shape()[a]).product();
            let summed = x.sum_axes_keepdims(axes)?;
            Ok(summed.map(|s| s / count as f64))
        }
        ReduceOp::Prod => x.fold_axes_keepdims(axes, |lane| lane.product()),
        ReduceOp::Min => x.fold_axes_keepdims(axes, |lane| lane.fold(f64::INFINITY, |m, &v| m.min(v))),
        ReduceOp::Max => {
            x.fold_axes_keepdims(axes, |lane| lane.fold(f64::NEG_INFINITY, |m, &v| m.max(v)))
        }
    }
}

pub(crate) fn reduce_gradients(
    op: ReduceOp,
    grad: &Array,
    x: &Array,
    output: &Array,
) -> Result<Vec<Option<Array>>, Error> {
    let grad_x = match op {
        ReduceOp::Sum => grad.broadcast_to(x.shape())?,
        ReduceOp::Mean => {
            let ratio = output.size() as f64 / x.size() as f64;
            grad.broadcast_to(x.shape())?.map(|g| g * ratio)
        }
        ReduceOp::Prod => grad
            .zip_with(output, |g, o| g * o)?
            .zip_with(x, |go, a| go / a)?,
        ReduceOp::Min | ReduceOp::Max => {
            let mask = x.zip_with(output, |a, o| if a == o { 1.0 } else { 0.0 })?;
            mask.zip_with(grad, |m, g| m * g)?
        }
    };
    Ok(vec![Some(grad_x)])
}

pub(crate) fn argmax_forward(axis: Option<usize>, x: &Array) -> Result<Array, Error> {
    match axis {
        None => {
            if x.is_empty() {
                return Err(Error::InvalidOperation(
                    "argmax of an empty tensor".to_string(),
                ));
            }
            Ok(Array::scalar(first_argmax(x.data.iter())))
        }
        Some(axis) => {
            if axis >= x.ndim() {
                return Err(Error::InvalidAxis {
                    axis: axis as isize,
                    rank: x.ndim(),
                });
            }
            Ok(Array::new(
                x.data.map_axis(Axis(axis), |lane| first_argmax(lane.iter())),
            ))
        }
    }
}
