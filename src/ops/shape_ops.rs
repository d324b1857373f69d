//! Structural operations: transpose, reshape, flatten, expand_dims, squeeze and pad.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId, Op};
use crate::shape::{normalize_axes, normalize_axis, Shape};

use ndarray::SliceInfoElem;

impl Graph {
    /// Permutes the axes of `x`; `None` reverses them.
    pub fn transpose(&mut self, x: NodeId, axes: Option<&[usize]>) -> Result<NodeId, Error> {
        let input_shape = self.shape(x)?.clone();
        let rank = input_shape.rank();
        let perm = match axes {
            Some(axes) => {
                let mut seen = vec![false; rank];
                if axes.len() != rank {
                    return Err(Error::InvalidOperation(format!(
                        "transpose axes {:?} do not match rank {}",
                        axes, rank
                    )));
                }
                for &a in axes {
                    if a >= rank || seen[a] {
                        return Err(Error::InvalidAxis {
                            axis: a as isize,
                            rank,
                        });
                    }
                    seen[a] = true;
                }
                axes.to_vec()
            }
            None => (0..rank).rev().collect(),
        };
        let dims = perm.iter().map(|&a| input_shape.dims()[a]).collect();
        let op = Op::Transpose {
            axes: axes.map(|a| a.to_vec()),
        };
        Ok(self.push(op, vec![x], Shape::new(dims)))
    }

    /// Reshapes `x`; at most one entry of `shape` may be `-1` and is inferred.
    pub fn reshape(&mut self, x: NodeId, shape: &[isize]) -> Result<NodeId, Error> {
        let input_shape = self.shape(x)?.clone();
        if shape.iter().filter(|&&d| d == -1).count() > 1 || shape.iter().any(|&d| d < -1) {
            return Err(Error::InvalidOperation(format!(
                "invalid reshape target {:?}",
                shape
            )));
        }
        let known: usize = shape.iter().filter(|&&d| d >= 0).map(|&d| d as usize).product();
        let inferred = match input_shape.num_elements() {
            Some(total) => {
                let fits = if shape.contains(&-1) {
                    known != 0 && total % known == 0
                } else {
                    total == known
                };
                if !fits {
                    return Err(Error::shape_mismatch(
                        "reshape",
                        input_shape,
                        Shape::new(shape.iter().map(|&d| usize::try_from(d).ok()).collect()),
                    ));
                }
                if known == 0 {
                    None
                } else {
                    Some(total / known)
                }
            }
            None => None,
        };
        let dims = shape
            .iter()
            .map(|&d| if d == -1 { inferred } else { Some(d as usize) })
            .collect();
        let op = Op::Reshape {
            shape: shape.to_vec(),
        };
        Ok(self.push(op, vec![x], Shape::new(dims)))
    }

    pub fn flatten(&mut self, x: NodeId) -> Result<NodeId, Error> {
        let size = self.shape(x)?.num_elements();
        Ok(self.push(Op::Flatten, vec![x], Shape::new(vec![size])))
    }

    /// Inserts a size-1 axis at `axis` (`-1` appends).
    pub fn expand_dims(&mut self, x: NodeId, axis: isize) -> Result<NodeId, Error> {
        let mut shape = self.shape(x)?.clone();
        let axis = normalize_axis(axis, shape.rank() + 1)?;
        shape.insert(axis, Some(1));
        Ok(self.push(Op::ExpandDims { axis }, vec![x], shape))
    }

    /// Removes size-1 axes; `None` removes the last axis.
    pub fn squeeze(&mut self, x: NodeId, axis: Option<&[isize]>) -> Result<NodeId, Error> {
        let input_shape = self.shape(x)?.clone();
        let axes = normalize_axes(Some(axis.unwrap_or(&[-1])), input_shape.rank())?;
        for &a in &axes {
            if let Some(d) = input_shape.dims()[a] {
                if d != 1 {
                    return Err(Error::shape_mismatch(
                        "squeeze",
                        input_shape.clone(),
                        Shape::from(vec![d]),
                    ));
                }
            }
        }
        let dims = input_shape
            .dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, &d)| d)
            .collect();
        Ok(self.push(Op::Squeeze { axes }, vec![x], Shape::new(dims)))
    }

    /// Zero-pads `x`. `widths` holds one `(before, after)` pair per axis, or a single pair
    /// applied to every axis.
    pub fn pad(&mut self, x: NodeId, widths: &[(usize, usize)]) -> Result<NodeId, Error> {
        let input_shape = self.shape(x)?.clone();
        let rank = input_shape.rank();
        let widths = match widths.len() {
            1 => vec![widths[0]; rank],
            n if n == rank => widths.to_vec(),
            n => {
                return Err(Error::InvalidOperation(format!(
                    "pad expects 1 or {} width pairs, got {}",
                    rank, n
                )))
            }
        };
        let dims = input_shape
            .dims()
            .iter()
            .zip(&widths)
            .map(|(d, (before, after))| d.map(|d| d + before + after))
            .collect();
        Ok(self.push(Op::Pad { widths }, vec![x], Shape::new(dims)))
    }

    /// Pads every side of every axis with `width` zeros.
    pub fn pad_uniform(&mut self, x: NodeId, width: usize) -> Result<NodeId, Error> {
        self.pad(x, &[(width, width)])
    }
}

fn permutation(axes: &Option<Vec<usize>>, rank: usize) -> Vec<usize> {
    match axes {
        Some(axes) => axes.clone(),
        None => (0..rank).rev().collect(),
    }
}

pub(crate) fn transpose_forward(axes: &Option<Vec<usize>>, x: &Array) -> Result<Array, Error> {
    x.permute(&permutation(axes, x.ndim()))
}

pub(crate) fn transpose_gradients(
    axes: &Option<Vec<usize>>,
    grad: &Array,
) -> Result<Vec<Option<Array>>, Error> {
    let perm = permutation(axes, grad.ndim());
    let mut inverse = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inverse[p] = i;
    }
    Ok(vec![Some(grad.permute(&inverse)?)])
}

pub(crate) fn reshape_forward(shape: &[isize], x: &Array) -> Result<Array, Error> {
    let known: usize = shape.iter().filter(|&&d| d >= 0).map(|&d| d as usize).product();
    let resolved: Vec<usize> = shape
        .iter()
        .map(|&d| {
            if d >= 0 {
                Ok(d as usize)
            } else if known != 0 && x.size() % known == 0 {
                Ok(x.size() / known)
            } else {
                Err(Error::shape_mismatch(
                    "reshape",
                    x.shape(),
                    Shape::new(shape.iter().map(|&d| usize::try_from(d).ok()).collect()),
                ))
            }
        })
        .collect::<Result<_, _>>()?;
    x.reshape(&resolved)
}

pub(crate) fn squeeze_forward(axes: &[usize], x: &Array) -> Result<Array, Error> {
    let mut dims = Vec::with_capacity(x.ndim());
    for (i, &d) in x.shape().iter().enumerate() {
        if axes.contains(&i) {
            if d != 1 {
                return Err(Error::shape_mismatch("squeeze", x.shape(), vec![d]));
            }
        } else {
            dims.push(d);
        }
    }
    x.reshape(&dims)
}

/// Gradient of any op whose output is a rearrangement of its input's elements in order.
pub(crate) fn restore_shape(grad: &Array, x: &Array) -> Result<Vec<Option<Array>>, Error> {
    Ok(vec![Some(grad.reshape(x.shape())?)])
}

fn pad_region(widths: &[(usize, usize)], x_shape: &[usize]) -> Vec<SliceInfoElem> {
    widths
        .iter()
        .zip(x_shape)
        .map(|(&(before, _), &d)| SliceInfoElem::Slice {
            start: before as isize,
            end: Some((before + d) as isize),
            step: 1,
        })
        .collect()
}

pub(crate) fn pad_forward(widths: &[(usize, usize)], x: &Array) -> Result<Array, Error> {
    if widths.len() != x.ndim() {
        return Err(Error::InvalidOperation(format!(
            "pad widths {:?} do not match rank {}",
            widths,
            x.ndim()
        )));
    }
    let shape: Vec<usize> = x
        .shape()
        .iter()
        .zip(widths)
        .map(|(d, (before, after))| d + before + after)
        .collect();
    let mut padded = Array::zeros(&shape);
    padded.assign(&pad_region(widths, x.shape()), x)?;
    Ok(padded)
}

pub(crate) fn pad_gradients(
    widths: &[(usize, usize)],
    grad: &Array,
    x: &Array,
) -> Result<Vec<Option<Array>>, Error> {
    Ok(vec![Some(grad.slice(&pad_region(widths, x.shape())))])
}
