//! Generalized dot product with NumPy `dot` semantics.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, IntoNode, NodeId, Op};
use crate::shape::{broadcast_shape, Shape};
use crate::util::reduce_gradient_to_shape;

use ndarray::{Array2, Ix1, Ix2};

impl Graph {
    /// Dot product of `x` and `y`.
    ///
    /// * a scalar operand multiplies elementwise;
    /// * `(k,) . (k,)` is the inner product;
    /// * `(..., k) . (k,)` contracts the last axis of `x`;
    /// * `(..., k) . (..., k, m)` contracts the last axis of `x` with the second-to-last
    ///   axis of `y`, giving `x.shape[:-1] + y.shape[:-2] + (m,)`.
    pub fn dot(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        let x = x.into_node(self)?;
        let y = y.into_node(self)?;
        let x_shape = self.shape(x)?.clone();
        let y_shape = self.shape(y)?.clone();
        let shape = dot_shape(&x_shape, &y_shape)?;
        Ok(self.push(Op::Dot, vec![x, y], shape))
    }
}

fn dot_shape(x: &Shape, y: &Shape) -> Result<Shape, Error> {
    if x.is_scalar() || y.is_scalar() {
        return broadcast_shape(x, y);
    }
    let xd = x.dims();
    let yd = y.dims();
    let k_x = xd[xd.len() - 1];
    let contracted = if yd.len() == 1 { 0 } else { yd.len() - 2 };
    let k_y = yd[contracted];
    if let (Some(a), Some(b)) = (k_x, k_y) {
        if a != b {
            return Err(Error::shape_mismatch("dot", x.clone(), y.clone()));
        }
    }
    let mut dims = xd[..xd.len() - 1].to_vec();
    if yd.len() > 1 {
        dims.extend_from_slice(&yd[..yd.len() - 2]);
        dims.push(yd[yd.len() - 1]);
    }
    Ok(Shape::new(dims))
}

fn as_matrix(a: &Array, rows: usize, cols: usize) -> Result<Array2<f64>, Error> {
    a.reshape(&[rows, cols])?
        .into_ndarray()
        .into_dimensionality::<Ix2>()
        .map_err(|e| Error::InternalLogicError(e.to_string()))
}

/// Splits `x` into `(prod(x.shape[:-1]), k)`.
fn x_matrix(x: &Array) -> Result<(Array2<f64>, usize), Error> {
    let k = x.shape()[x.ndim() - 1];
    let rows = x.shape()[..x.ndim() - 1].iter().product();
    Ok((as_matrix(x, rows, k)?, k))
}

/// Lays `y` of shape `(..., k, m)` out as `(k, prod(y.shape[:-2]) * m)`.
fn y_matrix(y: &Array) -> Result<(Array2<f64>, usize, usize, usize), Error> {
    let nd = y.ndim();
    let (k, m) = (y.shape()[nd - 2], y.shape()[nd - 1]);
    let batches: usize = y.shape()[..nd - 2].iter().product();
    let folded = y
        .reshape(&[batches, k, m])?
        .permute(&[1, 0, 2])?;
    Ok((as_matrix(&folded, k, batches * m)?, k, batches, m))
}

fn check_contraction(x: &Array, y: &Array, k_x: usize, k_y: usize) -> Result<(), Error> {
    if k_x != k_y {
        return Err(Error::shape_mismatch("dot", x.shape(), y.shape()));
    }
    Ok(())
}

pub(crate) fn dot_forward(x: &Array, y: &Array) -> Result<Array, Error> {
    if x.ndim() == 0 || y.ndim() == 0 {
        return x.zip_with(y, |a, b| a * b);
    }
    let lead = &x.shape()[..x.ndim() - 1];
    let (x2, k) = x_matrix(x)?;
    if y.ndim() == 1 {
        check_contraction(x, y, k, y.shape()[0])?;
        let y1 = y
            .get_data()
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|e| Error::InternalLogicError(e.to_string()))?;
        let product = Array::new(x2.dot(&y1).into_dyn());
        return product.reshape(lead);
    }
    let (y2, k_y, _, _) = y_matrix(y)?;
    check_contraction(x, y, k, k_y)?;
    let mut out_shape = lead.to_vec();
    out_shape.extend_from_slice(&y.shape()[..y.ndim() - 2]);
    out_shape.push(y.shape()[y.ndim() - 1]);
    Array::new(x2.dot(&y2).into_dyn()).reshape(&out_shape)
}

pub(crate) fn dot_gradients(grad: &Array, x: &Array, y: &Array) -> Result<Vec<Option<Array>>, Error> {
    if x.ndim() == 0 || y.ndim() == 0 {
        let grad_x = grad.zip_with(y, |g, b| g * b)?;
        let grad_y = grad.zip_with(x, |g, a| g * a)?;
        return Ok(vec![
            Some(reduce_gradient_to_shape(&grad_x, x.shape())?),
            Some(reduce_gradient_to_shape(&grad_y, y.shape())?),
        ]);
    }
    let (x2, k) = x_matrix(x)?;
    let rows = x2.nrows();
    if y.ndim() == 1 {
        // grad_x = g[..., None] * y; grad_y sums x * g[..., None] over the leading axes.
        let mut expanded_shape = grad.shape().to_vec();
        expanded_shape.push(1);
        let g_expanded = grad.reshape(&expanded_shape)?;
        let grad_x = g_expanded.zip_with(y, |g, b| g * b)?;
        let weighted = x.zip_with(&g_expanded, |a, g| a * g)?;
        let grad_y = weighted.reshape(&[rows, k])?.sum_axes_keepdims(&[0])?.reshape(&[k])?;
        return Ok(vec![Some(grad_x), Some(grad_y)]);
    }
    let (y2, _, batches, m) = y_matrix(y)?;
    let g2 = as_matrix(grad, rows, batches * m)?;
    let grad_x = Array::new(g2.dot(&y2.t()).into_dyn()).reshape(x.shape())?;
    let grad_y = Array::new(x2.t().dot(&g2).into_dyn())
        .reshape(&[k, batches, m])?
        .permute(&[1, 0, 2])?
        .reshape(y.shape())?;
    Ok(vec![Some(grad_x), Some(grad_y)])
}
