use crate::array::Array;
use crate::error::Error;

/// Compute the broadcasted shape for two concrete shapes, following numpy broadcasting rules.
pub fn broadcast_dims(a: &[usize], b: &[usize]) -> Result<Vec<usize>, Error> {
    let ndim = std::cmp::max(a.len(), b.len());
    let mut result = Vec::with_capacity(ndim);
    for i in 0..ndim {
        let a_dim = if i >= ndim - a.len() {
            a[i - (ndim - a.len())]
        } else {
            1
        };
        let b_dim = if i >= ndim - b.len() {
            b[i - (ndim - b.len())]
        } else {
            1
        };
        if a_dim == b_dim || a_dim == 1 || b_dim == 1 {
            result.push(if a_dim == 1 { b_dim } else { a_dim });
        } else {
            return Err(Error::shape_mismatch("broadcast", a, b));
        }
    }
    Ok(result)
}

/// Sums a gradient shaped like a broadcast result back down to `target`.
///
/// Leading axes that `target` lacks are summed away; axes where `target` has size 1 but the
/// gradient does not are summed with the axis kept.
pub fn reduce_gradient_to_shape(gradient: &Array, target: &[usize]) -> Result<Array, Error> {
    if gradient.shape() == target {
        return Ok(gradient.clone());
    }
    if target.is_empty() {
        return Ok(Array::scalar(gradient.sum()));
    }
    let rank = gradient.ndim();
    if rank < target.len() {
        return Err(Error::shape_mismatch(
            "reduce_gradient",
            gradient.shape(),
            target,
        ));
    }
    let extra = rank - target.len();
    let mut axes: Vec<usize> = (0..extra).collect();
    for (i, &dim) in target.iter().enumerate() {
        if dim == 1 && gradient.shape()[extra + i] != 1 {
            axes.push(extra + i);
        }
    }
    let summed = gradient.sum_axes_keepdims(&axes)?;
    let reduced = summed.reshape(&summed.shape()[extra..])?;
    if reduced.shape() != target {
        return Err(Error::shape_mismatch(
            "reduce_gradient",
            gradient.shape(),
            target,
        ));
    }
    Ok(reduced)
}
