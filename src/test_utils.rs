use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId};
use crate::session::{Bindings, Feed};

use log::debug;

/// Checks the analytical gradients of `sum(output)` with respect to each of `variables`
/// against central differences.
///
/// # Arguments
/// * `graph`: the graph holding `output`. A `sum` node is added on top of `output`.
/// * `variables`: variables to perturb. They must not be overridden by `bindings`.
/// * `bindings`: placeholder values; any cache step they carry is ignored.
/// * `epsilon`: perturbation size (e.g. `1e-6`).
/// * `tolerance`: maximum allowed difference, relative for gradients larger than 1 and
///   absolute otherwise.
///
/// # Returns
/// * `Ok(())` if every element of every variable matches within `tolerance`.
/// * `Err(Error::GradientCheckError { .. })` describing the first variable that does not.
pub fn check_gradient(
    graph: &mut Graph,
    output: NodeId,
    variables: &[NodeId],
    bindings: &Bindings,
    epsilon: f64,
    tolerance: f64,
) -> Result<(), Error> {
    let loss = graph.sum(output, None, false)?;
    let feed = Feed {
        bindings,
        step: None,
    };

    graph.evaluate(loss, &feed)?;
    for &variable in variables {
        graph.clear_gradient(variable)?;
    }
    graph.backward(loss)?;

    for &variable in variables {
        let analytical = compute_analytical_gradient(graph, variable)?;
        let numerical = compute_numerical_gradient(graph, loss, variable, &feed, epsilon)?;
        debug!(
            "checking {} elements of {}",
            numerical.len(),
            graph.describe(variable)?
        );
        compare_gradients(&analytical, &numerical, tolerance)?;
    }
    Ok(())
}

fn compute_analytical_gradient(graph: &mut Graph, variable: NodeId) -> Result<Vec<f64>, Error> {
    match graph.gradient(variable)? {
        Some(grad) => Ok(grad.to_vec()),
        // No path from the loss: the gradient is zero.
        None => Ok(vec![0.0; graph.materialize(variable)?.size()]),
    }
}

fn compute_numerical_gradient(
    graph: &mut Graph,
    loss: NodeId,
    variable: NodeId,
    feed: &Feed<'_>,
    epsilon: f64,
) -> Result<Vec<f64>, Error> {
    let original = graph.materialize(variable)?;
    let original_data = original.to_vec();
    let mut numerical = Vec::with_capacity(original_data.len());

    for i in 0..original_data.len() {
        let mut data_plus = original_data.clone();
        data_plus[i] += epsilon;
        graph.update(variable, Array::from_vec(data_plus, original.shape())?)?;
        let loss_plus = graph.evaluate(loss, feed)?.item()?;

        let mut data_minus = original_data.clone();
        data_minus[i] -= epsilon;
        graph.update(variable, Array::from_vec(data_minus, original.shape())?)?;
        let loss_minus = graph.evaluate(loss, feed)?.item()?;

        numerical.push((loss_plus - loss_minus) / (2.0 * epsilon));
    }

    graph.update(variable, original)?;
    Ok(numerical)
}

fn compare_gradients(analytical: &[f64], numerical: &[f64], tolerance: f64) -> Result<(), Error> {
    if analytical.len() != numerical.len() {
        return Err(Error::InternalLogicError(format!(
            "Gradient size mismatch: analytical size={}, numerical size={}",
            analytical.len(),
            numerical.len()
        )));
    }

    let mut max_rel_err = 0.0;
    let mut max_abs_err = 0.0;
    let mut max_err_idx = 0;

    for (i, (a, n)) in analytical.iter().zip(numerical.iter()).enumerate() {
        let abs_err = (a - n).abs();
        // Relative above magnitude 1, absolute below it.
        let rel_err = abs_err / a.abs().max(n.abs()).max(1.0);

        if rel_err > max_rel_err {
            max_rel_err = rel_err;
            max_abs_err = abs_err;
            max_err_idx = i;
        }
    }

    if max_rel_err <= tolerance {
        Ok(())
    } else {
        Err(Error::GradientCheckError {
            analytical: analytical.to_vec(),
            numerical: numerical.to_vec(),
            max_rel_error: max_rel_err,
            max_abs_error: max_abs_err,
            at_index: max_err_idx,
        })
    }
}

/// Asserts that `a` and `b` have the same shape and elementwise differences below `tol`.
pub fn assert_array_close(a: &Array, b: &Array, tol: f64) {
    assert_eq!(a.shape(), b.shape(), "Shapes don't match");
    for (i, (a_val, b_val)) in a.to_vec().iter().zip(b.to_vec().iter()).enumerate() {
        assert!(
            (a_val - b_val).abs() < tol,
            "Values at index {i} aren't close enough: a={a_val}, b={b_val}, diff={}, tol={tol}",
            (a_val - b_val).abs()
        );
    }
}
