//! Selection and control flow: `where`, the training-phase switch, `while_loop` and `map_fn`.
//!
//! `while_loop` and `map_fn` build sub-nodes while they are evaluated. The generated
//! per-step nodes become the inputs of the control node, so gradients reach them through
//! the ordinary scheduler.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, IntoNode, NodeId, Op};
use crate::ops::index::IndexItem;
use crate::session::Feed;
use crate::shape::{broadcast_shape, Shape};
use crate::util::reduce_gradient_to_shape;

use log::debug;
use std::rc::Rc;

/// Builds the loop condition (a scalar node) from the current loop variables.
pub type CondFn = Rc<dyn Fn(&mut Graph, &[NodeId]) -> Result<NodeId, Error>>;

/// Builds new nodes from existing ones: a loop body, or the function mapped by `map_fn`.
pub type GraphFn = Rc<dyn Fn(&mut Graph, &[NodeId]) -> Result<Vec<NodeId>, Error>>;

pub struct WhileLoop {
    pub(crate) cond: CondFn,
    pub(crate) body: GraphFn,
    pub(crate) loop_vars: Vec<NodeId>,
    pub(crate) output_index: usize,
    /// `conds[k]` tests the loop variables after `k` iterations.
    pub(crate) conds: Vec<NodeId>,
    /// `steps[k]` holds the loop variables after iteration `k`.
    pub(crate) steps: Vec<Vec<NodeId>>,
}

pub struct MapFn {
    pub(crate) func: GraphFn,
    pub(crate) elems: Vec<NodeId>,
    /// `None` for a function with a single output.
    pub(crate) outputs: Option<usize>,
    pub(crate) element_shape: Shape,
    /// `applied[i]` holds the results of the function on slice `i`.
    pub(crate) applied: Vec<Vec<NodeId>>,
}

impl Graph {
    /// Picks `x` where `cond` is non-zero and `y` elsewhere, broadcasting all three.
    pub fn where_(
        &mut self,
        cond: NodeId,
        x: impl IntoNode,
        y: impl IntoNode,
    ) -> Result<NodeId, Error> {
        let x = x.into_node(self)?;
        let y = y.into_node(self)?;
        let shape = broadcast_shape(
            &broadcast_shape(self.shape(cond)?, self.shape(x)?)?,
            self.shape(y)?,
        )?;
        Ok(self.push(Op::Where, vec![cond, x, y], shape))
    }

    /// A scalar that is `1.0` when the bindings mark the training phase. Never cached.
    pub fn in_train_phase(&mut self) -> NodeId {
        self.push(Op::InTrainPhase, Vec::new(), Shape::scalar())
    }

    /// `train` during the training phase, `test` otherwise.
    pub fn in_train_phase_select(
        &mut self,
        train: impl IntoNode,
        test: impl IntoNode,
    ) -> Result<NodeId, Error> {
        let flag = self.in_train_phase();
        self.where_(flag, train, test)
    }

    /// Repeats `body` while `cond` holds and stacks every value taken by
    /// `loop_vars[output_index]` along a new leading axis of unknown length.
    pub fn while_loop<C, B>(
        &mut self,
        cond: C,
        body: B,
        loop_vars: &[NodeId],
        output_index: isize,
    ) -> Result<NodeId, Error>
    where
        C: Fn(&mut Graph, &[NodeId]) -> Result<NodeId, Error> + 'static,
        B: Fn(&mut Graph, &[NodeId]) -> Result<Vec<NodeId>, Error> + 'static,
    {
        let count = loop_vars.len() as isize;
        let resolved = if output_index < 0 {
            output_index + count
        } else {
            output_index
        };
        if resolved < 0 || resolved >= count {
            return Err(Error::IndexOutOfBounds {
                index: output_index,
                size: loop_vars.len(),
            });
        }
        let output_index = resolved as usize;
        let mut shape = self.shape(loop_vars[output_index])?.clone();
        shape.insert(0, None);
        let op = Op::WhileLoop(WhileLoop {
            cond: Rc::new(cond),
            body: Rc::new(body),
            loop_vars: loop_vars.to_vec(),
            output_index,
            conds: Vec::new(),
            steps: Vec::new(),
        });
        Ok(self.push(op, Vec::new(), shape))
    }

    /// Applies `func` to each leading-axis slice of `elems` (aligned across all of them) and
    /// stacks the results.
    pub fn map_fn<F>(&mut self, func: F, elems: &[NodeId]) -> Result<NodeId, Error>
    where
        F: Fn(&mut Graph, &[NodeId]) -> Result<NodeId, Error> + 'static,
    {
        let wrapped: GraphFn = Rc::new(move |graph: &mut Graph, slices: &[NodeId]| {
            Ok(vec![func(graph, slices)?])
        });
        self.build_map_fn(wrapped, elems, None)
    }

    /// Like [`Graph::map_fn`] for a function with `outputs` results; the stacked shape is
    /// `(outputs, n) + output_shape`.
    pub fn map_fn_multi<F>(&mut self, func: F, elems: &[NodeId], outputs: usize) -> Result<NodeId, Error>
    where
        F: Fn(&mut Graph, &[NodeId]) -> Result<Vec<NodeId>, Error> + 'static,
    {
        self.build_map_fn(Rc::new(func), elems, Some(outputs))
    }

    fn build_map_fn(
        &mut self,
        func: GraphFn,
        elems: &[NodeId],
        outputs: Option<usize>,
    ) -> Result<NodeId, Error> {
        let first = *elems.first().ok_or_else(|| {
            Error::InvalidOperation("map_fn needs at least one sequence".to_string())
        })?;
        let length = self
            .shape(first)?
            .dims()
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidOperation("map_fn over a scalar".to_string()))?;
        for &elem in elems {
            let dims = self.shape(elem)?.dims();
            match (dims.first(), length) {
                (None, _) => {
                    return Err(Error::InvalidOperation("map_fn over a scalar".to_string()))
                }
                (Some(Some(a)), Some(b)) if *a != b => {
                    return Err(Error::shape_mismatch(
                        "map_fn",
                        self.shape(first)?.clone(),
                        self.shape(elem)?.clone(),
                    ))
                }
                _ => {}
            }
        }

        // Apply once to the first slices to infer the element shape.
        let first_slices = elems
            .iter()
            .map(|&e| self.getitem(e, &[IndexItem::At(0)]))
            .collect::<Result<Vec<_>, _>>()?;
        let results = func(self, &first_slices)?;
        if outputs == Some(0) {
            return Err(Error::InvalidOperation(
                "map_fn needs at least one output".to_string(),
            ));
        }
        let expected = outputs.unwrap_or(1);
        if results.len() != expected {
            return Err(Error::InvalidOperation(format!(
                "map_fn function returned {} outputs, expected {}",
                results.len(),
                expected
            )));
        }
        let element_shape = self.shape(results[0])?.clone();
        for &result in &results[1..] {
            if self.shape(result)? != &element_shape {
                return Err(Error::shape_mismatch(
                    "map_fn",
                    element_shape,
                    self.shape(result)?.clone(),
                ));
            }
        }

        let mut shape = element_shape.clone();
        shape.insert(0, length);
        if let Some(n) = outputs {
            shape.insert(0, Some(n));
        }
        let op = Op::MapFn(MapFn {
            func,
            elems: elems.to_vec(),
            outputs,
            element_shape,
            applied: vec![results],
        });
        Ok(self.push(op, Vec::new(), shape))
    }
}

pub(crate) fn where_gradients(
    grad: &Array,
    cond: &Array,
    x: &Array,
    y: &Array,
) -> Result<Vec<Option<Array>>, Error> {
    let zero = Array::scalar(0.0);
    let grad_x = cond.select(grad, &zero)?;
    let grad_y = cond.select(&zero, grad)?;
    Ok(vec![
        None,
        Some(reduce_gradient_to_shape(&grad_x, x.shape())?),
        Some(reduce_gradient_to_shape(&grad_y, y.shape())?),
    ])
}

fn truthy(value: &Array) -> Result<bool, Error> {
    Ok(value.item()? != 0.0)
}

fn while_loop_state(graph: &mut Graph, id: NodeId) -> Result<&mut WhileLoop, Error> {
    match &mut graph.node_mut(id)?.op {
        Op::WhileLoop(w) => Ok(w),
        other => Err(Error::InternalLogicError(format!(
            "{} is not a while_loop",
            other
        ))),
    }
}

/// The condition node for the variables after `k` iterations, built on first use.
fn while_loop_cond(graph: &mut Graph, id: NodeId, k: usize, vars: &[NodeId]) -> Result<NodeId, Error> {
    let state = while_loop_state(graph, id)?;
    if let Some(&cond) = state.conds.get(k) {
        return Ok(cond);
    }
    let cond = Rc::clone(&state.cond);
    let node = cond(graph, vars)?;
    while_loop_state(graph, id)?.conds.push(node);
    Ok(node)
}

/// The loop variables after iteration `k`, built on first use.
fn while_loop_step(
    graph: &mut Graph,
    id: NodeId,
    k: usize,
    vars: &[NodeId],
) -> Result<Vec<NodeId>, Error> {
    let state = while_loop_state(graph, id)?;
    if let Some(next) = state.steps.get(k) {
        return Ok(next.clone());
    }
    let body = Rc::clone(&state.body);
    let next = body(graph, vars)?;
    if next.len() != vars.len() {
        return Err(Error::InvalidOperation(format!(
            "while_loop body returned {} variables, expected {}",
            next.len(),
            vars.len()
        )));
    }
    while_loop_state(graph, id)?.steps.push(next.clone());
    Ok(next)
}

pub(crate) fn while_loop_forward(
    graph: &mut Graph,
    id: NodeId,
    feed: &Feed<'_>,
) -> Result<Array, Error> {
    let state = while_loop_state(graph, id)?;
    let mut vars = state.loop_vars.clone();
    let output_index = state.output_index;

    // Sub-nodes built by earlier evaluations are reused; new ones are only built when the
    // loop runs longer than before.
    let mut tracked = Vec::new();
    let mut outputs = Vec::new();
    loop {
        let k = tracked.len();
        let condition = while_loop_cond(graph, id, k, &vars)?;
        if !truthy(&graph.evaluate(condition, feed)?)? {
            break;
        }
        vars = while_loop_step(graph, id, k, &vars)?;
        outputs.push(graph.evaluate(vars[output_index], feed)?);
        tracked.push(vars[output_index]);
    }
    debug!("while_loop {} unrolled {} steps", id, tracked.len());

    let empty_shape = if outputs.is_empty() {
        graph.evaluate(vars[output_index], feed)?.shape().to_vec()
    } else {
        Vec::new()
    };
    graph.node_mut(id)?.inputs = tracked;
    Array::stack(&outputs, &empty_shape)
}

pub(crate) fn map_fn_forward(graph: &mut Graph, id: NodeId, feed: &Feed<'_>) -> Result<Array, Error> {
    let (elems, outputs, element_shape) = match &graph.node(id)?.op {
        Op::MapFn(m) => (m.elems.clone(), m.outputs, m.element_shape.clone()),
        other => {
            return Err(Error::InternalLogicError(format!(
                "map_fn_forward called on {}",
                other
            )))
        }
    };

    let mut length = None;
    for &elem in &elems {
        let value = graph.evaluate(elem, feed)?;
        let n = value.shape().first().copied().ok_or_else(|| {
            Error::InvalidOperation("map_fn over a scalar".to_string())
        })?;
        match length {
            Some(expected) if expected != n => {
                return Err(Error::shape_mismatch("map_fn", vec![expected], vec![n]))
            }
            _ => length = Some(n),
        }
    }
    let length = length.unwrap_or(0);
    let width = outputs.unwrap_or(1);

    // per_output[k][i] is output k of the application to slice i.
    let mut per_output: Vec<Vec<NodeId>> = vec![Vec::with_capacity(length); width];
    for i in 0..length {
        let results = map_fn_application(graph, id, &elems, i)?;
        if results.len() != width {
            return Err(Error::InvalidOperation(format!(
                "map_fn function returned {} outputs, expected {}",
                results.len(),
                width
            )));
        }
        for (k, result) in results.into_iter().enumerate() {
            per_output[k].push(result);
        }
    }

    let inputs: Vec<NodeId> = per_output.into_iter().flatten().collect();
    let values = inputs
        .iter()
        .map(|&node| graph.evaluate(node, feed))
        .collect::<Result<Vec<_>, _>>()?;
    graph.node_mut(id)?.inputs = inputs;

    let fallback: Vec<usize> = element_shape.dims().iter().map(|d| d.unwrap_or(0)).collect();
    let stacked = Array::stack(&values, &fallback)?;
    match outputs {
        None => Ok(stacked),
        Some(n) => {
            let mut shape = vec![n, length];
            shape.extend_from_slice(&stacked.shape()[1..]);
            stacked.reshape(&shape)
        }
    }
}

fn map_fn_state(graph: &mut Graph, id: NodeId) -> Result<&mut MapFn, Error> {
    match &mut graph.node_mut(id)?.op {
        Op::MapFn(m) => Ok(m),
        other => Err(Error::InternalLogicError(format!("{} is not a map_fn", other))),
    }
}

/// The results of the function on slice `i`, built on first use. Slices are built in
/// order, so `i` never skips past the applications already recorded.
fn map_fn_application(
    graph: &mut Graph,
    id: NodeId,
    elems: &[NodeId],
    i: usize,
) -> Result<Vec<NodeId>, Error> {
    let state = map_fn_state(graph, id)?;
    if let Some(results) = state.applied.get(i) {
        return Ok(results.clone());
    }
    let func = Rc::clone(&state.func);
    let slices = elems
        .iter()
        .map(|&e| graph.getitem(e, &[IndexItem::At(i as isize)]))
        .collect::<Result<Vec<_>, _>>()?;
    let results = func(graph, &slices)?;
    map_fn_state(graph, id)?.applied.push(results.clone());
    Ok(results)
}

/// Splits the gradient of a stacked output into one slice per generated sub-node.
/// `stacked_axes` is 2 for multi-output `map_fn`, whose `(outputs, n)` axes fold into one.
pub(crate) fn unstack_gradients(
    grad: &Array,
    parts: usize,
    stacked_axes: usize,
) -> Result<Vec<Option<Array>>, Error> {
    if grad.ndim() < stacked_axes {
        return Err(Error::InternalLogicError(format!(
            "cannot unstack a gradient of rank {}",
            grad.ndim()
        )));
    }
    let mut shape = vec![parts];
    shape.extend_from_slice(&grad.shape()[stacked_axes..]);
    let folded = grad.reshape(&shape)?;
    Ok((0..parts).map(|i| Some(folded.index_axis0(i))).collect())
}
