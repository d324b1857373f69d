//! Operation rules. Each submodule adds its constructors to [`Graph`] and provides the
//! forward and backward rules that the dispatch below routes to.

pub mod control;
pub mod custom;
pub mod dot;
pub mod elementwise;
pub mod index;
pub mod leaf;
pub mod reduce;
pub mod shape_ops;

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId, Op};
use crate::session::Feed;
use crate::variable::variable_forward;

impl Graph {
    /// Runs the forward rule of `id` on already evaluated input values.
    pub(crate) fn compute(
        &mut self,
        id: NodeId,
        inputs: &[&Array],
        feed: &Feed<'_>,
    ) -> Result<Array, Error> {
        // Stateful rules need the graph mutably.
        let op = &self.node(id)?.op;
        if matches!(op, Op::Variable(_)) {
            return variable_forward(self, id, feed);
        }
        if matches!(op, Op::WhileLoop(_)) {
            return control::while_loop_forward(self, id, feed);
        }
        if matches!(op, Op::MapFn(_)) {
            return control::map_fn_forward(self, id, feed);
        }

        let node = self.node(id)?;
        match &node.op {
            Op::Constant(value) => Ok(value.clone()),
            Op::Placeholder => leaf::placeholder_forward(self, id, feed),
            Op::OnesLike => Ok(Array::ones(inputs[0].shape())),
            Op::ZerosLike => Ok(Array::zeros(inputs[0].shape())),
            Op::Arange => leaf::arange_forward(inputs[0], inputs[1], inputs[2]),
            Op::Random => leaf::random_forward(&node.shape),
            Op::ShapeOf => leaf::shape_of_forward(inputs[0]),
            Op::InTrainPhase => Ok(Array::scalar(if feed.training() { 1.0 } else { 0.0 })),
            Op::Unary(op) => Ok(elementwise::unary_forward(*op, inputs[0])),
            Op::Binary(op) => elementwise::binary_forward(*op, inputs[0], inputs[1]),
            Op::Dot => dot::dot_forward(inputs[0], inputs[1]),
            Op::Reduce { op, axes } => reduce::reduce_forward(*op, axes, inputs[0]),
            Op::Argmax { axis } => reduce::argmax_forward(*axis, inputs[0]),
            Op::Transpose { axes } => shape_ops::transpose_forward(axes, inputs[0]),
            Op::Reshape { shape } => shape_ops::reshape_forward(shape, inputs[0]),
            Op::Flatten => inputs[0].reshape(&[inputs[0].size()]),
            Op::ExpandDims { axis } => inputs[0].insert_axis(*axis),
            Op::Squeeze { axes } => shape_ops::squeeze_forward(axes, inputs[0]),
            Op::Pad { widths } => shape_ops::pad_forward(widths, inputs[0]),
            Op::Getitem { index } => index::getitem_forward(index, inputs[0]),
            Op::Setitem { index } => index::setitem_forward(index, inputs[0], inputs[1]),
            Op::Where => inputs[0].select(inputs[1], inputs[2]),
            Op::Custom(custom) => {
                let output = custom.compute(inputs)?;
                if !node.shape.accepts(output.shape()) {
                    return Err(Error::shape_mismatch(
                        custom.kind(),
                        node.shape.clone(),
                        output.shape(),
                    ));
                }
                Ok(output)
            }
            Op::Variable(_) | Op::WhileLoop(_) | Op::MapFn(_) => Err(Error::InternalLogicError(
                format!("stateful node {} reached pure dispatch", id),
            )),
        }
    }

    /// Runs the backward rule of `id`, returning one gradient per input. Uses the values
    /// recorded by the last forward evaluation.
    pub(crate) fn gradients(&self, id: NodeId, grad: &Array) -> Result<Vec<Option<Array>>, Error> {
        let node = self.node(id)?;
        let inputs = node
            .inputs
            .iter()
            .map(|&input| self.value_of(input))
            .collect::<Result<Vec<&Array>, Error>>()?;
        let output = self.value_of(id)?;

        match &node.op {
            Op::Constant(_) | Op::Placeholder | Op::Variable(_) | Op::InTrainPhase => Ok(Vec::new()),
            Op::OnesLike | Op::ZerosLike => Ok(vec![None]),
            Op::Arange => Ok(vec![None, None, None]),
            Op::Random
            | Op::ShapeOf
            | Op::Argmax { .. }
            | Op::Setitem { .. }
            | Op::Binary(
                elementwise::BinaryOp::Equal
                | elementwise::BinaryOp::Less
                | elementwise::BinaryOp::Greater,
            ) => Err(Error::NotDifferentiable(self.describe(id)?)),
            Op::Unary(op) => elementwise::unary_gradients(*op, grad, inputs[0], output),
            Op::Binary(op) => elementwise::binary_gradients(*op, grad, inputs[0], inputs[1], output),
            Op::Dot => dot::dot_gradients(grad, inputs[0], inputs[1]),
            Op::Reduce { op, .. } => reduce::reduce_gradients(*op, grad, inputs[0], output),
            Op::Transpose { axes } => shape_ops::transpose_gradients(axes, grad),
            Op::Reshape { .. } | Op::Flatten | Op::ExpandDims { .. } | Op::Squeeze { .. } => {
                shape_ops::restore_shape(grad, inputs[0])
            }
            Op::Pad { widths } => shape_ops::pad_gradients(widths, grad, inputs[0]),
            Op::Getitem { index } => index::getitem_gradients(index, grad, inputs[0]),
            Op::Where => control::where_gradients(grad, inputs[0], inputs[1], inputs[2]),
            Op::WhileLoop(_) => control::unstack_gradients(grad, inputs.len(), 1),
            Op::MapFn(m) => {
                let stacked_axes = if m.outputs.is_some() { 2 } else { 1 };
                control::unstack_gradients(grad, inputs.len(), stacked_axes)
            }
            Op::Custom(custom) => custom.gradients(grad, &inputs, output),
        }
    }
}
