//! User-defined operations.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId, Op};
use crate::shape::Shape;

use std::rc::Rc;

/// An operation defined outside the crate. Every rule defaults to
/// [`Error::NotImplemented`], so a partial implementation fails loudly when the missing
/// rule is needed.
pub trait Operation {
    /// Function name used in derived node names.
    fn kind(&self) -> &str;

    fn shape(&self, inputs: &[&Shape]) -> Result<Shape, Error> {
        let _ = inputs;
        Err(Error::NotImplemented(format!("shape rule of {}", self.kind())))
    }

    fn compute(&self, inputs: &[&Array]) -> Result<Array, Error> {
        let _ = inputs;
        Err(Error::NotImplemented(format!("forward rule of {}", self.kind())))
    }

    /// One gradient per input (`None` when nothing flows into it).
    fn gradients(
        &self,
        grad: &Array,
        inputs: &[&Array],
        output: &Array,
    ) -> Result<Vec<Option<Array>>, Error> {
        let _ = (grad, inputs, output);
        Err(Error::NotImplemented(format!("backward rule of {}", self.kind())))
    }
}

impl Graph {
    pub fn custom(
        &mut self,
        op: impl Operation + 'static,
        inputs: &[NodeId],
    ) -> Result<NodeId, Error> {
        let shape = {
            let shapes = inputs
                .iter()
                .map(|&input| self.shape(input))
                .collect::<Result<Vec<_>, _>>()?;
            op.shape(&shapes)?
        };
        Ok(self.push(Op::Custom(Rc::new(op)), inputs.to_vec(), shape))
    }
}
