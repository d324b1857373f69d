//! Leaf and generator nodes: constants, placeholders and values derived from shapes or
//! randomness.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, IntoNode, NodeId, Op};
use crate::session::Feed;
use crate::shape::Shape;

use rand::Rng;

impl Graph {
    /// A node holding a fixed value.
    pub fn constant(&mut self, value: impl Into<Array>) -> NodeId {
        let value = value.into();
        let shape = Shape::from(value.shape());
        self.push(Op::Constant(value), Vec::new(), shape)
    }

    /// An input fed through [`crate::Bindings`]. `None` dimensions accept any size.
    pub fn placeholder(&mut self, shape: impl Into<Shape>) -> NodeId {
        self.push(Op::Placeholder, Vec::new(), shape.into())
    }

    pub fn ones(&mut self, shape: &[usize]) -> NodeId {
        self.constant(Array::ones(shape))
    }

    pub fn zeros(&mut self, shape: &[usize]) -> NodeId {
        self.constant(Array::zeros(shape))
    }

    /// Ones with the runtime shape of `x`. No gradient flows into `x`.
    pub fn ones_like(&mut self, x: NodeId) -> Result<NodeId, Error> {
        let shape = self.shape(x)?.clone();
        Ok(self.push(Op::OnesLike, vec![x], shape))
    }

    pub fn zeros_like(&mut self, x: NodeId) -> Result<NodeId, Error> {
        let shape = self.shape(x)?.clone();
        Ok(self.push(Op::ZerosLike, vec![x], shape))
    }

    /// Evenly spaced values in `[start, stop)`. The bounds are nodes, so the length is only
    /// known at evaluation.
    pub fn arange(
        &mut self,
        start: impl IntoNode,
        stop: impl IntoNode,
        step: impl IntoNode,
    ) -> Result<NodeId, Error> {
        let start = start.into_node(self)?;
        let stop = stop.into_node(self)?;
        let step = step.into_node(self)?;
        Ok(self.push(Op::Arange, vec![start, stop, step], Shape::new(vec![None])))
    }

    /// `arange(0, stop, 1)`.
    pub fn arange_to(&mut self, stop: impl IntoNode) -> Result<NodeId, Error> {
        self.arange(0.0, stop, 1.0)
    }

    /// Uniform samples in `[0, 1)`, drawn anew at every evaluation. Not differentiable.
    pub fn random(&mut self, shape: &[usize]) -> NodeId {
        self.push(Op::Random, Vec::new(), Shape::from(shape))
    }

    /// The runtime shape of `x` as a rank-1 tensor.
    pub fn shape_of(&mut self, x: NodeId) -> Result<NodeId, Error> {
        let rank = self.shape(x)?.rank();
        Ok(self.push(Op::ShapeOf, vec![x], Shape::new(vec![Some(rank)])))
    }
}

pub(crate) fn placeholder_forward(graph: &Graph, id: NodeId, feed: &Feed<'_>) -> Result<Array, Error> {
    let value = match feed.value(id) {
        Some(value) => value,
        None => return Err(Error::MissingBinding(graph.describe(id)?)),
    };
    let declared = graph.shape(id)?;
    if !declared.accepts(value.shape()) {
        return Err(Error::shape_mismatch(
            "placeholder",
            declared.clone(),
            value.shape(),
        ));
    }
    Ok(value.clone())
}

pub(crate) fn arange_forward(start: &Array, stop: &Array, step: &Array) -> Result<Array, Error> {
    let (start, stop, step) = (start.item()?, stop.item()?, step.item()?);
    if step == 0.0 {
        return Err(Error::InvalidOperation("arange step cannot be zero".to_string()));
    }
    let count = ((stop - start) / step).ceil().max(0.0) as usize;
    let values = (0..count).map(|i| start + i as f64 * step).collect();
    Array::from_vec(values, &[count])
}

pub(crate) fn random_forward(shape: &Shape) -> Result<Array, Error> {
    let dims = shape.to_concrete().ok_or_else(|| {
        Error::InvalidOperation(format!("random needs a concrete shape, got {}", shape))
    })?;
    let mut rng = rand::rng();
    let count: usize = dims.iter().product();
    let values = (0..count).map(|_| rng.random::<f64>()).collect();
    Array::from_vec(values, &dims)
}

pub(crate) fn shape_of_forward(x: &Array) -> Result<Array, Error> {
    let dims = x.shape().iter().map(|&d| d as f64).collect();
    Array::from_vec(dims, &[x.ndim()])
}
