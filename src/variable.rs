//! Variables: leaves with mutable, trainable contents.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId, Op};
use crate::session::Feed;
use crate::shape::Shape;

use log::debug;
use std::fmt;
use std::rc::Rc;

/// Produces an initial value for a lazily materialized variable from its declared shape.
pub type Initializer = Rc<dyn Fn(&[usize]) -> Result<Array, Error>>;

/// Contents of a variable: a materialized value, or an initializer run on first forward.
pub struct VariableState {
    value: Option<Array>,
    initializer: Option<Initializer>,
}

impl VariableState {
    pub fn is_materialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Array> {
        self.value.as_ref()
    }
}

impl fmt::Debug for VariableState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VariableState")
            .field("value", &self.value)
            .field("lazy", &self.initializer.is_some())
            .finish()
    }
}

impl Graph {
    /// Creates a variable holding `value`. A plain `f64` makes a scalar variable.
    pub fn variable(&mut self, value: impl Into<Array>) -> NodeId {
        let value = value.into();
        let shape = Shape::from(value.shape());
        let state = VariableState {
            value: Some(value),
            initializer: None,
        };
        self.push(Op::Variable(state), Vec::new(), shape)
    }

    /// Creates a variable whose value is produced by `initializer` on first forward.
    pub fn variable_with_initializer<F>(&mut self, shape: &[usize], initializer: F) -> NodeId
    where
        F: Fn(&[usize]) -> Result<Array, Error> + 'static,
    {
        let state = VariableState {
            value: None,
            initializer: Some(Rc::new(initializer)),
        };
        self.push(Op::Variable(state), Vec::new(), Shape::from(shape))
    }

    fn variable_state_mut(&mut self, id: NodeId) -> Result<(&Shape, &mut VariableState), Error> {
        let node = self.node_mut(id)?;
        match &mut node.op {
            Op::Variable(state) => Ok((&node.shape, state)),
            other => Err(Error::InvalidOperation(format!(
                "{} is not a variable",
                other
            ))),
        }
    }

    /// Replaces the contents of a variable. The new value must have the declared shape.
    pub fn update(&mut self, id: NodeId, value: impl Into<Array>) -> Result<(), Error> {
        let value = value.into();
        let (shape, state) = self.variable_state_mut(id)?;
        if !shape.accepts(value.shape()) {
            return Err(Error::shape_mismatch("update", shape.clone(), value.shape()));
        }
        state.value = Some(value);
        // A stale cached forward value must not outlive an update.
        self.node_mut(id)?.cache_step = None;
        Ok(())
    }

    /// Adds `delta` to the contents of a variable, materializing it first if needed.
    pub fn update_add(&mut self, id: NodeId, delta: impl Into<Array>) -> Result<(), Error> {
        let delta = delta.into();
        let current = self.materialize(id)?;
        if current.shape() != delta.shape() {
            return Err(Error::shape_mismatch("update_add", current.shape(), delta.shape()));
        }
        let updated = current.zip_with(&delta, |a, b| a + b)?;
        self.update(id, updated)
    }

    /// Resets the accumulated gradient of `id`.
    pub fn clear_gradient(&mut self, id: NodeId) -> Result<(), Error> {
        self.node_mut(id)?.grad = None;
        Ok(())
    }

    /// Resets the accumulated gradients of every node.
    pub fn clear_gradients(&mut self) {
        for node in &mut self.nodes {
            node.grad = None;
        }
    }

    /// Ids of all variables in creation order.
    pub fn variables(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node.op, Op::Variable(_)))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// The current contents of a variable, running its initializer if it has not run yet.
    pub fn materialize(&mut self, id: NodeId) -> Result<Array, Error> {
        let (shape, state) = self.variable_state_mut(id)?;
        if let Some(value) = &state.value {
            return Ok(value.clone());
        }
        let dims = shape.to_concrete().ok_or_else(|| {
            Error::InitializationError(format!("variable shape {} is not fully known", shape))
        })?;
        let initializer = state.initializer.clone().ok_or_else(|| {
            Error::InternalLogicError("variable has neither value nor initializer".to_string())
        })?;
        let value = initializer(&dims)?;
        if value.shape() != dims.as_slice() {
            return Err(Error::shape_mismatch("initializer", dims.as_slice(), value.shape()));
        }
        debug!("materialized variable {} with shape {:?}", id, dims);
        state.value = Some(value.clone());
        Ok(value)
    }
}

/// Forward rule for variables: a bound value overrides the stored contents.
pub(crate) fn variable_forward(graph: &mut Graph, id: NodeId, feed: &Feed<'_>) -> Result<Array, Error> {
    if let Some(bound) = feed.value(id) {
        let shape = graph.shape(id)?;
        if !shape.accepts(bound.shape()) {
            return Err(Error::shape_mismatch("bind", shape.clone(), bound.shape()));
        }
        return Ok(bound.clone());
    }
    graph.materialize(id)
}
