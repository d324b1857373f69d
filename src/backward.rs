//! The reverse pass.
//!
//! A node's backward rule runs only after every consumer reachable from the root has
//! routed its gradient into it, so each rule sees the complete sum of its upstream
//! contributions exactly once.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId, Op};

use log::{debug, trace};
use std::collections::{HashMap, VecDeque};

impl Graph {
    /// Backpropagates from `root`, seeding it with ones shaped like its last forward value.
    ///
    /// Gradients of reachable non-variable nodes are recomputed from scratch; variable
    /// gradients accumulate across passes until [`Graph::clear_gradient`].
    pub fn backward(&mut self, root: NodeId) -> Result<(), Error> {
        let seed = Array::ones(self.value_of(root)?.shape());
        self.backward_with(root, seed)
    }

    /// Backpropagates from `root` with an explicit seed gradient.
    pub fn backward_with(&mut self, root: NodeId, seed: impl Into<Array>) -> Result<(), Error> {
        let seed = seed.into();
        let root_shape = self.value_of(root)?.shape().to_vec();
        if seed.shape() != root_shape.as_slice() {
            return Err(Error::shape_mismatch("backward", root_shape, seed.shape()));
        }

        let mut pending = self.consumer_counts(root)?;
        if pending.get(&root).copied().unwrap_or(0) > 0 {
            return Err(Error::CycleDetected(root.0));
        }
        for &id in pending.keys() {
            let node = self.node_mut(id)?;
            if !matches!(node.op, Op::Variable(_)) {
                node.grad = None;
            }
        }
        self.accumulate(root, seed)?;

        let mut ready = VecDeque::from([root]);
        let mut processed = 0usize;
        while let Some(id) = ready.pop_front() {
            processed += 1;
            if let Some(grad) = self.node(id)?.grad.clone() {
                let routed = self.gradients(id, &grad)?;
                let inputs = self.inputs(id)?.to_vec();
                if routed.len() != inputs.len() {
                    return Err(Error::InternalLogicError(format!(
                        "{} produced {} gradients for {} inputs",
                        self.describe(id)?,
                        routed.len(),
                        inputs.len()
                    )));
                }
                for (&input, gradient) in inputs.iter().zip(routed) {
                    if let Some(gradient) = gradient {
                        let expected = self.value_of(input)?.shape();
                        if gradient.shape() != expected {
                            return Err(Error::shape_mismatch(
                                self.node(id)?.op.func_name(),
                                expected,
                                gradient.shape(),
                            ));
                        }
                        self.accumulate(input, gradient)?;
                    }
                }
            } else {
                trace!("{} received no gradient", id);
            }

            for &input in self.inputs(id)? {
                let count = pending.get_mut(&input).ok_or_else(|| {
                    Error::InternalLogicError(format!("{} was not discovered", input))
                })?;
                if *count == 0 {
                    return Err(Error::CycleDetected(input.0));
                }
                *count -= 1;
                if *count == 0 {
                    ready.push_back(input);
                }
            }
        }

        if processed < pending.len() {
            let stuck = pending
                .iter()
                .find(|(_, count)| **count > 0)
                .map(|(id, _)| id.0)
                .unwrap_or(root.0);
            return Err(Error::CycleDetected(stuck));
        }
        debug!("backward from {} visited {} nodes", root, processed);
        Ok(())
    }

    /// Number of edges from reachable consumers into every node reachable from `root`.
    fn consumer_counts(&self, root: NodeId) -> Result<HashMap<NodeId, usize>, Error> {
        let mut counts = HashMap::from([(root, 0usize)]);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for &input in self.inputs(id)? {
                let count = counts.entry(input).or_insert_with(|| {
                    stack.push(input);
                    0
                });
                *count += 1;
            }
        }
        Ok(counts)
    }

    fn accumulate(&mut self, id: NodeId, gradient: Array) -> Result<(), Error> {
        let node = self.node_mut(id)?;
        node.grad = match node.grad.take() {
            Some(existing) => Some(existing.zip_with(&gradient, |a, b| a + b)?),
            None => Some(gradient),
        };
        Ok(())
    }
}
