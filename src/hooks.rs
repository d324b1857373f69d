//! Hook trait and implementations for observing forward evaluation.

use crate::array::Array;
use crate::graph::NodeId;

/// Called with a node's value each time its forward rule actually runs. Cache hits do not
/// trigger hooks.
pub trait Hook {
    fn call(&self, id: NodeId, value: &Array);
}

impl<F> Hook for F
where
    F: Fn(NodeId, &Array) + 'static,
{
    fn call(&self, id: NodeId, value: &Array) {
        (self)(id, value)
    }
}

/// An owned hook object wrapping a closure or function pointer.
///
/// # Example
/// ```rust
/// use auto_diff_graph::{Array, FnHook, Graph};
/// let mut graph = Graph::new();
/// let c = graph.constant(Array::ones(&[2]));
/// let hook = FnHook::new(|id, value: &Array| {
///     println!("Hook: node={}, shape={:?}", id, value.shape());
/// });
/// graph.register_hook(c, Box::new(hook)).unwrap();
/// ```
pub struct FnHook {
    func: Box<dyn Fn(NodeId, &Array)>,
}

impl FnHook {
    /// Creates a new `FnHook` from a closure or function pointer.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(NodeId, &Array) + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

impl Hook for FnHook {
    fn call(&self, id: NodeId, value: &Array) {
        (self.func)(id, value)
    }
}
