//! Forward evaluation: input bindings, the per-step cache and the `Session` driver.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, NodeId};

use log::{debug, trace};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Values bound to placeholders (or overriding variables) for one evaluation, plus the
/// training-phase flag read by `in_train_phase` nodes.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<NodeId, Array>,
    training: bool,
    step: Option<u64>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Bindings::insert`].
    pub fn bind(mut self, id: NodeId, value: impl Into<Array>) -> Self {
        self.insert(id, value);
        self
    }

    pub fn insert(&mut self, id: NodeId, value: impl Into<Array>) {
        self.values.insert(id, value.into());
    }

    pub fn get(&self, id: NodeId) -> Option<&Array> {
        self.values.get(&id)
    }

    pub fn training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Pins the evaluation to a cache step, as [`Session::run`] does.
    pub fn at_step(mut self, step: u64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn step(&self) -> Option<u64> {
        self.step
    }
}

/// What one evaluation sees: the caller's bindings and the active cache step, if any.
pub struct Feed<'a> {
    pub(crate) bindings: &'a Bindings,
    pub(crate) step: Option<u64>,
}

impl<'a> Feed<'a> {
    pub(crate) fn new(bindings: &'a Bindings) -> Self {
        Self {
            bindings,
            step: bindings.step,
        }
    }

    pub(crate) fn value(&self, id: NodeId) -> Option<&'a Array> {
        self.bindings.values.get(&id)
    }

    pub(crate) fn training(&self) -> bool {
        self.bindings.training
    }
}

impl Graph {
    /// Evaluates `id` against `bindings`.
    ///
    /// When the bindings carry a step, nodes already evaluated at that step are served from
    /// their cache. Evaluation uses an explicit stack, so graph depth is not bounded by the
    /// call stack.
    pub fn forward(&mut self, id: NodeId, bindings: &Bindings) -> Result<Array, Error> {
        self.evaluate(id, &Feed::new(bindings))
    }

    pub(crate) fn evaluate(&mut self, root: NodeId, feed: &Feed<'_>) -> Result<Array, Error> {
        self.node(root)?;
        let mut values: HashMap<NodeId, Array> = HashMap::new();
        let mut visiting: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![(root, false)];

        while let Some((id, expanded)) = stack.pop() {
            if values.contains_key(&id) {
                continue;
            }
            if !expanded {
                if let Some(cached) = self.cached(id, feed.step)? {
                    trace!("cache hit for {} at step {:?}", id, feed.step);
                    values.insert(id, cached);
                    continue;
                }
                if !visiting.insert(id) {
                    return Err(Error::CycleDetected(id.0));
                }
                stack.push((id, true));
                let node = self.node(id)?;
                if !node.op.owns_inputs() {
                    for &input in node.inputs.iter().rev() {
                        if !values.contains_key(&input) {
                            stack.push((input, false));
                        }
                    }
                }
                continue;
            }

            visiting.remove(&id);
            let node = self.node(id)?;
            let inputs = if node.op.owns_inputs() {
                Vec::new()
            } else {
                node.inputs.clone()
            };
            let output = {
                let input_values = inputs
                    .iter()
                    .map(|input| {
                        values.get(input).ok_or_else(|| {
                            Error::InternalLogicError(format!(
                                "input {} of {} was not evaluated",
                                input, id
                            ))
                        })
                    })
                    .collect::<Result<Vec<&Array>, Error>>()?;
                self.compute(id, &input_values, feed)?
            };
            trace!("evaluated {} with shape {:?}", id, output.shape());
            self.record(id, &output, feed.step)?;
            values.insert(id, output);
        }

        values.remove(&root).ok_or_else(|| {
            Error::InternalLogicError(format!("root {} was not evaluated", root))
        })
    }

    fn cached(&self, id: NodeId, step: Option<u64>) -> Result<Option<Array>, Error> {
        let node = self.node(id)?;
        match (step, node.cache_step) {
            (Some(step), Some(cached)) if step == cached && node.op.cacheable() => {
                Ok(node.value.clone())
            }
            _ => Ok(None),
        }
    }

    fn record(&mut self, id: NodeId, output: &Array, step: Option<u64>) -> Result<(), Error> {
        let node = self.node_mut(id)?;
        node.value = Some(output.clone());
        node.cache_step = if node.op.cacheable() { step } else { None };
        self.run_hooks(id, output);
        Ok(())
    }
}

/// A collection of nodes that can be fetched in one [`Session::run`] call.
pub trait Fetch {
    type Output;

    fn fetch(&self, graph: &mut Graph, feed: &Feed<'_>) -> Result<Self::Output, Error>;
}

impl Fetch for NodeId {
    type Output = Array;

    fn fetch(&self, graph: &mut Graph, feed: &Feed<'_>) -> Result<Array, Error> {
        graph.evaluate(*self, feed)
    }
}

impl Fetch for [NodeId] {
    type Output = Vec<Array>;

    fn fetch(&self, graph: &mut Graph, feed: &Feed<'_>) -> Result<Vec<Array>, Error> {
        self.iter().map(|id| graph.evaluate(*id, feed)).collect()
    }
}

impl<const N: usize> Fetch for [NodeId; N] {
    type Output = Vec<Array>;

    fn fetch(&self, graph: &mut Graph, feed: &Feed<'_>) -> Result<Vec<Array>, Error> {
        self.as_slice().fetch(graph, feed)
    }
}

impl Fetch for Vec<NodeId> {
    type Output = Vec<Array>;

    fn fetch(&self, graph: &mut Graph, feed: &Feed<'_>) -> Result<Vec<Array>, Error> {
        self.as_slice().fetch(graph, feed)
    }
}

impl<K: Clone + Ord> Fetch for BTreeMap<K, NodeId> {
    type Output = BTreeMap<K, Array>;

    fn fetch(&self, graph: &mut Graph, feed: &Feed<'_>) -> Result<Self::Output, Error> {
        self.iter()
            .map(|(key, id)| -> Result<(K, Array), Error> {
                Ok((key.clone(), graph.evaluate(*id, feed)?))
            })
            .collect()
    }
}

impl<K: Clone + Eq + std::hash::Hash> Fetch for HashMap<K, NodeId> {
    type Output = HashMap<K, Array>;

    fn fetch(&self, graph: &mut Graph, feed: &Feed<'_>) -> Result<Self::Output, Error> {
        self.iter()
            .map(|(key, id)| -> Result<(K, Array), Error> {
                Ok((key.clone(), graph.evaluate(*id, feed)?))
            })
            .collect()
    }
}

/// Drives evaluation rounds. Each [`Session::prepare`] starts a new step; within a step,
/// every node is computed at most once no matter how many paths reach it.
#[derive(Debug, Default)]
pub struct Session {
    step: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Starts a new evaluation round.
    pub fn prepare(&mut self) {
        self.step += 1;
        debug!("session advanced to step {}", self.step);
    }

    /// Evaluates `fetches` at the current step. Each fetched node is evaluated independently;
    /// shared sub-graphs are served from the step cache.
    pub fn run<F: Fetch + ?Sized>(
        &self,
        graph: &mut Graph,
        fetches: &F,
        bindings: &Bindings,
    ) -> Result<F::Output, Error> {
        let feed = Feed {
            bindings,
            step: Some(self.step),
        };
        fetches.fetch(graph, &feed)
    }
}
