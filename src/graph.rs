use crate::array::Array;
use crate::error::Error;
use crate::hooks::Hook;
use crate::ops::control::{MapFn, WhileLoop};
use crate::ops::custom::Operation;
use crate::ops::elementwise::{BinaryOp, UnaryOp};
use crate::ops::index::{format_index, IndexItem};
use crate::ops::reduce::ReduceOp;
use crate::shape::Shape;
use crate::variable::VariableState;

use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Handle to a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of operation kinds. Each kind supplies a shape rule (at construction), a
/// forward rule and a backward rule (see `ops`).
pub enum Op {
    Constant(Array),
    Placeholder,
    Variable(VariableState),
    OnesLike,
    ZerosLike,
    Arange,
    Random,
    ShapeOf,
    InTrainPhase,
    Unary(UnaryOp),
    Binary(BinaryOp),
    Dot,
    Reduce { op: ReduceOp, axes: Vec<usize> },
    Argmax { axis: Option<usize> },
    Transpose { axes: Option<Vec<usize>> },
    Reshape { shape: Vec<isize> },
    Flatten,
    ExpandDims { axis: usize },
    Squeeze { axes: Vec<usize> },
    Pad { widths: Vec<(usize, usize)> },
    Getitem { index: Vec<IndexItem> },
    Setitem { index: Vec<IndexItem> },
    Where,
    WhileLoop(WhileLoop),
    MapFn(MapFn),
    Custom(Rc<dyn Operation>),
}

impl Op {
    /// Name used as the function part of derived node names.
    pub fn func_name(&self) -> &str {
        match self {
            Op::Constant(_) => "constant",
            Op::Placeholder => "placeholder",
            Op::Variable(_) => "variable",
            Op::OnesLike => "ones_like",
            Op::ZerosLike => "zeros_like",
            Op::Arange => "arange",
            Op::Random => "random",
            Op::ShapeOf => "shape",
            Op::InTrainPhase => "in_train_phase",
            Op::Unary(op) => op.name(),
            Op::Binary(op) => op.name(),
            Op::Dot => "dot",
            Op::Reduce { op, .. } => op.name(),
            Op::Argmax { .. } => "argmax",
            Op::Transpose { .. } => "transpose",
            Op::Reshape { .. } => "reshape",
            Op::Flatten => "flatten",
            Op::ExpandDims { .. } => "expand_dims",
            Op::Squeeze { .. } => "squeeze",
            Op::Pad { .. } => "pad",
            Op::Getitem { .. } => "getitem",
            Op::Setitem { .. } => "setitem",
            Op::Where => "where",
            Op::WhileLoop(_) => "while_loop",
            Op::MapFn(_) => "map_fn",
            Op::Custom(op) => op.kind(),
        }
    }

    /// `key=value` pairs appended to derived names.
    fn params(&self) -> Vec<String> {
        match self {
            Op::Reduce { axes, .. } => vec![format!("axis={}", tuple(axes)), "keepdims=True".to_string()],
            Op::Argmax { axis: Some(axis) } => vec![format!("axis={}", axis)],
            Op::Transpose { axes: Some(axes) } => vec![format!("axes={}", tuple(axes))],
            Op::Reshape { shape } => vec![format!("shape={}", tuple(shape))],
            Op::ExpandDims { axis } => vec![format!("axis={}", axis)],
            Op::Squeeze { axes } => vec![format!("axis={}", tuple(axes))],
            Op::Pad { widths } => vec![format!("pad_width={}", tuple(widths))],
            Op::Setitem { index } => vec![format!("item=[{}]", format_index(index))],
            Op::WhileLoop(w) => vec![format!("output_index={}", w.output_index)],
            _ => Vec::new(),
        }
    }

    /// Control-flow nodes evaluate their own sub-nodes instead of having inputs evaluated
    /// ahead of their forward rule.
    pub(crate) fn owns_inputs(&self) -> bool {
        matches!(self, Op::WhileLoop(_) | Op::MapFn(_))
    }

    /// Whether a forward value may be served from the step cache.
    pub(crate) fn cacheable(&self) -> bool {
        !matches!(self, Op::InTrainPhase)
    }
}

fn tuple<T: fmt::Debug>(items: &[T]) -> String {
    let parts: Vec<String> = items.iter().map(|i| format!("{:?}", i)).collect();
    if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    }
}

/// Names that do not depend on other nodes.
fn leaf_name(node: &Node) -> Result<Option<String>, Error> {
    if let Some(name) = &node.name {
        return Ok(Some(name.clone()));
    }
    Ok(match &node.op {
        Op::Constant(value) if value.ndim() == 0 => Some(format!("{:?}", value.item()?)),
        Op::Constant(value) => Some(format!("C{}", Shape::from(value.shape()))),
        Op::Placeholder => Some(format!("X{}", node.shape)),
        Op::Variable(_) => Some(format!("W{}", node.shape)),
        _ => None,
    })
}

/// Inputs whose names appear in the derived name of `node`.
fn name_dependencies(node: &Node) -> &[NodeId] {
    if node.name.is_some() || node.op.owns_inputs() {
        return &[];
    }
    match &node.op {
        Op::Constant(_) | Op::Placeholder | Op::Variable(_) => &[],
        Op::Getitem { .. } => &node.inputs[..1],
        _ => &node.inputs,
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Op::Constant(value) => write!(f, "Constant(shape={:?})", value.shape()),
            Op::Variable(state) => write!(f, "Variable(materialized={})", state.is_materialized()),
            Op::Reduce { op, axes } => write!(f, "{}(axes={:?})", op, axes),
            Op::Argmax { axis: None } => write!(f, "Argmax(global)"),
            Op::Argmax { axis: Some(axis) } => write!(f, "Argmax(axis={})", axis),
            Op::Transpose { axes: None } => write!(f, "Transpose(reversed)"),
            Op::Transpose { axes: Some(axes) } => write!(f, "Transpose(axes={:?})", axes),
            Op::Reshape { shape } => write!(f, "Reshape(shape={:?})", shape),
            Op::ExpandDims { axis } => write!(f, "ExpandDims(axis={})", axis),
            Op::Squeeze { axes } => write!(f, "Squeeze(axes={:?})", axes),
            Op::Pad { widths } => write!(f, "Pad(widths={:?})", widths),
            Op::Getitem { index } => write!(f, "Getitem[{}]", format_index(index)),
            Op::Setitem { index } => write!(f, "Setitem[{}]", format_index(index)),
            Op::WhileLoop(w) => write!(f, "WhileLoop(vars={}, output_index={})", w.loop_vars.len(), w.output_index),
            Op::MapFn(m) => write!(f, "MapFn(elems={}, outputs={:?})", m.elems.len(), m.outputs),
            Op::Custom(op) => write!(f, "Custom({})", op.kind()),
            Op::Unary(op) => write!(f, "{}", op),
            Op::Binary(op) => write!(f, "{}", op),
            other => {
                let name = other.func_name();
                let camel: String = name
                    .split('_')
                    .map(|part| {
                        let mut chars = part.chars();
                        match chars.next() {
                            Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
                            None => String::new(),
                        }
                    })
                    .collect();
                write!(f, "{}", camel)
            }
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One arena entry: the operation, its inputs, its static shape and its mutable
/// evaluation state.
#[derive(Debug)]
pub struct Node {
    pub(crate) op: Op,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) shape: Shape,
    pub(crate) name: Option<String>,
    pub(crate) value: Option<Array>,
    pub(crate) cache_step: Option<u64>,
    pub(crate) grad: Option<Array>,
}

impl Node {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The value computed by the most recent forward evaluation.
    pub fn value(&self) -> Option<&Array> {
        self.value.as_ref()
    }

    pub fn gradient(&self) -> Option<&Array> {
        self.grad.as_ref()
    }
}

/// Values that can stand in for a node wherever an operand is expected.
pub trait IntoNode {
    fn into_node(self, graph: &mut Graph) -> Result<NodeId, Error>;
}

impl IntoNode for NodeId {
    fn into_node(self, graph: &mut Graph) -> Result<NodeId, Error> {
        graph.node(self)?;
        Ok(self)
    }
}

impl IntoNode for f64 {
    fn into_node(self, graph: &mut Graph) -> Result<NodeId, Error> {
        Ok(graph.constant(self))
    }
}

impl IntoNode for Array {
    fn into_node(self, graph: &mut Graph) -> Result<NodeId, Error> {
        Ok(graph.constant(self))
    }
}

/// An arena of nodes. Nodes only reference previously created nodes, so the graph is a DAG.
#[derive(Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    hooks: HashMap<NodeId, Vec<Box<dyn Hook>>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, op: Op, inputs: Vec<NodeId>, shape: Shape) -> NodeId {
        let id = NodeId(self.nodes.len());
        trace!("created node {} {} with shape {}", id, op, shape);
        self.nodes.push(Node {
            op,
            inputs,
            shape,
            name: None,
            value: None,
            cache_step: None,
            grad: None,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, Error> {
        self.nodes.get(id.0).ok_or(Error::InvalidNode(id.0))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, Error> {
        self.nodes.get_mut(id.0).ok_or(Error::InvalidNode(id.0))
    }

    pub fn shape(&self, id: NodeId) -> Result<&Shape, Error> {
        Ok(&self.node(id)?.shape)
    }

    pub fn inputs(&self, id: NodeId) -> Result<&[NodeId], Error> {
        Ok(&self.node(id)?.inputs)
    }

    /// The gradient accumulated on `id` by the last backward passes.
    pub fn gradient(&self, id: NodeId) -> Result<Option<&Array>, Error> {
        Ok(self.node(id)?.grad.as_ref())
    }

    /// The value computed by the most recent forward evaluation of `id`.
    pub fn value(&self, id: NodeId) -> Result<Option<&Array>, Error> {
        Ok(self.node(id)?.value.as_ref())
    }

    pub(crate) fn value_of(&self, id: NodeId) -> Result<&Array, Error> {
        match self.node(id)?.value.as_ref() {
            Some(value) => Ok(value),
            None => Err(Error::NotEvaluated(self.describe(id)?)),
        }
    }

    /// Coerces a constant-like value into a node.
    pub fn to_node(&mut self, value: impl IntoNode) -> Result<NodeId, Error> {
        value.into_node(self)
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), Error> {
        self.node_mut(id)?.name = Some(name.into());
        Ok(())
    }

    /// Returns the explicit name of `id`, or one derived from its kind and inputs.
    ///
    /// Derived names spell out the whole sub-graph, so they grow with its size. Error
    /// messages use [`Graph::describe`] instead.
    pub fn name(&self, id: NodeId) -> Result<String, Error> {
        let mut names: HashMap<NodeId, String> = HashMap::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if names.contains_key(&current) {
                continue;
            }
            let node = self.node(current)?;
            let missing: Vec<NodeId> = name_dependencies(node)
                .iter()
                .copied()
                .filter(|input| !names.contains_key(input))
                .collect();
            if !missing.is_empty() {
                if expanded {
                    return Err(Error::CycleDetected(current.0));
                }
                stack.push((current, true));
                stack.extend(missing.into_iter().map(|input| (input, false)));
                continue;
            }
            let name = match leaf_name(node)? {
                Some(name) => name,
                None => {
                    let arg = |input: &NodeId| names[input].as_str();
                    match &node.op {
                        Op::Getitem { index } => {
                            format!("{}[{}]", arg(&node.inputs[0]), format_index(index))
                        }
                        op => {
                            let mut args: Vec<String> = name_dependencies(node)
                                .iter()
                                .map(|input| arg(input).to_string())
                                .collect();
                            args.extend(op.params());
                            format!("{}({})", op.func_name(), args.join(", "))
                        }
                    }
                }
            };
            names.insert(current, name);
        }
        names.remove(&id).ok_or_else(|| {
            Error::InternalLogicError(format!("no name derived for {}", id))
        })
    }

    /// A short label for `id`: its explicit or leaf name, otherwise its kind and handle.
    pub fn describe(&self, id: NodeId) -> Result<String, Error> {
        let node = self.node(id)?;
        Ok(match leaf_name(node)? {
            Some(name) => name,
            None => format!("{} {}", node.op.func_name(), id),
        })
    }

    /// Registers a hook called with the value each time the forward rule of `id` runs.
    pub fn register_hook(&mut self, id: NodeId, hook: Box<dyn Hook>) -> Result<(), Error> {
        self.node(id)?;
        self.hooks.entry(id).or_default().push(hook);
        Ok(())
    }

    pub fn clear_hooks(&mut self, id: NodeId) {
        self.hooks.remove(&id);
    }

    pub(crate) fn run_hooks(&self, id: NodeId, value: &Array) {
        if let Some(hooks) = self.hooks.get(&id) {
            for hook in hooks {
                hook.call(id, value);
            }
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("hooked_nodes", &self.hooks.len())
            .finish()
    }
}
