//! Elementwise unary and broadcasting binary operations.

use crate::array::Array;
use crate::error::Error;
use crate::graph::{Graph, IntoNode, NodeId, Op};
use crate::shape::broadcast_shape;
use crate::util::reduce_gradient_to_shape;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Maximum,
    Minimum,
    Equal,
    Less,
    Greater,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
            BinaryOp::Power => "power",
            BinaryOp::Maximum => "maximum",
            BinaryOp::Minimum => "minimum",
            BinaryOp::Equal => "equal",
            BinaryOp::Less => "less",
            BinaryOp::Greater => "greater",
        }
    }

    fn apply(&self, x: f64, y: f64) -> f64 {
        match self {
            BinaryOp::Add => x + y,
            BinaryOp::Subtract => x - y,
            BinaryOp::Multiply => x * y,
            BinaryOp::Divide => x / y,
            BinaryOp::Power => x.powf(y),
            BinaryOp::Maximum => x.max(y),
            BinaryOp::Minimum => x.min(y),
            BinaryOp::Equal => indicator(x == y),
            BinaryOp::Less => indicator(x < y),
            BinaryOp::Greater => indicator(x > y),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "Add",
            BinaryOp::Subtract => "Subtract",
            BinaryOp::Multiply => "Multiply",
            BinaryOp::Divide => "Divide",
            BinaryOp::Power => "Power",
            BinaryOp::Maximum => "Maximum",
            BinaryOp::Minimum => "Minimum",
            BinaryOp::Equal => "Equal",
            BinaryOp::Less => "Less",
            BinaryOp::Greater => "Greater",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negative,
    Exp,
    Log,
    Sqrt,
    Square,
    Tanh,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Negative => "negative",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Square => "square",
            UnaryOp::Tanh => "tanh",
        }
    }

    fn apply(&self, x: f64) -> f64 {
        match self {
            UnaryOp::Negative => -x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Square => x * x,
            UnaryOp::Tanh => x.tanh(),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            UnaryOp::Negative => "Negative",
            UnaryOp::Exp => "Exp",
            UnaryOp::Log => "Ln",
            UnaryOp::Sqrt => "Sqrt",
            UnaryOp::Square => "Square",
            UnaryOp::Tanh => "Tanh",
        };
        write!(f, "{}", name)
    }
}

fn indicator(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

impl Graph {
    fn binary(&mut self, op: BinaryOp, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        let x = x.into_node(self)?;
        let y = y.into_node(self)?;
        let shape = broadcast_shape(self.shape(x)?, self.shape(y)?)?;
        Ok(self.push(Op::Binary(op), vec![x, y], shape))
    }

    pub fn add(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Add, x, y)
    }

    pub fn subtract(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Subtract, x, y)
    }

    pub fn multiply(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Multiply, x, y)
    }

    pub fn divide(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Divide, x, y)
    }

    /// `x` raised to the elementwise power `y`.
    pub fn power(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Power, x, y)
    }

    pub fn maximum(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Maximum, x, y)
    }

    pub fn minimum(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Minimum, x, y)
    }

    /// `1.0` where `x == y`, else `0.0`. Not differentiable.
    pub fn equal(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Equal, x, y)
    }

    pub fn less(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Less, x, y)
    }

    pub fn greater(&mut self, x: impl IntoNode, y: impl IntoNode) -> Result<NodeId, Error> {
        self.binary(BinaryOp::Greater, x, y)
    }

    fn unary(&mut self, op: UnaryOp, x: NodeId) -> Result<NodeId, Error> {
        let shape = self.shape(x)?.clone();
        Ok(self.push(Op::Unary(op), vec![x], shape))
    }

    pub fn negative(&mut self, x: NodeId) -> Result<NodeId, Error> {
        self.unary(UnaryOp::Negative, x)
    }

    pub fn exp(&mut self, x: NodeId) -> Result<NodeId, Error> {
        self.unary(UnaryOp::Exp, x)
    }

    /// Natural logarithm.
    pub fn log(&mut self, x: NodeId) -> Result<NodeId, Error> {
        self.unary(UnaryOp::Log, x)
    }

    pub fn sqrt(&mut self, x: NodeId) -> Result<NodeId, Error> {
        self.unary(UnaryOp::Sqrt, x)
    }

    pub fn square(&mut self, x: NodeId) -> Result<NodeId, Error> {
        self.unary(UnaryOp::Square, x)
    }

    pub fn tanh(&mut self, x: NodeId) -> Result<NodeId, Error> {
        self.unary(UnaryOp::Tanh, x)
    }
}

pub(crate) fn binary_forward(op: BinaryOp, x: &Array, y: &Array) -> Result<Array, Error> {
    x.zip_with(y, |a, b| op.apply(a, b))
}

pub(crate) fn unary_forward(op: UnaryOp, x: &Array) -> Array {
    x.map(|a| op.apply(a))
}

pub(crate) fn binary_gradients(
    op: BinaryOp,
    grad: &Array,
    x: &Array,
    y: &Array,
    output: &Array,
) -> Result<Vec<Option<Array>>, Error> {
    let (grad_x, grad_y) = match op {
        BinaryOp::Add => (grad.clone(), grad.clone()),
        BinaryOp::Subtract => (grad.clone(), grad.map(|g| -g)),
        BinaryOp::Multiply => (grad.zip_with(y, |g, b| g * b)?, grad.zip_with(x, |g, a| g * a)?),
        BinaryOp::Divide => {
            let grad_x = grad.zip_with(y, |g, b| g / b)?;
            let x_over_y2 = x.zip_with(y, |a, b| a / (b * b))?;
            (grad_x, grad.zip_with(&x_over_y2, |g, q| -g * q)?)
        }
        BinaryOp::Power => {
            let dx = x.zip_with(y, |a, b| b * a.powf(b - 1.0))?;
            let dy = x.zip_with(output, |a, o| a.ln() * o)?;
            (grad.zip_with(&dx, |g, d| g * d)?, grad.zip_with(&dy, |g, d| g * d)?)
        }
        BinaryOp::Maximum | BinaryOp::Minimum => {
            // Every operand equal to the output receives the gradient, ties included.
            let mask_x = x.zip_with(output, |a, o| indicator(a == o))?;
            let mask_y = y.zip_with(output, |b, o| indicator(b == o))?;
            (grad.zip_with(&mask_x, |g, m| g * m)?, grad.zip_with(&mask_y, |g, m| g * m)?)
        }
        BinaryOp::Equal | BinaryOp::Less | BinaryOp::Greater => {
            return Err(Error::NotDifferentiable(op.name().to_string()))
        }
    };
    Ok(vec![
        Some(reduce_gradient_to_shape(&grad_x, x.shape())?),
        Some(reduce_gradient_to_shape(&grad_y, y.shape())?),
    ])
}

pub(crate) fn unary_gradients(
    op: UnaryOp,
    grad: &Array,
    x: &Array,
    output: &Array,
) -> Result<Vec<Option<Array>>, Error> {
    let grad_x = match op {
        UnaryOp::Negative => grad.map(|g| -g),
        UnaryOp::Exp => grad.zip_with(output, |g, o| g * o)?,
        UnaryOp::Log => grad.zip_with(x, |g, a| g / a)?,
        UnaryOp::Sqrt => grad.zip_with(output, |g, o| g / (2.0 * o))?,
        UnaryOp::Square => grad.zip_with(x, |g, a| 2.0 * g * a)?,
        UnaryOp::Tanh => grad.zip_with(output, |g, o| g * (1.0 - o * o))?,
    };
    Ok(vec![Some(grad_x)])
}
