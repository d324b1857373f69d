use crate::shape::Shape;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch in {op}: {shape_a} and {shape_b}")]
    ShapeMismatch {
        op: String,
        shape_a: Shape,
        shape_b: Shape,
    },

    #[error("Invalid axis {axis} for tensor of rank {rank}")]
    InvalidAxis { axis: isize, rank: usize },

    #[error("Index out of bounds: index {index}, size {size}")]
    IndexOutOfBounds { index: isize, size: usize },

    #[error("Operation is not differentiable: {0}")]
    NotDifferentiable(String),

    #[error("No value bound for placeholder {0}")]
    MissingBinding(String),

    #[error("Operation not implemented: {0}")]
    NotImplemented(String),

    #[error("Node {0} does not belong to this graph")]
    InvalidNode(usize),

    #[error("Node {0} has no forward value; evaluate it before calling backward")]
    NotEvaluated(String),

    #[error("Cycle detected at node {0}")]
    CycleDetected(usize),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Error during initialization: {0}")]
    InitializationError(String),

    #[error("Internal logic error: {0}")]
    InternalLogicError(String),

    #[error("Gradient check error: analytical={analytical:?}, numerical={numerical:?}, max_rel_error={max_rel_error}, max_abs_error={max_abs_error}, at_index={at_index}")]
    GradientCheckError {
        analytical: Vec<f64>,
        numerical: Vec<f64>,
        max_rel_error: f64,
        max_abs_error: f64,
        at_index: usize,
    },
}

impl Error {
    /// Builds an `Error::ShapeMismatch` for operation `op`.
    pub fn shape_mismatch(
        op: &str,
        shape_a: impl Into<Shape>,
        shape_b: impl Into<Shape>,
    ) -> Self {
        Error::ShapeMismatch {
            op: op.to_string(),
            shape_a: shape_a.into(),
            shape_b: shape_b.into(),
        }
    }
}
