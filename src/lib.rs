//! A define-then-run computation graph with reverse-mode automatic differentiation.
//!
//! Nodes live in a [`Graph`] arena and are addressed by [`NodeId`]. Building a node checks
//! its static [`Shape`] immediately; values are produced later by [`Graph::forward`] or a
//! [`Session`], and gradients by [`Graph::backward`].
//!
//! # Features
//! - `cpu_openblas` - Routes matrix products through OpenBLAS (requires a system install)
//!
//! # Example
//! ```rust
//! use auto_diff_graph::{Array, Bindings, Graph, Shape};
//!
//! fn main() -> Result<(), auto_diff_graph::Error> {
//!     let mut graph = Graph::new();
//!     let w = graph.variable(Array::from_vec(vec![1.0, 2.0, 3.0], &[3])?);
//!     let x = graph.placeholder(Shape::new(vec![None]));
//!     let y = graph.multiply(w, x)?;
//!     let loss = graph.sum(y, None, false)?;
//!
//!     let bindings = Bindings::new().bind(x, Array::from_vec(vec![4.0, 5.0, 6.0], &[3])?);
//!     let value = graph.forward(loss, &bindings)?;
//!     assert_eq!(value.item()?, 32.0);
//!
//!     graph.backward(loss)?;
//!     println!("Gradient of w: {:?}", graph.gradient(w)?);
//!     Ok(())
//! }
//! ```

pub mod array;
mod backward;
pub mod error;
pub mod graph;
pub mod hooks;
pub mod init;
pub mod ops;
pub mod session;
pub mod shape;
pub mod util;
pub mod variable;

pub mod test_utils;

pub use array::Array;
pub use error::Error;
pub use graph::{Graph, IntoNode, Node, NodeId, Op};
pub use hooks::{FnHook, Hook};
pub use ops::control::{CondFn, GraphFn};
pub use ops::custom::Operation;
pub use ops::elementwise::{BinaryOp, UnaryOp};
pub use ops::index::IndexItem;
pub use ops::reduce::ReduceOp;
pub use session::{Bindings, Feed, Fetch, Session};
pub use shape::{broadcast_shape, Shape};
pub use util::reduce_gradient_to_shape;
pub use variable::Initializer;

#[cfg(feature = "cpu_openblas")]
extern crate openblas_src;
