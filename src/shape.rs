//! Static shapes with unknown dimensions and NumPy-style broadcasting.

use crate::error::Error;
use std::fmt;

/// A static tensor shape. `None` entries are resolved at runtime (e.g. a batch size).
/// An empty shape denotes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<Option<usize>>);

impl Shape {
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the concrete dimensions if none of them is unknown.
    pub fn to_concrete(&self) -> Option<Vec<usize>> {
        self.0.iter().copied().collect()
    }

    /// Number of elements, if every dimension is known.
    pub fn num_elements(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, d| d.map(|d| acc * d))
    }

    /// Whether a runtime shape fits this static shape.
    pub fn accepts(&self, actual: &[usize]) -> bool {
        self.0.len() == actual.len()
            && self
                .0
                .iter()
                .zip(actual)
                .all(|(d, a)| d.map_or(true, |d| d == *a))
    }

    pub(crate) fn insert(&mut self, index: usize, dim: Option<usize>) {
        self.0.insert(index, dim);
    }
}

/// Maps a possibly negative axis onto `0..rank`.
pub fn normalize_axis(axis: isize, rank: usize) -> Result<usize, Error> {
    let resolved = if axis < 0 { axis + rank as isize } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(Error::InvalidAxis { axis, rank });
    }
    Ok(resolved as usize)
}

/// Normalizes a list of axes, sorted ascending and deduplicated. `None` selects every axis.
pub fn normalize_axes(axes: Option<&[isize]>, rank: usize) -> Result<Vec<usize>, Error> {
    let mut resolved = match axes {
        None => (0..rank).collect::<Vec<_>>(),
        Some(axes) => axes
            .iter()
            .map(|&a| normalize_axis(a, rank))
            .collect::<Result<Vec<_>, _>>()?,
    };
    resolved.sort_unstable();
    resolved.dedup();
    Ok(resolved)
}

/// Computes the broadcast of two static shapes.
///
/// Dimensions are aligned from the trailing end. An unknown dimension on either side yields
/// an unknown result; otherwise the pair must be equal or contain a `1`.
pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape, Error> {
    let ndim = a.rank().max(b.rank());
    let mut dims = Vec::with_capacity(ndim);
    for i in 0..ndim {
        let a_dim = aligned(a.dims(), ndim, i);
        let b_dim = aligned(b.dims(), ndim, i);
        let dim = match (a_dim, b_dim) {
            (None, _) | (_, None) => None,
            (Some(x), Some(y)) => {
                if x == y || y == 1 {
                    Some(x)
                } else if x == 1 {
                    Some(y)
                } else {
                    return Err(Error::shape_mismatch("broadcast", a.clone(), b.clone()));
                }
            }
        };
        dims.push(dim);
    }
    Ok(Shape(dims))
}

/// Dimension of `dims` at position `i` when right-aligned to `ndim` axes. Missing leading
/// axes behave as size 1.
fn aligned(dims: &[Option<usize>], ndim: usize, i: usize) -> Option<usize> {
    let offset = ndim - dims.len();
    if i >= offset {
        dims[i - offset]
    } else {
        Some(1)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match d {
                Some(d) => write!(f, "{}", d)?,
                None => write!(f, "None")?,
            }
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<Option<usize>>> for Shape {
    fn from(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }
}

impl From<&[Option<usize>]> for Shape {
    fn from(dims: &[Option<usize>]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[Option<usize>; N]> for Shape {
    fn from(dims: [Option<usize>; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims.into_iter().map(Some).collect())
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.iter().copied().map(Some).collect())
    }
}

impl From<&Vec<usize>> for Shape {
    fn from(dims: &Vec<usize>) -> Self {
        Self::from(dims.as_slice())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.iter().copied().map(Some).collect())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

impl<const N: usize> PartialEq<[usize; N]> for Shape {
    fn eq(&self, other: &[usize; N]) -> bool {
        self.0.len() == N && self.0.iter().zip(other).all(|(d, o)| *d == Some(*o))
    }
}

impl<const N: usize> PartialEq<[Option<usize>; N]> for Shape {
    fn eq(&self, other: &[Option<usize>; N]) -> bool {
        self.0.as_slice() == other.as_slice()
    }
}
