use crate::error::Error;
use crate::util::broadcast_dims;

use ndarray::{ArrayD, ArrayView1, Axis, IxDyn, ShapeError, SliceInfoElem, Zip};
use std::fmt;

/// An owned, dense, row-major tensor of `f64` values.
#[derive(Clone, PartialEq)]
pub struct Array {
    pub(crate) data: ArrayD<f64>,
}

impl Array {
    pub fn new(data: ArrayD<f64>) -> Self {
        Self { data }
    }

    pub fn into_ndarray(self) -> ArrayD<f64> {
        self.data
    }

    pub fn from_vec(data: Vec<f64>, shape: &[usize]) -> Result<Self, Error> {
        let actual_len = data.len();
        let map_err = |_e: ShapeError| Error::shape_mismatch("from_vec", shape, [actual_len]);
        let array = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(map_err)?;
        Ok(Self { data: array })
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(&[]), value),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::ones(IxDyn(shape)),
        }
    }

    pub fn full(shape: &[usize], value: f64) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the array contains no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get_data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn get_data_mut(&mut self) -> &mut ArrayD<f64> {
        &mut self.data
    }

    /// Elements in logical row-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn into_raw_vec(self) -> Vec<f64> {
        self.data.as_standard_layout().into_owned().into_raw_vec_and_offset().0
    }

    /// The single value of a one-element array.
    pub fn item(&self) -> Result<f64, Error> {
        if self.data.len() != 1 {
            return Err(Error::InvalidOperation(format!(
                "Expected a single element, found shape {:?}",
                self.shape()
            )));
        }
        self.data
            .iter()
            .next()
            .copied()
            .ok_or_else(|| Error::InternalLogicError("empty single-element array".to_string()))
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Array {
        Array::new(self.data.mapv(f))
    }

    pub(crate) fn broadcast_to(&self, shape: &[usize]) -> Result<Array, Error> {
        match self.data.broadcast(IxDyn(shape)) {
            Some(broadcasted_view) => Ok(Array::new(broadcasted_view.to_owned())),
            None => Err(Error::shape_mismatch("broadcast", self.shape(), shape)),
        }
    }

    /// Applies `f` elementwise after broadcasting both operands to their common shape.
    pub fn zip_with(&self, other: &Array, f: impl Fn(f64, f64) -> f64) -> Result<Array, Error> {
        let shape = broadcast_dims(self.shape(), other.shape())?;
        let dim = IxDyn(&shape);
        let (a, b) = match (self.data.broadcast(dim.clone()), other.data.broadcast(dim)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(Error::shape_mismatch("zip", self.shape(), other.shape())),
        };
        Ok(Array::new(Zip::from(&a).and(&b).map_collect(|&x, &y| f(x, y))))
    }

    /// Picks from `on_true` where `self` is non-zero and from `on_false` elsewhere.
    pub fn select(&self, on_true: &Array, on_false: &Array) -> Result<Array, Error> {
        let shape = broadcast_dims(
            &broadcast_dims(self.shape(), on_true.shape())?,
            on_false.shape(),
        )?;
        let dim = IxDyn(&shape);
        let views = (
            self.data.broadcast(dim.clone()),
            on_true.data.broadcast(dim.clone()),
            on_false.data.broadcast(dim),
        );
        let (c, x, y) = match views {
            (Some(c), Some(x), Some(y)) => (c, x, y),
            _ => return Err(Error::shape_mismatch("where", self.shape(), on_true.shape())),
        };
        Ok(Array::new(
            Zip::from(&c)
                .and(&x)
                .and(&y)
                .map_collect(|&c, &x, &y| if c != 0.0 { x } else { y }),
        ))
    }

    pub fn sum(&self) -> f64 {
        self.data.sum()
    }

    /// Folds every lane along each of `axes`, keeping the reduced axes with size 1.
    pub(crate) fn fold_axes_keepdims(
        &self,
        axes: &[usize],
        f: impl Fn(ArrayView1<f64>) -> f64,
    ) -> Result<Array, Error> {
        let mut data = self.data.clone();
        for &axis in axes {
            if axis >= data.ndim() {
                return Err(Error::InvalidAxis {
                    axis: axis as isize,
                    rank: data.ndim(),
                });
            }
            data = data.map_axis(Axis(axis), &f).insert_axis(Axis(axis));
        }
        Ok(Array::new(data))
    }

    pub(crate) fn sum_axes_keepdims(&self, axes: &[usize]) -> Result<Array, Error> {
        self.fold_axes_keepdims(axes, |lane| lane.sum())
    }

    /// Reshapes in row-major order. The new shape must have the same total number of elements.
    pub fn reshape(&self, shape: &[usize]) -> Result<Array, Error> {
        if self.size() != shape.iter().product::<usize>() {
            return Err(Error::shape_mismatch("reshape", self.shape(), shape));
        }
        let reshaped = self
            .data
            .to_shape(IxDyn(shape))
            .map_err(|_| Error::shape_mismatch("reshape", self.shape(), shape))?;
        Ok(Array::new(reshaped.into_owned()))
    }

    pub(crate) fn permute(&self, axes: &[usize]) -> Result<Array, Error> {
        if axes.len() != self.ndim() {
            return Err(Error::InvalidOperation(format!(
                "Permutation {:?} does not match rank {}",
                axes,
                self.ndim()
            )));
        }
        let view = self.data.view().permuted_axes(IxDyn(axes));
        Ok(Array::new(view.as_standard_layout().into_owned()))
    }

    pub(crate) fn insert_axis(&self, axis: usize) -> Result<Array, Error> {
        if axis > self.ndim() {
            return Err(Error::InvalidAxis {
                axis: axis as isize,
                rank: self.ndim(),
            });
        }
        Ok(Array::new(self.data.clone().insert_axis(Axis(axis))))
    }

    pub(crate) fn index_axis0(&self, index: usize) -> Array {
        Array::new(self.data.index_axis(Axis(0), index).to_owned())
    }

    /// Stacks equally shaped arrays along a new leading axis. `empty_shape` is the element
    /// shape used when `arrays` is empty.
    pub(crate) fn stack(arrays: &[Array], empty_shape: &[usize]) -> Result<Array, Error> {
        if arrays.is_empty() {
            let mut shape = vec![0];
            shape.extend_from_slice(empty_shape);
            return Ok(Array::zeros(&shape));
        }
        let views: Vec<_> = arrays.iter().map(|a| a.data.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views).map_err(|_| {
            let mismatch = arrays
                .iter()
                .find(|a| a.shape() != arrays[0].shape())
                .unwrap_or(&arrays[0]);
            Error::shape_mismatch("stack", arrays[0].shape(), mismatch.shape())
        })?;
        Ok(Array::new(stacked))
    }

    /// Copies out the region selected by `info`, which must cover every axis.
    pub(crate) fn slice(&self, info: &[SliceInfoElem]) -> Array {
        Array::new(self.data.slice(info).to_owned())
    }

    /// Adds `values` into the region selected by `info`.
    pub(crate) fn scatter_add(&mut self, info: &[SliceInfoElem], values: &Array) -> Result<(), Error> {
        let mut region = self.data.slice_mut(info);
        if values.data.broadcast(region.raw_dim()).is_none() {
            return Err(Error::shape_mismatch("scatter", region.shape(), values.shape()));
        }
        region += &values.data;
        Ok(())
    }

    /// Overwrites the region selected by `info` with `values`, broadcasting them.
    pub(crate) fn assign(&mut self, info: &[SliceInfoElem], values: &Array) -> Result<(), Error> {
        let mut region = self.data.slice_mut(info);
        if values.data.broadcast(region.raw_dim()).is_none() {
            return Err(Error::shape_mismatch("setitem", region.shape(), values.shape()));
        }
        region.assign(&values.data);
        Ok(())
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Array::scalar(value)
    }
}

impl From<ArrayD<f64>> for Array {
    fn from(data: ArrayD<f64>) -> Self {
        Array::new(data)
    }
}

impl AsRef<ArrayD<f64>> for Array {
    fn as_ref(&self) -> &ArrayD<f64> {
        &self.data
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Array")
            .field("shape", &self.shape())
            .field("data", &self.to_vec())
            .finish()
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}
