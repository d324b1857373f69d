//! Initializers for lazily materialized variables.
//!
//! Plain functions (`zeros`, `glorot_uniform`, ...) can be passed straight to
//! [`Graph::variable_with_initializer`](crate::Graph::variable_with_initializer);
//! parameterized ones return a closure.

use crate::array::Array;
use crate::error::Error;
use rand_distr::{Distribution, Normal, Uniform};

/// Largest number of draws `truncated_normal` makes for one element before giving up.
const MAX_TRUNCATION_DRAWS: usize = 1000;

fn checked_size(shape: &[usize]) -> Result<usize, Error> {
    shape
        .iter()
        .try_fold(1usize, |acc, &x| acc.checked_mul(x))
        .ok_or_else(|| {
            Error::InvalidOperation("Shape dimensions multiply to overflow usize".to_string())
        })
}

fn sample<D: Distribution<f64>>(dist: &D, shape: &[usize]) -> Result<Array, Error> {
    let size = checked_size(shape)?;
    let mut rng = rand::rng();
    let data = (0..size).map(|_| dist.sample(&mut rng)).collect();
    Array::from_vec(data, shape)
}

fn uniform(low: f64, high: f64, shape: &[usize]) -> Result<Array, Error> {
    let dist = Uniform::new(low, high)
        .map_err(|e| Error::InitializationError(format!("uniform({}, {}): {}", low, high, e)))?;
    sample(&dist, shape)
}

fn normal(mean: f64, stddev: f64, shape: &[usize]) -> Result<Array, Error> {
    let dist = Normal::new(mean, stddev)
        .map_err(|e| Error::InitializationError(format!("normal({}, {}): {}", mean, stddev, e)))?;
    sample(&dist, shape)
}

/// `(fan_in, fan_out)` read from the first and last dimensions.
fn fans(shape: &[usize]) -> Result<(usize, usize), Error> {
    match (shape.first(), shape.last()) {
        (Some(&fan_in), Some(&fan_out)) if fan_in > 0 => Ok((fan_in, fan_out)),
        _ => Err(Error::InvalidOperation(format!(
            "cannot derive fan-in from shape {:?}",
            shape
        ))),
    }
}

pub fn zeros(shape: &[usize]) -> Result<Array, Error> {
    Ok(Array::zeros(shape))
}

pub fn ones(shape: &[usize]) -> Result<Array, Error> {
    Ok(Array::ones(shape))
}

pub fn constant(value: f64) -> impl Fn(&[usize]) -> Result<Array, Error> + Clone + 'static {
    move |shape| Ok(Array::full(shape, value))
}

pub fn random_uniform(low: f64, high: f64) -> impl Fn(&[usize]) -> Result<Array, Error> + Clone + 'static {
    move |shape| uniform(low, high, shape)
}

pub fn random_normal(mean: f64, stddev: f64) -> impl Fn(&[usize]) -> Result<Array, Error> + Clone + 'static {
    move |shape| normal(mean, stddev, shape)
}

/// Normal samples redrawn until they fall inside `[lower, upper]`.
pub fn truncated_normal(
    mean: f64,
    stddev: f64,
    lower: f64,
    upper: f64,
) -> impl Fn(&[usize]) -> Result<Array, Error> + Clone + 'static {
    move |shape| {
        if lower >= upper {
            return Err(Error::InitializationError(format!(
                "empty truncation interval [{}, {}]",
                lower, upper
            )));
        }
        let dist = Normal::new(mean, stddev).map_err(|e| {
            Error::InitializationError(format!("normal({}, {}): {}", mean, stddev, e))
        })?;
        let mut rng = rand::rng();
        let size = checked_size(shape)?;
        let mut data = Vec::with_capacity(size);
        for _ in 0..size {
            let value = (0..MAX_TRUNCATION_DRAWS)
                .map(|_| dist.sample(&mut rng))
                .find(|v| (lower..=upper).contains(v))
                .ok_or_else(|| {
                    Error::InitializationError(format!(
                        "no sample of normal({}, {}) fell in [{}, {}]",
                        mean, stddev, lower, upper
                    ))
                })?;
            data.push(value);
        }
        Array::from_vec(data, shape)
    }
}

/// Uniform in `±sqrt(3) * scale`, which has standard deviation `scale`.
fn scaled_uniform(scale: f64, shape: &[usize]) -> Result<Array, Error> {
    let limit = 3.0f64.sqrt() * scale;
    uniform(-limit, limit, shape)
}

fn scaled_normal(scale: f64, shape: &[usize]) -> Result<Array, Error> {
    truncated_normal(0.0, scale, -2.0, 2.0)(shape)
}

pub fn glorot_uniform(shape: &[usize]) -> Result<Array, Error> {
    let (fan_in, fan_out) = fans(shape)?;
    scaled_uniform((2.0 / (fan_in + fan_out) as f64).sqrt(), shape)
}

pub fn glorot_normal(shape: &[usize]) -> Result<Array, Error> {
    let (fan_in, fan_out) = fans(shape)?;
    scaled_normal((2.0 / (fan_in + fan_out) as f64).sqrt(), shape)
}

pub fn lecun_uniform(shape: &[usize]) -> Result<Array, Error> {
    let (fan_in, _) = fans(shape)?;
    scaled_uniform((1.0 / fan_in as f64).sqrt(), shape)
}

pub fn lecun_normal(shape: &[usize]) -> Result<Array, Error> {
    let (fan_in, _) = fans(shape)?;
    scaled_normal((1.0 / fan_in as f64).sqrt(), shape)
}

pub fn he_uniform(shape: &[usize]) -> Result<Array, Error> {
    let (fan_in, _) = fans(shape)?;
    scaled_uniform((2.0 / fan_in as f64).sqrt(), shape)
}

pub fn he_normal(shape: &[usize]) -> Result<Array, Error> {
    let (fan_in, _) = fans(shape)?;
    scaled_normal((2.0 / fan_in as f64).sqrt(), shape)
}

/// Kaiming uniform initialization with an explicit fan-in: `U(-sqrt(6 / fan_in), sqrt(6 / fan_in))`.
pub fn kaiming_uniform(fan_in: usize) -> impl Fn(&[usize]) -> Result<Array, Error> + Clone + 'static {
    move |shape| {
        if shape.is_empty() {
            return Err(Error::InvalidOperation(
                "Cannot initialize tensor with empty shape".to_string(),
            ));
        }

        // Zero-sized shapes need no samples.
        if shape.iter().any(|&dim| dim == 0) {
            return Ok(Array::zeros(shape));
        }

        if fan_in == 0 {
            return Err(Error::InvalidOperation(
                "Fan-in cannot be zero for Kaiming initialization".to_string(),
            ));
        }

        let bound = (6.0 / fan_in as f64).sqrt();
        if !bound.is_finite() {
            return Err(Error::InitializationError(format!(
                "non-finite Kaiming bound for fan-in {}",
                fan_in
            )));
        }
        uniform(-bound, bound, shape)
    }
}
