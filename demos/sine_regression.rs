//! Sine wave regression with a small tanh network built on the graph.
//!
//! Fits noisy y = sin(x) with a mean-squared loss and plain gradient descent written
//! against the variable update protocol. Prints the training loss periodically.

use auto_diff_graph::{init, Array, Bindings, Error, Graph, NodeId, Session, Shape};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

const NUM_SAMPLES: usize = 256;
const NUM_EPOCHS: usize = 2000;
const LEARNING_RATE: f64 = 0.05;
const HIDDEN_SIZE: usize = 32;
const NOISE_STD_DEV: f64 = 0.1;

struct Mlp {
    params: Vec<NodeId>,
    output: NodeId,
}

impl Mlp {
    fn build(graph: &mut Graph, x: NodeId) -> Result<Self, Error> {
        let w1 = graph.variable_with_initializer(&[1, HIDDEN_SIZE], init::kaiming_uniform(1));
        let b1 = graph.variable_with_initializer(&[HIDDEN_SIZE], init::zeros);
        let w2 = graph.variable_with_initializer(&[HIDDEN_SIZE, 1], init::kaiming_uniform(HIDDEN_SIZE));
        let b2 = graph.variable_with_initializer(&[1], init::zeros);

        let h = graph.dot(x, w1)?;
        let h = graph.add(h, b1)?;
        let h = graph.tanh(h)?;
        let out = graph.dot(h, w2)?;
        let output = graph.add(out, b2)?;
        Ok(Self {
            params: vec![w1, b1, w2, b2],
            output,
        })
    }
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let mut rng = rand::rng();
    let mut x_vals = Vec::with_capacity(NUM_SAMPLES);
    let mut y_vals = Vec::with_capacity(NUM_SAMPLES);
    for i in 0..NUM_SAMPLES {
        let x = -PI + 2.0 * PI * (i as f64) / (NUM_SAMPLES as f64);
        let noise: f64 = rng.sample::<f64, _>(StandardNormal) * NOISE_STD_DEV;
        x_vals.push(x);
        y_vals.push(x.sin() + noise);
    }

    let mut graph = Graph::new();
    let x = graph.placeholder(Shape::new(vec![None, Some(1)]));
    let y = graph.placeholder(Shape::new(vec![None, Some(1)]));
    let model = Mlp::build(&mut graph, x)?;
    let diff = graph.subtract(model.output, y)?;
    let squared = graph.square(diff)?;
    let loss = graph.mean(squared, None, false)?;

    let bindings = Bindings::new()
        .training(true)
        .bind(x, Array::from_vec(x_vals, &[NUM_SAMPLES, 1])?)
        .bind(y, Array::from_vec(y_vals, &[NUM_SAMPLES, 1])?);

    let mut session = Session::new();
    for epoch in 0..NUM_EPOCHS {
        session.prepare();
        let loss_value = session.run(&mut graph, &loss, &bindings)?.item()?;
        graph.backward(loss)?;
        for &param in &model.params {
            let step = match graph.gradient(param)? {
                Some(grad) => grad.map(|g| -LEARNING_RATE * g),
                None => continue,
            };
            graph.update_add(param, step)?;
        }
        graph.clear_gradients();

        if epoch % 100 == 0 || epoch == NUM_EPOCHS - 1 {
            println!("Epoch {}: loss = {:.6}", epoch, loss_value);
        }
    }

    let samples = [-PI / 2.0, 0.0, PI / 2.0];
    let sample_bindings = Bindings::new().bind(x, Array::from_vec(samples.to_vec(), &[3, 1])?);
    let predicted = graph.forward(model.output, &sample_bindings)?;
    for (x, y) in samples.iter().zip(predicted.to_vec()) {
        println!("sin({:.3}) ~ {:.4} (true {:.4})", x, y, x.sin());
    }
    Ok(())
}
