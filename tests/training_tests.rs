//! End-to-end scenarios: the graph driven by a hand-written SGD loop.

use approx::assert_abs_diff_eq;
use auto_diff_graph::{Array, Bindings, Error, Graph, NodeId, Session, Shape};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_array(rng: &mut StdRng, shape: &[usize]) -> Array {
    let size: usize = shape.iter().product();
    let data = (0..size).map(|_| rng.random_range(-1.0..1.0)).collect();
    Array::from_vec(data, shape).unwrap()
}

fn sgd_step(graph: &mut Graph, params: &[NodeId], learning_rate: f64) -> Result<(), Error> {
    for &param in params {
        let step = match graph.gradient(param)? {
            Some(grad) => grad.map(|g| -learning_rate * g),
            None => continue,
        };
        graph.update_add(param, step)?;
    }
    graph.clear_gradients();
    Ok(())
}

#[test]
fn test_linear_regression_converges() -> Result<(), Error> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);
    let true_w = [2.0, -3.0, 0.5];
    let true_b = 1.5;
    let make_targets = |x: &Array| -> Array {
        let data = x
            .to_vec()
            .chunks(3)
            .map(|row| row.iter().zip(&true_w).map(|(a, w)| a * w).sum::<f64>() + true_b)
            .collect();
        Array::from_vec(data, &[x.shape()[0]]).unwrap()
    };

    let mut graph = Graph::new();
    let x = graph.placeholder(Shape::new(vec![None, Some(3)]));
    let y = graph.placeholder(Shape::new(vec![None]));
    let w = graph.variable(Array::zeros(&[3]));
    let b = graph.variable(0.0);
    let xw = graph.dot(x, w)?;
    let y_pred = graph.add(xw, b)?;
    let diff = graph.subtract(y, y_pred)?;
    let squared = graph.square(diff)?;
    let loss = graph.mean(squared, None, false)?;

    let train_x = random_array(&mut rng, &[32, 3]);
    let bindings = Bindings::new()
        .bind(x, train_x.clone())
        .bind(y, make_targets(&train_x));

    let mut session = Session::new();
    let mut last_loss = f64::INFINITY;
    for _ in 0..1000 {
        session.prepare();
        last_loss = session.run(&mut graph, &loss, &bindings)?.item()?;
        graph.backward(loss)?;
        sgd_step(&mut graph, &[w, b], 0.1)?;
    }
    assert!(last_loss < 1e-6, "loss did not converge: {}", last_loss);

    let learned = graph.materialize(w)?.to_vec();
    for (got, want) in learned.iter().zip(&true_w) {
        assert_abs_diff_eq!(*got, *want, epsilon = 1e-3);
    }
    assert_abs_diff_eq!(graph.materialize(b)?.item()?, true_b, epsilon = 1e-3);

    let test_x = random_array(&mut rng, &[8, 3]);
    let test_bindings = Bindings::new().bind(x, test_x.clone());
    let predicted = graph.forward(y_pred, &test_bindings)?.to_vec();
    for (p, t) in predicted.iter().zip(make_targets(&test_x).to_vec()) {
        assert!((p - t).abs() < 1.0);
    }
    Ok(())
}

/// Row-wise softmax of `logits` with the row maximum subtracted first.
fn softmax(graph: &mut Graph, logits: NodeId) -> Result<NodeId, Error> {
    let row_max = graph.max(logits, Some(&[-1]), true)?;
    let shifted = graph.subtract(logits, row_max)?;
    let exp = graph.exp(shifted)?;
    let total = graph.sum(exp, Some(&[-1]), true)?;
    graph.divide(exp, total)
}

#[test]
fn test_softmax_cross_entropy_fits_labels() -> Result<(), Error> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(1);
    let mut graph = Graph::new();
    let x = graph.placeholder(Shape::new(vec![None, Some(3)]));
    let labels = graph.placeholder(Shape::new(vec![None, Some(2)]));
    let w = graph.variable(random_array(&mut rng, &[3, 2]));
    let b = graph.variable(Array::zeros(&[2]));

    let xw = graph.dot(x, w)?;
    let logits = graph.add(xw, b)?;
    let probs = softmax(&mut graph, logits)?;
    let log_probs = graph.log(probs)?;
    let picked = graph.multiply(labels, log_probs)?;
    let per_row = graph.sum(picked, Some(&[-1]), false)?;
    let mean = graph.mean(per_row, None, false)?;
    let loss = graph.negative(mean)?;
    let prediction = graph.argmax(probs, Some(-1))?;

    let inputs = Array::from_vec(vec![0.5, -1.0, 2.0, 1.5, 0.3, -0.7], &[2, 3])?;
    let targets = Array::from_vec(vec![0.0, 1.0, 1.0, 0.0], &[2, 2])?;
    let bindings = Bindings::new().bind(x, inputs).bind(labels, targets);

    let mut session = Session::new();
    let mut first_loss = None;
    for _ in 0..5000 {
        session.prepare();
        let value = session.run(&mut graph, &loss, &bindings)?.item()?;
        first_loss.get_or_insert(value);
        graph.backward(loss)?;
        sgd_step(&mut graph, &[w, b], 0.05)?;
    }

    session.prepare();
    let [final_loss, classes] = <[Array; 2]>::try_from(session.run(
        &mut graph,
        &[loss, prediction],
        &bindings,
    )?)
    .map_err(|_| Error::InternalLogicError("expected two fetched values".to_string()))?;
    assert!(final_loss.item()? < first_loss.unwrap_or(f64::INFINITY));
    assert_eq!(classes.to_vec(), vec![1.0, 0.0]);
    Ok(())
}
