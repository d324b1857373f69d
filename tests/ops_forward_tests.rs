use approx::assert_abs_diff_eq;
use auto_diff_graph::{Array, Bindings, Error, Graph, IndexItem, Shape};

fn arr(data: &[f64], shape: &[usize]) -> Array {
    Array::from_vec(data.to_vec(), shape).unwrap()
}

fn eval(graph: &mut Graph, id: auto_diff_graph::NodeId) -> Array {
    graph.forward(id, &Bindings::new()).unwrap()
}

#[test]
fn test_elementwise_forward_with_broadcasting() {
    let mut graph = Graph::new();
    let a = graph.constant(arr(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]));
    let b = graph.constant(arr(&[10.0, 20.0, 30.0], &[3]));

    let sum = graph.add(a, b).unwrap();
    assert_eq!(eval(&mut graph, sum).to_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);

    let diff = graph.subtract(b, a).unwrap();
    assert_eq!(eval(&mut graph, diff).to_vec(), vec![9.0, 18.0, 27.0, 6.0, 15.0, 24.0]);

    let scaled = graph.multiply(a, 2.0).unwrap();
    assert_eq!(eval(&mut graph, scaled).to_vec(), vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);

    let ratio = graph.divide(b, 10.0).unwrap();
    assert_eq!(eval(&mut graph, ratio).to_vec(), vec![1.0, 2.0, 3.0]);

    let squared = graph.power(a, 2.0).unwrap();
    assert_eq!(eval(&mut graph, squared).to_vec(), vec![1.0, 4.0, 9.0, 16.0, 25.0, 36.0]);
}

#[test]
fn test_comparisons_and_extrema() {
    let mut graph = Graph::new();
    let x = graph.constant(arr(&[1.0, 5.0, 3.0], &[3]));
    let y = graph.constant(arr(&[2.0, 5.0, 1.0], &[3]));

    let eq = graph.equal(x, y).unwrap();
    assert_eq!(eval(&mut graph, eq).to_vec(), vec![0.0, 1.0, 0.0]);
    let lt = graph.less(x, y).unwrap();
    assert_eq!(eval(&mut graph, lt).to_vec(), vec![1.0, 0.0, 0.0]);
    let gt = graph.greater(x, y).unwrap();
    assert_eq!(eval(&mut graph, gt).to_vec(), vec![0.0, 0.0, 1.0]);
    let hi = graph.maximum(x, y).unwrap();
    assert_eq!(eval(&mut graph, hi).to_vec(), vec![2.0, 5.0, 3.0]);
    let lo = graph.minimum(x, y).unwrap();
    assert_eq!(eval(&mut graph, lo).to_vec(), vec![1.0, 5.0, 1.0]);
}

#[test]
fn test_unary_forward() {
    let mut graph = Graph::new();
    let x = graph.constant(arr(&[0.25, 1.0, 4.0], &[3]));

    let neg = graph.negative(x).unwrap();
    assert_eq!(eval(&mut graph, neg).to_vec(), vec![-0.25, -1.0, -4.0]);
    let sq = graph.square(x).unwrap();
    assert_eq!(eval(&mut graph, sq).to_vec(), vec![0.0625, 1.0, 16.0]);
    let root = graph.sqrt(x).unwrap();
    assert_eq!(eval(&mut graph, root).to_vec(), vec![0.5, 1.0, 2.0]);

    let e = graph.exp(x).unwrap();
    let l = graph.log(e).unwrap();
    for (got, want) in eval(&mut graph, l).to_vec().iter().zip([0.25, 1.0, 4.0]) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }
    let t = graph.tanh(x).unwrap();
    assert_abs_diff_eq!(eval(&mut graph, t).to_vec()[1], 1.0f64.tanh(), epsilon = 1e-12);
}

#[test]
fn test_reductions_forward() {
    let mut graph = Graph::new();
    let x = graph.constant(arr(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]));

    let total = graph.sum(x, None, false).unwrap();
    assert_eq!(eval(&mut graph, total).item().unwrap(), 21.0);

    let rows = graph.sum(x, Some(&[1]), false).unwrap();
    let rows_value = eval(&mut graph, rows);
    assert_eq!(rows_value.shape(), &[2]);
    assert_eq!(rows_value.to_vec(), vec![6.0, 15.0]);

    let cols = graph.mean(x, Some(&[0]), true).unwrap();
    let cols_value = eval(&mut graph, cols);
    assert_eq!(cols_value.shape(), &[1, 3]);
    assert_eq!(cols_value.to_vec(), vec![2.5, 3.5, 4.5]);

    let product = graph.prod(x, Some(&[-1]), false).unwrap();
    assert_eq!(eval(&mut graph, product).to_vec(), vec![6.0, 120.0]);

    let lo = graph.min(x, None, false).unwrap();
    assert_eq!(eval(&mut graph, lo).item().unwrap(), 1.0);
    let hi = graph.max(x, Some(&[0]), false).unwrap();
    assert_eq!(eval(&mut graph, hi).to_vec(), vec![4.0, 5.0, 6.0]);
}

#[test]
fn test_argmax_takes_first_maximum() {
    let mut graph = Graph::new();
    let x = graph.constant(arr(&[1.0, 7.0, 7.0, 9.0, 2.0, 9.0], &[2, 3]));

    let flat = graph.argmax(x, None).unwrap();
    assert_eq!(eval(&mut graph, flat).item().unwrap(), 3.0);

    let per_row = graph.argmax(x, Some(-1)).unwrap();
    assert_eq!(eval(&mut graph, per_row).to_vec(), vec![1.0, 0.0]);

    let per_col = graph.argmax(x, Some(0)).unwrap();
    assert_eq!(eval(&mut graph, per_col).to_vec(), vec![1.0, 0.0, 1.0]);
}

#[test]
fn test_dot_forward() {
    let mut graph = Graph::new();
    let a = graph.constant(arr(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]));
    let b = graph.constant(arr(&[1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]));
    let v = graph.constant(arr(&[1.0, 1.0, 1.0], &[3]));

    let mm = graph.dot(a, b).unwrap();
    let mm_value = eval(&mut graph, mm);
    assert_eq!(mm_value.shape(), &[2, 2]);
    assert_eq!(mm_value.to_vec(), vec![4.0, 5.0, 10.0, 11.0]);

    let mv = graph.dot(a, v).unwrap();
    assert_eq!(eval(&mut graph, mv).to_vec(), vec![6.0, 15.0]);

    let inner = graph.dot(v, v).unwrap();
    assert_eq!(eval(&mut graph, inner).item().unwrap(), 3.0);

    let scaled = graph.dot(3.0, v).unwrap();
    assert_eq!(eval(&mut graph, scaled).to_vec(), vec![3.0, 3.0, 3.0]);
}

#[test]
fn test_dot_forward_batched_matches_numpy_layout() {
    // x: (2, 1, 2), y: (3, 2, 2); result[i, j, k, m] = sum_l x[i, j, l] * y[k, l, m].
    let mut graph = Graph::new();
    let x_data: Vec<f64> = (0..4).map(f64::from).collect();
    let y_data: Vec<f64> = (0..12).map(f64::from).collect();
    let x = graph.constant(arr(&x_data, &[2, 1, 2]));
    let y = graph.constant(arr(&y_data, &[3, 2, 2]));
    let z = graph.dot(x, y).unwrap();
    let value = eval(&mut graph, z);
    assert_eq!(value.shape(), &[2, 1, 3, 2]);

    let data = value.to_vec();
    for i in 0..2 {
        for k in 0..3 {
            for m in 0..2 {
                let expected: f64 = (0..2)
                    .map(|l| x_data[i * 2 + l] * y_data[k * 4 + l * 2 + m])
                    .sum();
                assert_eq!(data[i * 6 + k * 2 + m], expected);
            }
        }
    }
}

#[test]
fn test_structural_forward() {
    let mut graph = Graph::new();
    let data: Vec<f64> = (0..6).map(f64::from).collect();
    let x = graph.constant(arr(&data, &[2, 3]));

    let t = graph.transpose(x, None).unwrap();
    assert_eq!(eval(&mut graph, t).to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

    let r = graph.reshape(x, &[-1, 2]).unwrap();
    let r_value = eval(&mut graph, r);
    assert_eq!(r_value.shape(), &[3, 2]);
    assert_eq!(r_value.to_vec(), data);

    let e = graph.expand_dims(x, 1).unwrap();
    assert_eq!(eval(&mut graph, e).shape(), &[2, 1, 3]);
    let s = graph.squeeze(e, Some(&[1])).unwrap();
    assert_eq!(eval(&mut graph, s).shape(), &[2, 3]);

    let p = graph.pad(x, &[(1, 0), (0, 1)]).unwrap();
    let p_value = eval(&mut graph, p);
    assert_eq!(p_value.shape(), &[3, 4]);
    assert_eq!(
        p_value.to_vec(),
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 3.0, 4.0, 5.0, 0.0]
    );
}

#[test]
fn test_getitem_and_setitem_forward() {
    let mut graph = Graph::new();
    let data: Vec<f64> = (0..12).map(f64::from).collect();
    let x = graph.constant(arr(&data, &[3, 4]));

    let row = graph.getitem(x, &[IndexItem::At(-1)]).unwrap();
    assert_eq!(eval(&mut graph, row).to_vec(), vec![8.0, 9.0, 10.0, 11.0]);

    let reversed = graph
        .getitem(x, &[IndexItem::from(..2), IndexItem::slice(None, None, Some(-1))])
        .unwrap();
    assert_eq!(
        eval(&mut graph, reversed).to_vec(),
        vec![3.0, 2.0, 1.0, 0.0, 7.0, 6.0, 5.0, 4.0]
    );

    let replaced = graph
        .setitem(x, &[IndexItem::full(), IndexItem::At(0)], -1.0)
        .unwrap();
    let value = eval(&mut graph, replaced);
    assert_eq!(value.shape(), &[3, 4]);
    assert_eq!(value.to_vec()[0], -1.0);
    assert_eq!(value.to_vec()[4], -1.0);
    assert_eq!(value.to_vec()[1], 1.0);
    // The input is not modified.
    assert_eq!(eval(&mut graph, x).to_vec(), data);
}

#[test]
fn test_generators() {
    let mut graph = Graph::new();
    let x = graph.placeholder(Shape::new(vec![None, Some(2)]));
    let ones = graph.ones_like(x).unwrap();
    let zeros = graph.zeros_like(x).unwrap();
    let dims = graph.shape_of(x).unwrap();
    let bindings = Bindings::new().bind(x, Array::zeros(&[3, 2]));

    assert_eq!(graph.forward(ones, &bindings).unwrap().to_vec(), vec![1.0; 6]);
    assert_eq!(graph.forward(zeros, &bindings).unwrap().shape(), &[3, 2]);
    assert_eq!(graph.forward(dims, &bindings).unwrap().to_vec(), vec![3.0, 2.0]);

    let range = graph.arange(1.0, 2.0, 0.25).unwrap();
    assert_eq!(eval(&mut graph, range).to_vec(), vec![1.0, 1.25, 1.5, 1.75]);

    let r = graph.random(&[4, 4]);
    let first = eval(&mut graph, r);
    assert!(first.to_vec().iter().all(|v| (0.0..1.0).contains(v)));

    let o = graph.ones(&[2]);
    let z = graph.zeros(&[2]);
    let both = graph.add(o, z).unwrap();
    assert_eq!(eval(&mut graph, both).to_vec(), vec![1.0, 1.0]);
}

#[test]
fn test_where_broadcasts_condition() {
    let mut graph = Graph::new();
    let cond = graph.constant(arr(&[1.0, 0.0], &[2, 1]));
    let x = graph.constant(arr(&[1.0, 2.0, 3.0], &[3]));
    let picked = graph.where_(cond, x, 0.0).unwrap();
    assert_eq!(graph.shape(picked).unwrap(), &[2, 3]);
    assert_eq!(eval(&mut graph, picked).to_vec(), vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
}

#[test]
fn test_placeholder_binding_errors() {
    let mut graph = Graph::new();
    let x = graph.placeholder(Shape::new(vec![None, Some(3)]));
    let y = graph.multiply(x, 2.0).unwrap();

    assert!(matches!(
        graph.forward(y, &Bindings::new()),
        Err(Error::MissingBinding(name)) if name == "X(None, 3)"
    ));

    let wrong = Bindings::new().bind(x, Array::zeros(&[2, 4]));
    assert!(matches!(graph.forward(y, &wrong), Err(Error::ShapeMismatch { .. })));

    let good = Bindings::new().bind(x, Array::ones(&[5, 3]));
    assert_eq!(graph.forward(y, &good).unwrap().to_vec(), vec![2.0; 15]);
}
