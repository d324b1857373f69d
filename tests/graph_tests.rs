//! Construction-time behavior: static shape inference, shape errors and derived names.

use auto_diff_graph::{broadcast_shape, Array, Error, Graph, IndexItem, Shape};

fn shape(dims: &[Option<usize>]) -> Shape {
    Shape::new(dims.to_vec())
}

#[test]
fn test_broadcast_shape_rules() {
    let s = broadcast_shape(&Shape::from([2usize, 3]), &Shape::from([3usize])).unwrap();
    assert_eq!(s, [2, 3]);

    let s = broadcast_shape(&Shape::from([2usize, 1]), &Shape::from([1usize, 4])).unwrap();
    assert_eq!(s, [2, 4]);

    let s = broadcast_shape(&shape(&[None, Some(3)]), &Shape::from([2usize, 3])).unwrap();
    assert_eq!(s, [None, Some(3)]);

    let err = broadcast_shape(&Shape::from([2usize, 3]), &Shape::from([4usize])).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_elementwise_shape_mismatch_fails_at_construction() {
    let mut graph = Graph::new();
    let a = graph.variable(Array::zeros(&[2, 3]));
    let b = graph.variable(Array::zeros(&[2, 4]));
    let nodes_before = graph.len();
    assert!(matches!(graph.add(a, b), Err(Error::ShapeMismatch { .. })));
    assert_eq!(graph.len(), nodes_before);
}

#[test]
fn test_dot_shapes() {
    let mut graph = Graph::new();
    let x = graph.variable(Array::zeros(&[3, 4, 5]));
    let y = graph.variable(Array::zeros(&[6, 5, 7]));
    let z = graph.dot(x, y).unwrap();
    assert_eq!(graph.shape(z).unwrap(), &[3, 4, 6, 7]);

    let v = graph.variable(Array::zeros(&[5]));
    let xv = graph.dot(x, v).unwrap();
    assert_eq!(graph.shape(xv).unwrap(), &[3, 4]);

    let s = graph.dot(x, 2.0).unwrap();
    assert_eq!(graph.shape(s).unwrap(), &[3, 4, 5]);

    let bad = graph.variable(Array::zeros(&[4, 7]));
    assert!(matches!(graph.dot(x, bad), Err(Error::ShapeMismatch { .. })));
}

#[test]
fn test_reduction_shapes() {
    let mut graph = Graph::new();
    let x = graph.placeholder(shape(&[None, Some(3), Some(4)]));

    let all = graph.sum(x, None, false).unwrap();
    assert!(graph.shape(all).unwrap().is_scalar());

    let kept = graph.mean(x, Some(&[1]), true).unwrap();
    assert_eq!(graph.shape(kept).unwrap(), &[None, Some(1), Some(4)]);

    let last = graph.max(x, Some(&[-1]), false).unwrap();
    assert_eq!(graph.shape(last).unwrap(), &[None, Some(3)]);

    assert!(matches!(
        graph.sum(x, Some(&[3]), false),
        Err(Error::InvalidAxis { axis: 3, rank: 3 })
    ));

    let am = graph.argmax(x, Some(1)).unwrap();
    assert_eq!(graph.shape(am).unwrap(), &[None, Some(4)]);
}

#[test]
fn test_structural_shapes() {
    let mut graph = Graph::new();
    let w = graph.variable(Array::zeros(&[1, 2, 3]));

    let t = graph.transpose(w, Some(&[1, 0, 2])).unwrap();
    assert_eq!(graph.shape(t).unwrap(), &[2, 1, 3]);
    let r = graph.transpose(w, None).unwrap();
    assert_eq!(graph.shape(r).unwrap(), &[3, 2, 1]);
    assert!(graph.transpose(w, Some(&[0, 0, 1])).is_err());

    let reshaped = graph.reshape(w, &[3, -1]).unwrap();
    assert_eq!(graph.shape(reshaped).unwrap(), &[3, 2]);
    assert!(matches!(graph.reshape(w, &[4, -1]), Err(Error::ShapeMismatch { .. })));

    let flat = graph.flatten(w).unwrap();
    assert_eq!(graph.shape(flat).unwrap(), &[6]);

    let expanded = graph.expand_dims(w, -1).unwrap();
    assert_eq!(graph.shape(expanded).unwrap(), &[1, 2, 3, 1]);

    let squeezed = graph.squeeze(w, Some(&[0])).unwrap();
    assert_eq!(graph.shape(squeezed).unwrap(), &[2, 3]);
    assert!(graph.squeeze(w, None).is_err());

    let padded = graph.pad(w, &[(0, 0), (1, 1), (2, 0)]).unwrap();
    assert_eq!(graph.shape(padded).unwrap(), &[1, 4, 5]);
    let uniform = graph.pad_uniform(w, 1).unwrap();
    assert_eq!(graph.shape(uniform).unwrap(), &[3, 4, 5]);
}

#[test]
fn test_getitem_shapes() {
    let mut graph = Graph::new();
    let w = graph.variable(Array::zeros(&[4, 5, 6]));

    let row = graph.getitem(w, &[IndexItem::At(1)]).unwrap();
    assert_eq!(graph.shape(row).unwrap(), &[5, 6]);

    let sliced = graph
        .getitem(w, &[IndexItem::full(), IndexItem::from(1..4), IndexItem::slice(None, None, Some(-2))])
        .unwrap();
    assert_eq!(graph.shape(sliced).unwrap(), &[4, 3, 3]);

    assert!(matches!(
        graph.getitem(w, &[IndexItem::At(4)]),
        Err(Error::IndexOutOfBounds { index: 4, size: 4 })
    ));
}

#[test]
fn test_unknown_dimensions_propagate() {
    let mut graph = Graph::new();
    let x = graph.placeholder(shape(&[None, Some(3)]));
    let w = graph.variable(Array::zeros(&[3, 2]));
    let y = graph.dot(x, w).unwrap();
    assert_eq!(graph.shape(y).unwrap(), &[None, Some(2)]);
    let flat = graph.flatten(y).unwrap();
    assert_eq!(graph.shape(flat).unwrap(), &[None]);
    let a = graph.arange_to(5.0).unwrap();
    assert_eq!(graph.shape(a).unwrap(), &[None]);
}

#[test]
fn test_derived_names() {
    let mut graph = Graph::new();
    let w = graph.variable(Array::zeros(&[1, 2, 3]));
    assert_eq!(graph.name(w).unwrap(), "W(1, 2, 3)");

    let x = graph.placeholder(shape(&[None, Some(3)]));
    assert_eq!(graph.name(x).unwrap(), "X(None, 3)");

    let c = graph.constant(1.0);
    assert_eq!(graph.name(c).unwrap(), "1.0");
    let m = graph.constant(Array::zeros(&[4, 3]));
    assert_eq!(graph.name(m).unwrap(), "C(4, 3)");

    let t = graph.transpose(w, Some(&[1, 0, 2])).unwrap();
    assert_eq!(graph.name(t).unwrap(), "transpose(W(1, 2, 3), axes=(1, 0, 2))");

    let f = graph.flatten(w).unwrap();
    assert_eq!(graph.name(f).unwrap(), "flatten(W(1, 2, 3))");

    let item = graph
        .getitem(
            w,
            &[IndexItem::At(0), IndexItem::from(1..), IndexItem::slice(None, Some(-1), Some(-1))],
        )
        .unwrap();
    assert_eq!(graph.name(item).unwrap(), "W(1, 2, 3)[0, 1:, :-1:-1]");

    let v = graph.variable(Array::zeros(&[2]));
    let sum = graph.add(v, 1.0).unwrap();
    assert_eq!(graph.name(sum).unwrap(), "add(W(2,), 1.0)");

    graph.set_name(v, "bias").unwrap();
    assert_eq!(graph.name(sum).unwrap(), "add(bias, 1.0)");
}

#[test]
fn test_invalid_node_is_reported() {
    let mut graph = Graph::new();
    let mut other = Graph::new();
    other.constant(1.0);
    let foreign = other.constant(2.0);
    assert!(matches!(graph.shape(foreign), Err(Error::InvalidNode(1))));
    assert!(matches!(graph.add(foreign, 1.0), Err(Error::InvalidNode(1))));
}

#[test]
fn test_names_on_shared_subgraphs() {
    let mut graph = Graph::new();
    let x = graph.variable(Array::zeros(&[2]));
    let twice = graph.add(x, x).unwrap();
    let y = graph.multiply(twice, twice).unwrap();
    assert_eq!(
        graph.name(y).unwrap(),
        "multiply(add(W(2,), W(2,)), add(W(2,), W(2,)))"
    );
    assert_eq!(graph.describe(y).unwrap(), format!("multiply {}", y));
    assert_eq!(graph.describe(x).unwrap(), "W(2,)");
    graph.set_name(twice, "twice").unwrap();
    assert_eq!(graph.describe(twice).unwrap(), "twice");
    assert_eq!(graph.name(y).unwrap(), "multiply(twice, twice)");
}
