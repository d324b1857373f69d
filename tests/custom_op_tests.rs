use auto_diff_graph::test_utils::check_gradient;
use auto_diff_graph::{Array, Bindings, Error, Graph, Operation, Shape};

/// `x * y + x`, written as a single user-defined operation.
struct MultiplyAdd;

impl Operation for MultiplyAdd {
    fn kind(&self) -> &str {
        "multiply_add"
    }

    fn shape(&self, inputs: &[&Shape]) -> Result<Shape, Error> {
        if inputs[0] != inputs[1] {
            return Err(Error::shape_mismatch(
                "multiply_add",
                inputs[0].clone(),
                inputs[1].clone(),
            ));
        }
        Ok(inputs[0].clone())
    }

    fn compute(&self, inputs: &[&Array]) -> Result<Array, Error> {
        inputs[0].zip_with(inputs[1], |x, y| x * y + x)
    }

    fn gradients(
        &self,
        grad: &Array,
        inputs: &[&Array],
        _output: &Array,
    ) -> Result<Vec<Option<Array>>, Error> {
        let dx = grad.zip_with(&inputs[1].map(|y| y + 1.0), |g, d| g * d)?;
        let dy = grad.zip_with(inputs[0], |g, x| g * x)?;
        Ok(vec![Some(dx), Some(dy)])
    }
}

struct ShapeOnly;

impl Operation for ShapeOnly {
    fn kind(&self) -> &str {
        "shape_only"
    }

    fn shape(&self, inputs: &[&Shape]) -> Result<Shape, Error> {
        Ok(inputs[0].clone())
    }
}

struct Nothing;

impl Operation for Nothing {
    fn kind(&self) -> &str {
        "nothing"
    }
}

/// Declares a scalar output but produces a vector.
struct LiesAboutShape;

impl Operation for LiesAboutShape {
    fn kind(&self) -> &str {
        "lies_about_shape"
    }

    fn shape(&self, _inputs: &[&Shape]) -> Result<Shape, Error> {
        Ok(Shape::scalar())
    }

    fn compute(&self, inputs: &[&Array]) -> Result<Array, Error> {
        Ok(inputs[0].clone())
    }
}

#[test]
fn test_custom_operation_forward_and_backward() {
    let mut graph = Graph::new();
    let x = graph.variable(Array::from_vec(vec![1.0, 2.0], &[2]).unwrap());
    let y = graph.variable(Array::from_vec(vec![3.0, -1.0], &[2]).unwrap());
    let z = graph.custom(MultiplyAdd, &[x, y]).unwrap();
    assert_eq!(graph.name(z).unwrap(), "multiply_add(W(2,), W(2,))");

    let value = graph.forward(z, &Bindings::new()).unwrap();
    assert_eq!(value.to_vec(), vec![4.0, 0.0]);

    check_gradient(&mut graph, z, &[x, y], &Bindings::new(), 1e-6, 1e-5).unwrap();
}

#[test]
fn test_custom_operation_shape_rule_can_reject() {
    let mut graph = Graph::new();
    let x = graph.variable(Array::zeros(&[2]));
    let y = graph.variable(Array::zeros(&[3]));
    assert!(matches!(
        graph.custom(MultiplyAdd, &[x, y]),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_missing_rules_are_not_implemented() {
    let mut graph = Graph::new();
    let x = graph.variable(Array::ones(&[2]));

    assert!(matches!(
        graph.custom(Nothing, &[x]),
        Err(Error::NotImplemented(_))
    ));

    let y = graph.custom(ShapeOnly, &[x]).unwrap();
    assert!(matches!(
        graph.forward(y, &Bindings::new()),
        Err(Error::NotImplemented(_))
    ));
}

#[test]
fn test_missing_gradient_rule_fails_backward() {
    let mut graph = Graph::new();
    let x = graph.variable(Array::ones(&[2]));
    let y = graph.custom(LiesAboutShape, &[x]).unwrap();
    assert!(matches!(
        graph.forward(y, &Bindings::new()),
        Err(Error::ShapeMismatch { .. })
    ));

    let scalar = graph.variable(2.0);
    let z = graph.custom(LiesAboutShape, &[scalar]).unwrap();
    assert_eq!(graph.forward(z, &Bindings::new()).unwrap().item().unwrap(), 2.0);
    assert!(matches!(graph.backward(z), Err(Error::NotImplemented(_))));
}
