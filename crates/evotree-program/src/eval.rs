//! Forward evaluation.

use crate::{Program, node::Node, node::NodeKind};

/// Forward-pass values of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Activation {
    /// Value before the node weight is applied.
    pub raw: f64,
    /// `weight × raw`, the value seen by the parent.
    pub output: f64,
    /// Partial derivatives of `raw` with respect to the first two children's outputs.
    ///
    /// Unused for leaves; every child of a weighted sum has partial 1.
    pub(crate) local: [f64; 2],
}

/// Per-node activations of one forward pass, indexed by pre-order position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activations {
    nodes: Vec<Activation>,
}

impl Activations {
    /// Output of the root node.
    #[must_use]
    pub fn output(&self) -> f64 {
        self.nodes.first().map_or(0.0, |a| a.output)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Activation> {
        self.nodes.get(index)
    }

    pub(crate) fn as_slice(&self) -> &[Activation] {
        &self.nodes
    }
}

impl Program {
    /// Evaluates the program on `x`.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() < self.dim()`.
    #[must_use]
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        assert!(x.len() >= self.dim, "input shorter than program dimension");
        self.root.output(x)
    }

    /// Evaluates the program on `x`, recording every node's activation for the gradient pass.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() < self.dim()`.
    #[must_use]
    pub fn forward(&self, x: &[f64]) -> Activations {
        assert!(x.len() >= self.dim, "input shorter than program dimension");
        let mut nodes = Vec::with_capacity(self.complexity());
        self.root.forward(x, &mut nodes);
        Activations { nodes }
    }
}

impl Node {
    fn output(&self, x: &[f64]) -> f64 {
        let raw = match &self.kind {
            NodeKind::Constant { value } => *value,
            NodeKind::Input { index } => x[*index],
            NodeKind::Unary { op, child } => op.apply(child.output(x)),
            NodeKind::Binary { op, left, right } => op.apply(left.output(x), right.output(x)),
            NodeKind::WeightedSum { children } => children.iter().map(|c| c.output(x)).sum(),
        };
        self.weight * raw
    }

    fn forward(&self, x: &[f64], nodes: &mut Vec<Activation>) -> f64 {
        let slot = nodes.len();
        nodes.push(Activation::default());
        let (raw, local) = match &self.kind {
            NodeKind::Constant { value } => (*value, [0.0; 2]),
            NodeKind::Input { index } => (x[*index], [0.0; 2]),
            NodeKind::Unary { op, child } => {
                let y = child.forward(x, nodes);
                (op.apply(y), [op.derivative(y), 0.0])
            }
            NodeKind::Binary { op, left, right } => {
                let a = left.forward(x, nodes);
                let b = right.forward(x, nodes);
                let (da, db) = op.partials(a, b);
                (op.apply(a, b), [da, db])
            }
            NodeKind::WeightedSum { children } => {
                let raw = children.iter().map(|c| c.forward(x, nodes)).sum();
                (raw, [1.0; 2])
            }
        };
        let output = self.weight * raw;
        nodes[slot] = Activation { raw, output, local };
        output
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64Mcg;

    use super::*;
    use crate::op::{BinaryOp, UnaryOp};

    #[test]
    fn test_forward_matches_evaluate() {
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        for _ in 0..50 {
            let program = Program::random(&mut rng, 4, &[0, 1, 2, 3], 4);
            let x: Vec<f64> = (0..4).map(|_| rng.random_range(-2.0..2.0)).collect();
            let acts = program.forward(&x);
            assert_eq!(acts.len(), program.complexity());
            assert_eq!(acts.output().to_bits(), program.evaluate(&x).to_bits());
        }
    }

    #[test]
    fn test_repeated_evaluation_is_deterministic() {
        let mut rng = Pcg64Mcg::seed_from_u64(11);
        let program = Program::random(&mut rng, 3, &[0, 1, 2], 5);
        let x = [0.3, -1.2, 2.5];
        let first = program.evaluate(&x);
        for _ in 0..10 {
            assert_eq!(program.evaluate(&x).to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_activation_records_raw_and_output() {
        let root = Node::binary(
            0.5,
            BinaryOp::Product,
            Node::input(2.0, 0),
            Node::unary(3.0, UnaryOp::Abs, Node::input(1.0, 1)),
        );
        let program = Program::new(root, 2).unwrap();
        let acts = program.forward(&[1.5, -2.0]);
        // pre-order: product, input 0, abs, input 1
        assert_eq!(acts.get(1).unwrap().output, 3.0);
        assert_eq!(acts.get(2).unwrap().raw, 2.0);
        assert_eq!(acts.get(2).unwrap().output, 6.0);
        assert_eq!(acts.get(0).unwrap().raw, 18.0);
        assert_eq!(acts.output(), 9.0);
    }

    #[test]
    #[should_panic(expected = "input shorter")]
    fn test_short_input_panics() {
        let program = crate::tests::scenario_tree();
        let _ = program.evaluate(&[1.0]);
    }
}
