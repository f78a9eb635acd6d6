//! Structural and weight mutation.
//!
//! A mutation pass visits the tree top-down. Each visited node:
//!
//! 1. has its weight perturbed by `N(0, s)`, where `s` is the [`MutationCategory`] scale
//! 2. with probability `s`, shrinks to a leaf (inner nodes) or grows into a new branch
//!    (leaves); the two are exclusive
//! 3. otherwise, with a small fixed probability, has its payload tweaked: constant value,
//!    input index, or operator
//!
//! The pass then recurses into the children of nodes that were not shrunk. Subtrees created
//! by growth are not revisited in the same pass.

use rand::Rng;

use crate::{
    Program,
    init::{normal, random_binary_op, random_leaf, random_leaf_kind, random_unary_op},
    node::{Node, NodeKind},
    op::{BinaryOp, UnaryOp},
};

/// Probability of tweaking a node payload when its structure is left unchanged.
const TWEAK_PROBABILITY: f64 = 0.1;

/// Mutation magnitude tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MutationCategory {
    #[display("small")]
    Small,
    #[display("medium")]
    Medium,
    #[display("large")]
    Large,
}

impl MutationCategory {
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Standard deviation of weight noise, also used as the per-node probability of a
    /// structural change.
    #[must_use]
    pub const fn scale(self) -> f64 {
        match self {
            Self::Small => 0.02,
            Self::Medium => 0.1,
            Self::Large => 0.3,
        }
    }
}

/// Shape a leaf grows into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    WeightedSum,
    Unary(UnaryOp),
    Binary(BinaryOp),
}

impl Growth {
    /// Draws a growth shape: 20% weighted sum, 70% unary, 10% binary.
    pub fn random<R>(rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let r = rng.random::<f64>();
        if r < 0.2 {
            Self::WeightedSum
        } else if r < 0.9 {
            Self::Unary(random_unary_op(rng))
        } else {
            Self::Binary(random_binary_op(rng))
        }
    }
}

impl Program {
    /// Mutates the tree in place.
    ///
    /// Callers that need the original must clone first.
    pub fn mutate<R>(&mut self, rng: &mut R, category: MutationCategory)
    where
        R: Rng + ?Sized,
    {
        self.root.mutate(rng, self.dim, category.scale());
    }
}

impl Node {
    fn mutate<R>(&mut self, rng: &mut R, dim: usize, scale: f64)
    where
        R: Rng + ?Sized,
    {
        self.weight += scale * normal(rng);

        if self.is_leaf() {
            if rng.random_bool(scale) {
                let growth = Growth::random(rng);
                self.grow(rng, dim, growth);
            } else if rng.random_bool(TWEAK_PROBABILITY) {
                match &mut self.kind {
                    NodeKind::Constant { value } => *value += scale * normal(rng),
                    NodeKind::Input { index } if dim > 0 => *index = rng.random_range(0..dim),
                    _ => {}
                }
            }
            return;
        }

        if rng.random_bool(scale) {
            self.shrink(rng, dim);
            return;
        }
        if rng.random_bool(TWEAK_PROBABILITY) {
            match &mut self.kind {
                NodeKind::Unary { op, .. } => *op = random_unary_op(rng),
                NodeKind::Binary { op, .. } => *op = random_binary_op(rng),
                _ => {}
            }
        }
        for i in 0..self.child_count() {
            self.child_mut(i).mutate(rng, dim, scale);
        }
    }

    /// Turns this leaf into a branch of the given shape.
    ///
    /// The branch keeps the leaf's weight; the old leaf becomes its first child with weight 1
    /// and any other child slot gets a fresh random leaf. Inner nodes are left unchanged.
    pub fn grow<R>(&mut self, rng: &mut R, dim: usize, growth: Growth)
    where
        R: Rng + ?Sized,
    {
        if !self.is_leaf() {
            return;
        }
        let weight = self.weight;
        let old = Node {
            weight: 1.0,
            kind: self.kind.clone(),
        };
        *self = match growth {
            Growth::WeightedSum => Node::weighted_sum(weight, vec![old, random_leaf(rng, dim)]),
            Growth::Unary(op) => Node::unary(weight, op, old),
            Growth::Binary(op) => Node::binary(weight, op, old, random_leaf(rng, dim)),
        };
    }

    /// Collapses this node into a random leaf, keeping its weight.
    pub fn shrink<R>(&mut self, rng: &mut R, dim: usize)
    where
        R: Rng + ?Sized,
    {
        self.kind = random_leaf_kind(rng, dim);
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    #[test]
    fn test_forced_sigmoid_growth_stays_finite() {
        let mut rng = Pcg64Mcg::seed_from_u64(9);
        let mut program = crate::tests::scenario_tree();
        let constant = program.root.child_mut(1);
        constant.grow(&mut rng, 2, Growth::Unary(UnaryOp::Sigmoid));
        assert_eq!(constant.weight, 1.0);
        assert!(matches!(
            constant.kind,
            NodeKind::Unary {
                op: UnaryOp::Sigmoid,
                ..
            }
        ));
        assert!(program.check().is_ok());

        // sigmoid(3) scaled by the former leaf weight of 1, next to the untouched 2·4 branch
        let y = program.evaluate(&[4.0, 0.0]) - 8.0;
        assert!(y.is_finite());
        assert!(y > 0.0 && y < 1.0);
    }

    #[test]
    fn test_grow_keeps_old_leaf_as_first_child() {
        let mut rng = Pcg64Mcg::seed_from_u64(10);
        let mut node = Node::input(0.5, 1);
        node.grow(&mut rng, 2, Growth::Binary(BinaryOp::Sum));
        assert_eq!(node.weight, 0.5);
        assert_eq!(node.child(0), Some(&Node::input(1.0, 1)));
        assert_eq!(node.child_count(), 2);
    }

    #[test]
    fn test_mutation_preserves_structure() {
        let mut rng = Pcg64Mcg::seed_from_u64(12);
        let mut program = Program::random(&mut rng, 5, &[0, 1, 2, 3, 4], 4);
        for trial in 0..600 {
            let category = MutationCategory::ALL[trial % 3];
            program.mutate(&mut rng, category);
            assert!(program.check().is_ok(), "trial {trial}");
            assert!(program.loop_free());
            if program.complexity() > 300 {
                program = Program::random(&mut rng, 5, &[0, 1, 2, 3, 4], 4);
            }
        }
    }

    #[test]
    fn test_small_mutation_changes_weights_slightly() {
        let mut rng = Pcg64Mcg::seed_from_u64(13);
        let mut changed = 0;
        for _ in 0..50 {
            let original = Program::random(&mut rng, 3, &[0, 1, 2], 3);
            let mut mutated = original.clone();
            mutated.mutate(&mut rng, MutationCategory::Small);
            if same_shape(original.root(), mutated.root()) {
                let diff: f64 = std::iter::zip(original.weights(), mutated.weights())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                assert!(diff < 0.2);
                changed += usize::from(diff > 0.0);
            }
        }
        assert!(changed > 0);
    }

    #[test]
    fn test_growth_distribution() {
        let mut rng = Pcg64Mcg::seed_from_u64(14);
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            match Growth::random(&mut rng) {
                Growth::WeightedSum => counts[0] += 1,
                Growth::Unary(_) => counts[1] += 1,
                Growth::Binary(_) => counts[2] += 1,
            }
        }
        assert!((1700..2300).contains(&counts[0]));
        assert!((6600..7400).contains(&counts[1]));
        assert!((800..1200).contains(&counts[2]));
    }

    fn same_shape(a: &Node, b: &Node) -> bool {
        std::mem::discriminant(&a.kind) == std::mem::discriminant(&b.kind)
            && a.child_count() == b.child_count()
            && std::iter::zip(a.children(), b.children()).all(|(x, y)| same_shape(x, y))
    }
}
