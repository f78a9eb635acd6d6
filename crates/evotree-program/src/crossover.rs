//! Subtree crossover.
//!
//! Crossover copies a random subtree out of a partner and grafts it somewhere in a clone of
//! the receiver. Both the descent that picks the donor subtree and the descent that picks
//! the graft point stop early with a fixed probability at each level, so shallow and deep
//! positions are both reachable.

use rand::Rng;

use crate::{Program, node::Node};

impl Program {
    /// Returns a clone of a random subtree below the root.
    ///
    /// At each inner node, a uniformly chosen child is returned with probability `p_cut`;
    /// otherwise the descent continues into it. A leaf returns itself.
    ///
    /// # Panics
    ///
    /// Panics if `p_cut` is not in `[0, 1]`.
    #[must_use]
    pub fn random_subtree<R>(&self, rng: &mut R, p_cut: f64) -> Node
    where
        R: Rng + ?Sized,
    {
        self.root.random_subtree(rng, p_cut)
    }

    /// Grafts `subtree` into the tree in place.
    ///
    /// At each inner node, a uniformly chosen child is replaced with probability `p_put`;
    /// otherwise the descent continues into it. Reaching a leaf turns the leaf into a
    /// weighted sum of weight 1 holding only `subtree`.
    ///
    /// # Panics
    ///
    /// Panics if `p_put` is not in `[0, 1]`.
    pub fn emplace_subtree<R>(&mut self, rng: &mut R, subtree: Node, p_put: f64)
    where
        R: Rng + ?Sized,
    {
        self.root.emplace_subtree(rng, subtree, p_put);
    }

    /// Creates a child by grafting a random subtree of `partner` into a clone of `self`.
    ///
    /// # Panics
    ///
    /// Panics if the programs have different dimensions or a probability is not in `[0, 1]`.
    #[must_use]
    pub fn mate<R>(&self, rng: &mut R, partner: &Program, p_cut: f64, p_put: f64) -> Program
    where
        R: Rng + ?Sized,
    {
        assert_eq!(self.dim, partner.dim, "mating programs of different dimension");
        let mut child = self.clone();
        let graft = partner.random_subtree(rng, p_cut);
        child.emplace_subtree(rng, graft, p_put);
        child
    }
}

impl Node {
    fn random_subtree<R>(&self, rng: &mut R, p_cut: f64) -> Node
    where
        R: Rng + ?Sized,
    {
        let mut node = self;
        loop {
            if node.is_leaf() {
                return node.clone();
            }
            let i = rng.random_range(0..node.child_count());
            let Some(child) = node.child(i) else {
                return node.clone();
            };
            if rng.random_bool(p_cut) {
                return child.clone();
            }
            node = child;
        }
    }

    fn emplace_subtree<R>(&mut self, rng: &mut R, subtree: Node, p_put: f64)
    where
        R: Rng + ?Sized,
    {
        let mut node = self;
        loop {
            if node.is_leaf() {
                *node = Node::weighted_sum(1.0, vec![subtree]);
                return;
            }
            let i = rng.random_range(0..node.child_count());
            if rng.random_bool(p_put) {
                *node.child_mut(i) = subtree;
                return;
            }
            node = node.child_mut(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;
    use crate::{
        mutate::MutationCategory,
        node::NodeKind,
        op::{BinaryOp, UnaryOp},
    };

    #[test]
    fn test_leaf_receiver_becomes_weighted_sum() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        let mut program = Program::new(Node::constant(0.5, 2.0), 2).unwrap();
        program.emplace_subtree(&mut rng, Node::input(3.0, 1), 0.5);
        assert_eq!(
            program.root(),
            &Node::weighted_sum(1.0, vec![Node::input(3.0, 1)])
        );
    }

    #[test]
    fn test_leaf_donor_returns_itself() {
        let mut rng = Pcg64Mcg::seed_from_u64(2);
        let program = Program::new(Node::input(0.25, 0), 1).unwrap();
        assert_eq!(program.random_subtree(&mut rng, 0.5), Node::input(0.25, 0));
    }

    #[test]
    fn test_certain_cut_returns_direct_child() {
        let mut rng = Pcg64Mcg::seed_from_u64(3);
        let root = Node::unary(
            2.0,
            UnaryOp::Cos,
            Node::binary(1.0, BinaryOp::Sum, Node::input(1.0, 0), Node::input(1.0, 1)),
        );
        let program = Program::new(root, 2).unwrap();
        let subtree = program.random_subtree(&mut rng, 1.0);
        assert!(matches!(subtree.kind, NodeKind::Binary { .. }));
    }

    #[test]
    fn test_certain_put_replaces_direct_child() {
        let mut rng = Pcg64Mcg::seed_from_u64(4);
        let mut program = crate::tests::scenario_tree();
        program.emplace_subtree(&mut rng, Node::constant(7.0, 7.0), 1.0);
        assert_eq!(program.complexity(), 3);
        assert!(program.root().children().any(|c| *c == Node::constant(7.0, 7.0)));
    }

    #[test]
    fn test_mate_keeps_parents_and_stays_acyclic() {
        let mut rng = Pcg64Mcg::seed_from_u64(5);
        let mut a = Program::random(&mut rng, 4, &[0, 1, 2, 3], 4);
        let mut b = Program::random(&mut rng, 4, &[0, 1, 2, 3], 4);
        for trial in 0..1000 {
            let (a_before, b_before) = (a.clone(), b.clone());
            let child = a.mate(&mut rng, &b, 0.3, 0.3);
            assert_eq!(a, a_before);
            assert_eq!(b, b_before);
            assert!(child.loop_free(), "trial {trial}");
            assert!(child.check().is_ok(), "trial {trial}");

            // keep the parents changing and bounded
            a = if child.complexity() < 200 {
                child
            } else {
                Program::random(&mut rng, 4, &[0, 1, 2, 3], 4)
            };
            b.mutate(&mut rng, MutationCategory::Medium);
            if b.complexity() > 200 {
                b = Program::random(&mut rng, 4, &[0, 1, 2, 3], 4);
            }
        }
    }
}
