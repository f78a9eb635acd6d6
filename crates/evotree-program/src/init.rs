//! Random tree construction.
//!
//! Trees are built top-down from a multiset of input indices that must appear in the result.
//! Whenever a node branches, the indices are split among its children so that each index
//! lands in exactly one subtree. A node holding a single index may become the `Input` leaf
//! for it; a node holding none becomes a random `Constant`.

use rand::{Rng, seq::SliceRandom};
use rand_distr::StandardNormal;

use crate::{
    Program,
    node::{Node, NodeKind},
    op::{BinaryOp, UnaryOp},
};

/// Maximum number of children of a weighted sum built at the root.
pub const MAX_SUM_CHILDREN: usize = 4;

/// Probability that a non-root branch is unary rather than binary.
const UNARY_BRANCH_PROBABILITY: f64 = 0.6;

impl Program {
    /// Builds a random program over `dim` inputs referencing every index in `inputs`.
    ///
    /// `depth` bounds how many branching levels the builder may add; deeper budgets make
    /// branching more likely at each node.
    ///
    /// # Panics
    ///
    /// Panics if an index in `inputs` is not below `dim`.
    pub fn random<R>(rng: &mut R, dim: usize, inputs: &[usize], depth: usize) -> Self
    where
        R: Rng + ?Sized,
    {
        assert!(inputs.iter().all(|&i| i < dim), "input index out of range");
        Self {
            root: random_node(rng, inputs, depth, true),
            dim,
        }
    }

    /// Extends the tree so it also references every index in `indices`.
    ///
    /// Existing structure is kept: a random leaf is converted into an `Input` (from a
    /// `Constant`) or into a weighted sum of the old input and the new one.
    ///
    /// # Panics
    ///
    /// Panics if an index in `indices` is not below `self.dim()`.
    pub fn add_inputs<R>(&mut self, rng: &mut R, indices: &[usize])
    where
        R: Rng + ?Sized,
    {
        assert!(indices.iter().all(|&i| i < self.dim), "input index out of range");
        let mut present = self.list_inputs();
        for &index in indices {
            if !present.insert(index) {
                continue;
            }
            let mut node = &mut self.root;
            while !node.is_leaf() {
                let i = rng.random_range(0..node.child_count());
                node = node.child_mut(i);
            }
            match node.kind {
                NodeKind::Constant { .. } => node.kind = NodeKind::Input { index },
                NodeKind::Input { index: old } => {
                    let children = vec![Node::input(1.0, old), Node::input(weight(rng), index)];
                    *node = Node::weighted_sum(node.weight, children);
                }
                _ => unreachable!("descent stops at leaves"),
            }
        }
    }
}

/// Initial node weight, drawn from N(1, 0.5).
pub(crate) fn weight<R>(rng: &mut R) -> f64
where
    R: Rng + ?Sized,
{
    1.0 + 0.5 * normal(rng)
}

pub(crate) fn normal<R>(rng: &mut R) -> f64
where
    R: Rng + ?Sized,
{
    rng.sample(StandardNormal)
}

/// A `Constant` or a uniformly chosen `Input` leaf, with a random weight.
pub(crate) fn random_leaf<R>(rng: &mut R, dim: usize) -> Node
where
    R: Rng + ?Sized,
{
    let weight = weight(rng);
    Node {
        weight,
        kind: random_leaf_kind(rng, dim),
    }
}

pub(crate) fn random_leaf_kind<R>(rng: &mut R, dim: usize) -> NodeKind
where
    R: Rng + ?Sized,
{
    if dim > 0 && rng.random_bool(0.5) {
        NodeKind::Input {
            index: rng.random_range(0..dim),
        }
    } else {
        NodeKind::Constant { value: normal(rng) }
    }
}

pub(crate) fn random_unary_op<R>(rng: &mut R) -> UnaryOp
where
    R: Rng + ?Sized,
{
    UnaryOp::ALL[rng.random_range(0..UnaryOp::ALL.len())]
}

pub(crate) fn random_binary_op<R>(rng: &mut R) -> BinaryOp
where
    R: Rng + ?Sized,
{
    BinaryOp::ALL[rng.random_range(0..BinaryOp::ALL.len())]
}

#[expect(clippy::cast_precision_loss)]
fn random_node<R>(rng: &mut R, inputs: &[usize], depth: usize, root: bool) -> Node
where
    R: Rng + ?Sized,
{
    let branch = inputs.len() > 1
        || (depth > 0 && rng.random_bool(depth as f64 / (depth as f64 + 1.0)));
    if !branch {
        return match inputs {
            [index] => Node::input(weight(rng), *index),
            _ => Node::constant(weight(rng), normal(rng)),
        };
    }
    if depth == 0 {
        // out of depth with several indices left: gather them under one sum
        let children = inputs.iter().map(|&i| Node::input(weight(rng), i)).collect();
        return Node::weighted_sum(weight(rng), children);
    }

    let weight = weight(rng);
    if root {
        let count = rng.random_range(2..=MAX_SUM_CHILDREN);
        let children = split_inputs(rng, inputs, count)
            .into_iter()
            .map(|part| random_node(rng, &part, depth - 1, false))
            .collect();
        return Node::weighted_sum(weight, children);
    }
    if rng.random_bool(UNARY_BRANCH_PROBABILITY) {
        let op = random_unary_op(rng);
        Node::unary(weight, op, random_node(rng, inputs, depth - 1, false))
    } else {
        let op = random_binary_op(rng);
        let mut parts = split_inputs(rng, inputs, 2).into_iter();
        let left = parts.next().unwrap_or_default();
        let right = parts.next().unwrap_or_default();
        Node::binary(
            weight,
            op,
            random_node(rng, &left, depth - 1, false),
            random_node(rng, &right, depth - 1, false),
        )
    }
}

/// Randomly splits `inputs` into `parts` groups.
///
/// Every index is placed in exactly one group. When there are at least as many indices as
/// groups, no group is empty and the remaining indices are spread proportionally to random
/// shares; otherwise each index gets its own randomly chosen group.
pub(crate) fn split_inputs<R>(rng: &mut R, inputs: &[usize], parts: usize) -> Vec<Vec<usize>>
where
    R: Rng + ?Sized,
{
    let mut shuffled = inputs.to_vec();
    shuffled.shuffle(rng);
    let mut groups = vec![Vec::new(); parts];
    if shuffled.len() < parts {
        for (group, index) in groups.iter_mut().zip(shuffled) {
            group.push(index);
        }
        groups.shuffle(rng);
        return groups;
    }

    let rest = shuffled.split_off(parts);
    for (group, index) in groups.iter_mut().zip(shuffled) {
        group.push(index);
    }
    let shares: Vec<f64> = (0..parts).map(|_| rng.random::<f64>() + 0.05).collect();
    let total: f64 = shares.iter().sum();
    for index in rest {
        let mut r = rng.random::<f64>() * total;
        let mut chosen = parts - 1;
        for (i, share) in shares.iter().enumerate() {
            if r < *share {
                chosen = i;
                break;
            }
            r -= share;
        }
        groups[chosen].push(index);
    }
    groups
}
