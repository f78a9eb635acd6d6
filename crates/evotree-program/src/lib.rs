//! Differentiable expression trees for genetic programming.
//!
//! A [`Program`] is a weighted expression tree computing a function `ℝⁿ → ℝ` used to score
//! candidate actions. Every node carries a weight multiplying its raw value, and the tree
//! supports:
//!
//! 1. **Forward evaluation** ([`Program::evaluate`], [`Program::forward`]) - deterministic
//!    scalar output, optionally recording per-node [`Activations`]
//! 2. **Weight gradients** ([`Program::dydw`], [`Program::gradient`]) - a reverse-mode pass
//!    over the recorded activations
//! 3. **Structural evolution** - random initialization, mutation ([`MutationCategory`]),
//!    crossover ([`Program::mate`]) and pruning ([`Program::prune`])
//! 4. **Text serialization** - `Display` / `FromStr` in the brace grammar described in
//!    [`serial`]
//!
//! # Architecture
//!
//! ```text
//! Operator Registry (op)
//!     ↓ used by
//! Node tree (node) ── init / mutate / crossover / prune
//!     ↓ evaluated into
//! Activations (eval)
//!     ↓ consumed by
//! Gradient Engine (gradient)
//! ```
//!
//! # Design: Activation Records
//!
//! Forward evaluation never mutates the tree. [`Program::forward`] returns an
//! [`Activations`] record indexed by pre-order position, and the gradient pass reads that
//! record. A tree can therefore be evaluated from several threads at once, and a gradient
//! can never be computed against stale activations of a different input.
//!
//! Every structural operator works on an owned tree: callers clone first, then mutate the
//! clone. Grafted subtrees are clones too, so trees never share nodes and stay acyclic.
//!
//! # Randomness
//!
//! All randomized operations take an explicit `rng: &mut R` so runs are reproducible with a
//! seeded generator.

use std::{
    collections::{BTreeSet, HashSet},
    ptr,
};

pub use self::{
    eval::{Activation, Activations},
    mutate::{Growth, MutationCategory},
    node::{Node, NodeKind, StructureError},
    op::{BinaryOp, UnaryOp, UnknownOperatorError},
    serial::{ParseError, Tokens},
};

mod crossover;
mod eval;
mod gradient;
mod init;
mod mutate;
mod node;
pub mod op;
mod prune;
pub mod serial;

/// A weighted expression tree over `dim` inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    root: Node,
    dim: usize,
}

impl Program {
    /// Wraps `root` after checking it against the input arity `dim`.
    pub fn new(root: Node, dim: usize) -> Result<Self, StructureError> {
        root.check(dim)?;
        Ok(Self { root, dim })
    }

    /// Root node of the tree.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Declared input arity.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of nodes, which is also the number of weights.
    #[must_use]
    pub fn complexity(&self) -> usize {
        self.root.complexity()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Input indices referenced anywhere in the tree.
    #[must_use]
    pub fn list_inputs(&self) -> BTreeSet<usize> {
        let mut inputs = BTreeSet::new();
        self.root.collect_inputs(&mut inputs);
        inputs
    }

    /// Flattens all node weights in pre-order.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        let mut weights = Vec::with_capacity(self.complexity());
        self.root.visit(&mut |node| weights.push(node.weight));
        weights
    }

    /// Overwrites all node weights from a pre-order vector.
    ///
    /// # Panics
    ///
    /// Panics if `weights.len() != self.complexity()`.
    pub fn set_weights(&mut self, weights: &[f64]) {
        assert_eq!(weights.len(), self.complexity());
        let mut iter = weights.iter();
        self.root.visit_mut(&mut |node| {
            if let Some(w) = iter.next() {
                node.weight = *w;
            }
        });
    }

    /// Returns `true` if every weight is finite.
    #[must_use]
    pub fn has_finite_weights(&self) -> bool {
        let mut finite = true;
        self.root.visit(&mut |node| finite &= node.weight.is_finite());
        finite
    }

    /// Re-checks the structural invariants.
    pub fn check(&self) -> Result<(), StructureError> {
        self.root.check(self.dim)
    }

    /// Returns `true` if no node is reachable twice from the root.
    #[must_use]
    pub fn loop_free(&self) -> bool {
        let mut seen = HashSet::new();
        let mut unique = true;
        self.root
            .visit(&mut |node| unique &= seen.insert(ptr::from_ref(node)));
        unique
    }
}
