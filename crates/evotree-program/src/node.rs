use std::collections::BTreeSet;

use crate::op::{BinaryOp, UnaryOp};

/// A weighted expression node.
///
/// The node's output is `weight × raw`, where `raw` depends on the [`NodeKind`]. Children
/// are owned, so a tree can never contain shared or cyclic references.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub weight: f64,
    pub kind: NodeKind,
}

/// Node kind with its payload and children.
///
/// Child counts are encoded in the variants, except for [`NodeKind::WeightedSum`] which must
/// hold at least one child (see [`Node::check`]).
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum NodeKind {
    Constant { value: f64 },
    Input { index: usize },
    Unary { op: UnaryOp, child: Box<Node> },
    Binary { op: BinaryOp, left: Box<Node>, right: Box<Node> },
    WeightedSum { children: Vec<Node> },
}

impl Node {
    /// Leaf with a fixed raw `value`.
    #[must_use]
    pub fn constant(weight: f64, value: f64) -> Self {
        Self {
            weight,
            kind: NodeKind::Constant { value },
        }
    }

    /// Leaf reading input dimension `index`.
    #[must_use]
    pub fn input(weight: f64, index: usize) -> Self {
        Self {
            weight,
            kind: NodeKind::Input { index },
        }
    }

    /// `op` applied to the output of `child`.
    #[must_use]
    pub fn unary(weight: f64, op: UnaryOp, child: Node) -> Self {
        Self {
            weight,
            kind: NodeKind::Unary {
                op,
                child: Box::new(child),
            },
        }
    }

    /// `op` applied to the outputs of `left` and `right`.
    #[must_use]
    pub fn binary(weight: f64, op: BinaryOp, left: Node, right: Node) -> Self {
        Self {
            weight,
            kind: NodeKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// Sum of the outputs of `children`.
    ///
    /// # Panics
    ///
    /// Panics if `children` is empty.
    #[must_use]
    pub fn weighted_sum(weight: f64, children: Vec<Node>) -> Self {
        assert!(!children.is_empty(), "weighted sum needs at least one child");
        Self {
            weight,
            kind: NodeKind::WeightedSum { children },
        }
    }

    /// Returns `true` for `Constant` and `Input` nodes.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Constant { .. } | NodeKind::Input { .. }
        )
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Constant { .. } | NodeKind::Input { .. } => 0,
            NodeKind::Unary { .. } => 1,
            NodeKind::Binary { .. } => 2,
            NodeKind::WeightedSum { children } => children.len(),
        }
    }

    #[must_use]
    pub fn child(&self, i: usize) -> Option<&Node> {
        match &self.kind {
            NodeKind::Constant { .. } | NodeKind::Input { .. } => None,
            NodeKind::Unary { child, .. } => (i == 0).then_some(&**child),
            NodeKind::Binary { left, right, .. } => match i {
                0 => Some(left),
                1 => Some(right),
                _ => None,
            },
            NodeKind::WeightedSum { children } => children.get(i),
        }
    }

    /// Mutable access to the `i`-th child.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.child_count()`.
    pub fn child_mut(&mut self, i: usize) -> &mut Node {
        match &mut self.kind {
            NodeKind::Unary { child, .. } if i == 0 => &mut **child,
            NodeKind::Binary { left, .. } if i == 0 => &mut **left,
            NodeKind::Binary { right, .. } if i == 1 => &mut **right,
            NodeKind::WeightedSum { children } => &mut children[i],
            _ => panic!("child index {i} out of range"),
        }
    }

    /// Iterates over direct children in serialization order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        (0..self.child_count()).filter_map(|i| self.child(i))
    }

    /// Visits every node in pre-order (node, then children left to right).
    pub fn visit<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Node),
    {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Visits every node mutably in pre-order.
    pub fn visit_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Node),
    {
        f(self);
        for i in 0..self.child_count() {
            self.child_mut(i).visit_mut(f);
        }
    }

    /// Number of nodes in this subtree.
    #[must_use]
    pub fn complexity(&self) -> usize {
        1 + self.children().map(Node::complexity).sum::<usize>()
    }

    /// Height of this subtree (a leaf has depth 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children().map(Node::depth).max().unwrap_or(0)
    }

    pub(crate) fn collect_inputs(&self, inputs: &mut BTreeSet<usize>) {
        self.visit(&mut |node| {
            if let NodeKind::Input { index } = node.kind {
                inputs.insert(index);
            }
        });
    }

    /// Checks the structural invariants of this subtree against the input arity `dim`.
    pub fn check(&self, dim: usize) -> Result<(), StructureError> {
        match &self.kind {
            NodeKind::Input { index } if *index >= dim => {
                return Err(StructureError::InputOutOfRange { index: *index, dim });
            }
            NodeKind::WeightedSum { children } if children.is_empty() => {
                return Err(StructureError::EmptyWeightedSum);
            }
            _ => {}
        }
        self.children().try_for_each(|child| child.check(dim))
    }
}

/// Violation of a tree invariant.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum StructureError {
    #[display("input index {index} out of range for dimension {dim}")]
    InputOutOfRange { index: usize, dim: usize },
    #[display("weighted sum without children")]
    EmptyWeightedSum,
}
