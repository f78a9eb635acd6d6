//! Reverse-mode weight gradients.
//!
//! The pass walks the tree in the same pre-order as [`Program::weights`], so gradient and
//! weight vectors stay index-aligned. Each node receives `alpha`, the derivative of the root
//! output with respect to the node's output, and writes `alpha × raw` as the derivative with
//! respect to its own weight. A node whose weight is exactly 0 writes 0: a dead weight stays
//! frozen until pruning removes it.

use crate::{
    Program,
    eval::{Activation, Activations},
    node::{Node, NodeKind},
};

impl Program {
    /// Derivatives of the root output with respect to every weight, in pre-order.
    ///
    /// `activations` must come from [`Program::forward`] on this same program.
    ///
    /// # Panics
    ///
    /// Panics if `activations` does not have one entry per node.
    #[must_use]
    pub fn dydw(&self, activations: &Activations) -> Vec<f64> {
        assert_eq!(activations.len(), self.complexity());
        let mut dydw = vec![0.0; activations.len()];
        let mut offset = 0;
        self.root
            .calculate_dw(activations.as_slice(), &mut dydw, &mut offset, 1.0);
        dydw
    }

    /// Gradient of the squared error `(target - y)²` with respect to every weight.
    ///
    /// # Panics
    ///
    /// Panics if `input.len() < self.dim()`.
    #[must_use]
    pub fn gradient(&self, input: &[f64], target: f64) -> Vec<f64> {
        let activations = self.forward(input);
        let delta = target - activations.output();
        let mut grad = self.dydw(&activations);
        for g in &mut grad {
            *g *= -2.0 * delta;
        }
        grad
    }
}

impl Node {
    fn calculate_dw(
        &self,
        activations: &[Activation],
        dydw: &mut [f64],
        offset: &mut usize,
        alpha: f64,
    ) {
        let act = activations[*offset];
        dydw[*offset] = if self.weight == 0.0 {
            0.0
        } else {
            alpha * act.raw
        };
        *offset += 1;

        let alpha = alpha * self.weight;
        match &self.kind {
            NodeKind::Constant { .. } | NodeKind::Input { .. } => {}
            NodeKind::Unary { child, .. } => {
                child.calculate_dw(activations, dydw, offset, alpha * act.local[0]);
            }
            NodeKind::Binary { left, right, .. } => {
                left.calculate_dw(activations, dydw, offset, alpha * act.local[0]);
                right.calculate_dw(activations, dydw, offset, alpha * act.local[1]);
            }
            NodeKind::WeightedSum { children } => {
                for child in children {
                    child.calculate_dw(activations, dydw, offset, alpha);
                }
            }
        }
    }
}
