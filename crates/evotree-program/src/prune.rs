use crate::{Program, node::Node};

impl Program {
    /// Collapses every node whose weight is non-finite or at most `threshold` in magnitude.
    ///
    /// A collapsed node becomes `Constant { value: 0 }` with weight 1 and loses its subtree.
    /// Children of kept nodes are pruned recursively. Pruning twice with the same threshold
    /// changes nothing the second time. Returns the number of collapsed nodes.
    pub fn prune(&mut self, threshold: f64) -> usize {
        self.root.prune(threshold)
    }
}

impl Node {
    fn prune(&mut self, threshold: f64) -> usize {
        if !self.weight.is_finite() || self.weight.abs() <= threshold {
            if *self != Node::constant(1.0, 0.0) {
                *self = Node::constant(1.0, 0.0);
                return 1;
            }
            return 0;
        }
        (0..self.child_count())
            .map(|i| self.child_mut(i).prune(threshold))
            .sum()
    }
}
