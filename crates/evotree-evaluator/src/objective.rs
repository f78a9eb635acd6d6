use evotree_program::{Program, op};

use crate::{optimizer::Problem, record::Sample};

/// Regularized squared-error objective of one program over a batch of samples.
///
/// ```text
/// f(w) = Σ (eval_w(input) − target)² + w_reg · Σ |w_i|
/// ```
///
/// Targets are resolved once, at construction, with the evaluator's learning rate.
#[derive(Debug, Clone)]
pub struct Objective<'a> {
    program: Program,
    inputs: Vec<&'a [f64]>,
    targets: Vec<f64>,
    w_reg: f64,
}

impl<'a> Objective<'a> {
    #[must_use]
    pub fn new(program: &Program, samples: &[Sample<'a>], learning_rate: f64, w_reg: f64) -> Self {
        Self {
            program: program.clone(),
            inputs: samples.iter().map(|s| s.input).collect(),
            targets: samples.iter().map(|s| s.target(learning_rate)).collect(),
            w_reg,
        }
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.targets.len()
    }

    fn with_weights(&self, weights: &[f64]) -> Program {
        let mut program = self.program.clone();
        program.set_weights(weights);
        program
    }

    fn penalty(&self, weights: &[f64]) -> f64 {
        self.w_reg * weights.iter().map(|w| w.abs()).sum::<f64>()
    }
}

impl Problem for Objective<'_> {
    fn dimension(&self) -> usize {
        self.program.complexity()
    }

    fn cost(&self, weights: &[f64]) -> f64 {
        let program = self.with_weights(weights);
        let error: f64 = std::iter::zip(&self.inputs, &self.targets)
            .map(|(input, target)| {
                let e = program.evaluate(input) - target;
                e * e
            })
            .sum();
        error + self.penalty(weights)
    }

    fn cost_and_gradient(&self, weights: &[f64]) -> (f64, Vec<f64>) {
        let program = self.with_weights(weights);
        let mut error = 0.0;
        let mut gradient: Vec<f64> = weights.iter().map(|&w| self.w_reg * op::sign(w)).collect();
        for (input, target) in std::iter::zip(&self.inputs, &self.targets) {
            let activations = program.forward(input);
            let e = activations.output() - target;
            error += e * e;
            for (g, d) in gradient.iter_mut().zip(program.dydw(&activations)) {
                *g += 2.0 * e * d;
            }
        }
        (error + self.penalty(weights), gradient)
    }
}
