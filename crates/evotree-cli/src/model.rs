use anyhow::Context;
use chrono::{DateTime, Utc};
use evotree_evaluator::Evaluator;
use serde::{Deserialize, Serialize};

/// A trained evaluator with its provenance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluatorModel {
    pub name: String,
    pub trained_at: DateTime<Utc>,
    /// `None` when the best individual had no finite fitness.
    pub final_fitness: Option<f64>,
    /// Evaluator in its text format.
    pub evaluator: String,
}

impl EvaluatorModel {
    pub fn new(name: String, fitness: f64, evaluator: &Evaluator) -> Self {
        Self {
            name,
            trained_at: Utc::now(),
            final_fitness: fitness.is_finite().then_some(fitness),
            evaluator: evaluator.to_string(),
        }
    }

    pub fn to_evaluator(&self) -> anyhow::Result<Evaluator> {
        self.evaluator
            .parse()
            .with_context(|| format!("Failed to parse evaluator of model {}", self.name))
    }
}
