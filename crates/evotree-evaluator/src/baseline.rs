use std::fmt;

use evotree_program::{MutationCategory, ParseError, Tokens};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::{optimizer::UpdateReport, record::Sample};

/// Predicts one constant for every input.
///
/// Serves as the reference score a trained tree has to beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineEvaluator {
    value: f64,
    learning_rate: f64,
}

impl BaselineEvaluator {
    #[must_use]
    pub fn new(value: f64, learning_rate: f64) -> Self {
        Self {
            value,
            learning_rate,
        }
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub fn evaluate(&self, _x: &[f64]) -> f64 {
        self.value
    }

    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.value.is_finite()
    }

    /// Squared error of the constant over `samples`.
    #[must_use]
    pub fn objective(&self, samples: &[Sample<'_>]) -> f64 {
        sum_squares(samples, self.learning_rate, self.value)
    }

    /// Refits the constant to the mean target.
    ///
    /// Accepted only if it strictly lowers the squared error.
    #[must_use]
    pub fn update(&self, samples: &[Sample<'_>]) -> (Self, UpdateReport) {
        let before = self.objective(samples);
        if samples.is_empty() {
            return (*self, UpdateReport::rejected(before));
        }
        #[expect(clippy::cast_precision_loss)]
        let mean = samples
            .iter()
            .map(|s| s.target(self.learning_rate))
            .sum::<f64>()
            / samples.len() as f64;
        let after = sum_squares(samples, self.learning_rate, mean);
        if !mean.is_finite() || after >= before {
            log::debug!("baseline refit rejected: {before} -> {after}");
            return (*self, UpdateReport::rejected(before));
        }
        let next = Self { value: mean, ..*self };
        let change = (mean - self.value).abs();
        let report = UpdateReport {
            success: true,
            objective: after,
            improvement: before - after,
            rel_change: if self.value == 0.0 {
                change
            } else {
                change / self.value.abs()
            },
        };
        (next, report)
    }

    /// Shifts the constant by `N(0, scale)`.
    #[must_use]
    pub fn mutate<R>(&self, rng: &mut R, category: MutationCategory) -> Self
    where
        R: Rng + ?Sized,
    {
        let noise: f64 = rng.sample(StandardNormal);
        Self {
            value: self.value + category.scale() * noise,
            ..*self
        }
    }

    /// Midpoint of the two constants.
    #[must_use]
    pub fn mate(&self, partner: &BaselineEvaluator) -> Self {
        Self {
            value: 0.5 * (self.value + partner.value),
            ..*self
        }
    }

    pub(crate) fn parse_tokens(tokens: &mut Tokens<'_>) -> Result<Self, ParseError> {
        let value = tokens.parse("baseline value")?;
        let learning_rate = tokens.parse("learning rate")?;
        Ok(Self::new(value, learning_rate))
    }
}

fn sum_squares(samples: &[Sample<'_>], learning_rate: f64, value: f64) -> f64 {
    samples
        .iter()
        .map(|s| (value - s.target(learning_rate)).powi(2))
        .sum()
}

impl fmt::Display for BaselineEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "baseline {} {}", self.value, self.learning_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Choice, Record, samples};

    fn records() -> Vec<Record> {
        vec![Record {
            state: vec![],
            options: vec![
                Choice {
                    input: vec![0.0],
                    output: 1.0,
                },
                Choice {
                    input: vec![1.0],
                    output: 2.0,
                },
            ],
            selected_option: 1,
            sum_future_rewards: 6.0,
        }]
    }

    #[test]
    fn test_update_fits_mean_target() {
        let records = records();
        let samples = samples(&records);
        let baseline = BaselineEvaluator::new(0.0, 0.5);
        let (fitted, report) = baseline.update(&samples);
        // targets: 1 and 0.5·2 + 0.5·6 = 4
        assert_eq!(fitted.value(), 2.5);
        assert!(report.success);
        assert_eq!(report.objective, 1.5 * 1.5 * 2.0);
        assert_eq!(fitted.evaluate(&[123.0]), 2.5);

        let (again, report) = fitted.update(&samples);
        assert!(!report.success);
        assert_eq!(again, fitted);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let baseline = BaselineEvaluator::new(1.0, 0.5);
        let (same, report) = baseline.update(&[]);
        assert!(!report.success);
        assert_eq!(same, baseline);
    }
}
