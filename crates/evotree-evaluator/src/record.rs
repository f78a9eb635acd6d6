//! Training records produced by the game layer.
//!
//! A [`Record`] is one decision point: the candidate options the agent scored, the option
//! it selected, and the discounted reward that followed. Optimizers do not read records
//! directly; they read [`Sample`]s, one per option, produced by [`samples`].
//!
//! # Soft Targets
//!
//! The selected option's observed output is blended toward the reward-to-go:
//!
//! ```text
//! target = (1 - η) · output + η · sum_future_rewards
//! ```
//!
//! where `η` is the learning rate of the evaluator being trained. Unselected options keep
//! their observed output as target.

use serde::{Deserialize, Serialize};

/// One candidate action: the evaluator input and the score observed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Game state concatenated with the choice features.
    pub input: Vec<f64>,
    pub output: f64,
}

/// One decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub state: Vec<f64>,
    pub options: Vec<Choice>,
    pub selected_option: usize,
    /// Discounted sum of the rewards from this decision on (see [`discounted_returns`]).
    pub sum_future_rewards: f64,
}

/// Inconsistent record.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum RecordError {
    #[display("record has no options")]
    NoOptions,
    #[display("selected option {selected} out of range for {count} options")]
    SelectedOutOfRange { selected: usize, count: usize },
    #[display("option input has length {found}, expected {expected}")]
    InputLength { expected: usize, found: usize },
}

impl Record {
    /// Checks that the record has options of a single input length and a valid selection.
    pub fn validate(&self) -> Result<(), RecordError> {
        let Some(first) = self.options.first() else {
            return Err(RecordError::NoOptions);
        };
        if self.selected_option >= self.options.len() {
            return Err(RecordError::SelectedOutOfRange {
                selected: self.selected_option,
                count: self.options.len(),
            });
        }
        let expected = first.input.len();
        match self.options.iter().find(|c| c.input.len() != expected) {
            Some(c) => Err(RecordError::InputLength {
                expected,
                found: c.input.len(),
            }),
            None => Ok(()),
        }
    }

    /// One sample per option; only the selected option carries the reward.
    pub fn samples(&self) -> impl Iterator<Item = Sample<'_>> {
        self.options.iter().enumerate().map(|(i, choice)| Sample {
            input: &choice.input,
            output: choice.output,
            reward: (i == self.selected_option).then_some(self.sum_future_rewards),
        })
    }
}

/// One option flattened out of a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<'a> {
    pub input: &'a [f64],
    /// Observed output for this option.
    pub output: f64,
    /// Reward-to-go, present only for the selected option.
    pub reward: Option<f64>,
}

impl Sample<'_> {
    /// Soft regression target for an evaluator with the given learning rate.
    #[must_use]
    pub fn target(&self, learning_rate: f64) -> f64 {
        match self.reward {
            Some(reward) => (1.0 - learning_rate) * self.output + learning_rate * reward,
            None => self.output,
        }
    }
}

/// Flattens every option of every record into samples.
#[must_use]
pub fn samples(records: &[Record]) -> Vec<Sample<'_>> {
    records.iter().flat_map(Record::samples).collect()
}

/// Reward-to-go of each step: `out[i] = rewards[i] + gamma · out[i + 1]`.
#[must_use]
pub fn discounted_returns(rewards: &[f64], gamma: f64) -> Vec<f64> {
    let mut returns = vec![0.0; rewards.len()];
    let mut acc = 0.0;
    for (out, reward) in returns.iter_mut().zip(rewards).rev() {
        acc = reward + gamma * acc;
        *out = acc;
    }
    returns
}
