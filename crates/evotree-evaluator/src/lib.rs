//! Trainable evaluators built on differentiable expression trees.
//!
//! An [`Evaluator`] scores candidate actions. It is fitted to game [`Record`]s by one of
//! two weight optimizers and evolved by mutation and crossover.
//!
//! # Variants
//!
//! - [`TreeEvaluator`]: one [`Program`](evotree_program::Program) with its hyperparameters
//! - [`TeamEvaluator`]: members chosen per input by one designated input dimension
//! - [`BaselineEvaluator`]: a single constant, fitted in closed form
//!
//! # Training
//!
//! ```text
//! Records ──samples()──> Samples ──Objective──> Strategy (GradientStep | QuasiNewton)
//!                                                    │
//!                        improved clone + UpdateReport
//! ```
//!
//! Updates never modify the evaluator they are called on. A rejected update returns a clone
//! with bitwise identical weights. The first non-finite objective, gradient or weight marks
//! a tree evaluator unstable for good; callers should stop breeding from it.
//!
//! # Serialization
//!
//! `Display` / `FromStr` use a tagged, whitespace-delimited format built on the program
//! grammar:
//!
//! ```text
//! tree <learning_rate> <weight_limit> <w_reg> <stable> <mutation_tag> <max_complexity> <program>
//! team <selector> <count> <evaluator>{count}
//! baseline <value> <learning_rate>
//! ```

pub use self::{
    baseline::BaselineEvaluator,
    evaluator::{Evaluator, EvaluatorParseError},
    objective::Objective,
    optimizer::{GradientStep, QuasiNewton, Strategy, UpdateReport},
    record::{Choice, Record, RecordError, Sample, discounted_returns, samples},
    team::TeamEvaluator,
    tree::{MutationTag, TreeEvaluator, TreeHyperparams, UnknownTagError},
};

mod baseline;
mod evaluator;
mod objective;
pub mod optimizer;
pub mod record;
mod team;
mod tree;
