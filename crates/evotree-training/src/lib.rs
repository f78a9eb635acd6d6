//! Population training for evaluators.
//!
//! Each generation interleaves gradient-based weight fitting with evolutionary search over
//! tree structure.
//!
//! # How Training Works
//!
//! 1. **Population** - Create random tree evaluators from a [`TreeTemplate`](genetic::TreeTemplate)
//! 2. **Optimization** - Each individual runs one weight update against the training samples
//! 3. **Fitness** - The negated objective on the same samples
//! 4. **Selection** - Elites survive; tournaments pick parents among stable individuals
//! 5. **Reproduction** - Crossover or mutation, then pruning
//! 6. **Repeat**
//!
//! # Architecture
//!
//! ```text
//! Records (evotree-evaluator)
//!     ↓ flattened into
//! Samples
//!     ↓ fitted by
//! Evaluator::update (GradientStep | QuasiNewton)
//!     ↓ scored as
//! Fitness
//!     ↓ guides
//! Selection & Reproduction (genetic)
//! ```
//!
//! See the [`genetic`] module for implementation details.
//!
//! # Example
//!
//! ```rust,ignore
//! use evotree_training::genetic::{Population, PopulationEvolver, TreeTemplate};
//!
//! let mut population = Population::random(template, 30, &mut rng);
//! let evolver = PopulationEvolver::default();
//!
//! for generation in 0..100 {
//!     population.optimize(&samples, strategy);
//!     population.evaluate_fitness(&samples);
//!     population = evolver.evolve(&population, &mut rng);
//! }
//! ```

pub mod genetic;
