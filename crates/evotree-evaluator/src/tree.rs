use std::{collections::BTreeSet, fmt, str::FromStr};

use evotree_program::{MutationCategory, ParseError, Program, Tokens};
use rand::Rng;

use crate::{
    objective::Objective,
    optimizer::{Bounds, OptimizeError, Problem as _, Strategy, UpdateReport},
    record::Sample,
};

/// Attempts made by [`TreeEvaluator::mutate`] and [`TreeEvaluator::mate`] before giving up.
pub const MAX_ATTEMPTS: usize = 8;
/// Probability of cutting at each level when drawing a donor subtree.
pub const MATE_CUT_PROBABILITY: f64 = 0.3;
/// Probability of grafting at each level of the receiver.
pub const MATE_PUT_PROBABILITY: f64 = 0.3;

/// Tuning of a single tree evaluator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeHyperparams {
    /// Blend factor of the reward-to-go into the selected option's target.
    pub learning_rate: f64,
    /// Weights are kept inside `[-weight_limit, weight_limit]` by the optimizers.
    pub weight_limit: f64,
    /// L1 regularization strength.
    pub w_reg: f64,
    /// Upper bound on node count for mutation and crossover results.
    pub max_complexity: usize,
}

impl Default for TreeHyperparams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            weight_limit: 1e3,
            w_reg: 1e-3,
            max_complexity: 200,
        }
    }
}

/// Label of the operation that produced an evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MutationTag {
    #[display("random")]
    Random,
    #[display("small")]
    Small,
    #[display("medium")]
    Medium,
    #[display("large")]
    Large,
    #[display("mated")]
    Mated,
    #[display("optimized")]
    Optimized,
    #[display("pruned")]
    Pruned,
}

impl MutationTag {
    pub const ALL: [Self; 7] = [
        Self::Random,
        Self::Small,
        Self::Medium,
        Self::Large,
        Self::Mated,
        Self::Optimized,
        Self::Pruned,
    ];
}

impl From<MutationCategory> for MutationTag {
    fn from(category: MutationCategory) -> Self {
        match category {
            MutationCategory::Small => Self::Small,
            MutationCategory::Medium => Self::Medium,
            MutationCategory::Large => Self::Large,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown mutation tag '{name}'")]
pub struct UnknownTagError {
    pub name: String,
}

impl FromStr for MutationTag {
    type Err = UnknownTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.to_string() == s)
            .ok_or_else(|| UnknownTagError { name: s.to_owned() })
    }
}

/// A single program with its training hyperparameters.
///
/// `stable` starts out `true` and is cleared for good the first time an update sees a
/// non-finite objective, gradient or weight. Every operation returns a new evaluator and
/// leaves `self` untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEvaluator {
    program: Program,
    params: TreeHyperparams,
    stable: bool,
    tag: MutationTag,
}

impl TreeEvaluator {
    #[must_use]
    pub fn new(program: Program, params: TreeHyperparams) -> Self {
        Self {
            program,
            params,
            stable: true,
            tag: MutationTag::Random,
        }
    }

    /// Builds an evaluator around [`Program::random`].
    pub fn random<R>(
        rng: &mut R,
        dim: usize,
        inputs: &[usize],
        depth: usize,
        params: TreeHyperparams,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::new(Program::random(rng, dim, inputs, depth), params)
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    #[must_use]
    pub fn params(&self) -> &TreeHyperparams {
        &self.params
    }

    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.stable
    }

    #[must_use]
    pub fn tag(&self) -> MutationTag {
        self.tag
    }

    #[must_use]
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.program.evaluate(x)
    }

    #[must_use]
    pub fn complexity(&self) -> usize {
        self.program.complexity()
    }

    #[must_use]
    pub fn list_inputs(&self) -> BTreeSet<usize> {
        self.program.list_inputs()
    }

    /// Objective of the current weights on `samples`.
    #[must_use]
    pub fn objective(&self, samples: &[Sample<'_>]) -> f64 {
        let objective = self.build_objective(samples);
        objective.cost(&self.program.weights())
    }

    fn build_objective<'a>(&self, samples: &[Sample<'a>]) -> Objective<'a> {
        Objective::new(
            &self.program,
            samples,
            self.params.learning_rate,
            self.params.w_reg,
        )
    }

    fn derive(&self, program: Program, tag: MutationTag) -> Self {
        Self {
            program,
            params: self.params,
            stable: self.stable,
            tag,
        }
    }

    /// Runs `strategy` on a clone and returns it with a report.
    ///
    /// On rejection the returned evaluator carries bitwise the same weights as `self`.
    #[must_use]
    pub fn update(&self, samples: &[Sample<'_>], strategy: &Strategy) -> (Self, UpdateReport) {
        let objective = self.build_objective(samples);
        let weights = self.program.weights();
        let bounds = Bounds::symmetric(self.params.weight_limit);
        let mut next = self.clone();

        match strategy.minimize(&objective, &weights, bounds) {
            Ok(minimum) => {
                let report = UpdateReport::accepted(&weights, &minimum);
                next.program.set_weights(&minimum.x);
                next.tag = MutationTag::Optimized;
                if !next.program.has_finite_weights() {
                    log::warn!("optimizer produced non-finite weights; evaluator is unstable");
                    next.stable = false;
                }
                log::debug!(
                    "accepted update: objective {:.6} -> {:.6} in {} iterations",
                    minimum.initial_cost,
                    minimum.cost,
                    minimum.iterations
                );
                (next, report)
            }
            Err(OptimizeError::NonFinite) => {
                if self.stable {
                    log::warn!("non-finite objective; evaluator is unstable");
                }
                next.stable = false;
                (next, UpdateReport::rejected(f64::NAN))
            }
            Err(e) => {
                log::debug!("rejected update: {e}");
                let objective = e.initial_cost().unwrap_or(f64::NAN);
                (next, UpdateReport::rejected(objective))
            }
        }
    }

    /// Mutated clone within `max_complexity`, or `None` after [`MAX_ATTEMPTS`] oversized
    /// results.
    pub fn mutate<R>(&self, rng: &mut R, category: MutationCategory) -> Option<Self>
    where
        R: Rng + ?Sized,
    {
        for _ in 0..MAX_ATTEMPTS {
            let mut program = self.program.clone();
            program.mutate(rng, category);
            if program.complexity() <= self.params.max_complexity {
                return Some(self.derive(program, category.into()));
            }
        }
        log::trace!("{category} mutation exhausted after {MAX_ATTEMPTS} attempts");
        None
    }

    /// Child carrying a subtree of `partner`, or `None` when the dimensions differ or every
    /// attempt exceeds `max_complexity`.
    ///
    /// The child keeps `self`'s hyperparameters and is stable only if both parents are.
    pub fn mate<R>(&self, rng: &mut R, partner: &TreeEvaluator) -> Option<Self>
    where
        R: Rng + ?Sized,
    {
        if self.program.dim() != partner.program.dim() {
            return None;
        }
        for _ in 0..MAX_ATTEMPTS {
            let program = self.program.mate(
                rng,
                &partner.program,
                MATE_CUT_PROBABILITY,
                MATE_PUT_PROBABILITY,
            );
            if program.complexity() <= self.params.max_complexity {
                let mut child = self.derive(program, MutationTag::Mated);
                child.stable &= partner.stable;
                return Some(child);
            }
        }
        log::trace!("crossover exhausted after {MAX_ATTEMPTS} attempts");
        None
    }

    /// Clone with negligible and non-finite nodes collapsed (see [`Program::prune`]).
    #[must_use]
    pub fn prune(&self, threshold: f64) -> Self {
        let mut program = self.program.clone();
        if program.prune(threshold) == 0 {
            return self.clone();
        }
        self.derive(program, MutationTag::Pruned)
    }

    /// Clone referencing every index in `indices` (see [`Program::add_inputs`]).
    pub fn add_inputs<R>(&self, rng: &mut R, indices: &[usize]) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut program = self.program.clone();
        program.add_inputs(rng, indices);
        self.derive(program, self.tag)
    }

    /// Reads the fields after the `tree` tag.
    pub(crate) fn parse_tokens(tokens: &mut Tokens<'_>) -> Result<Self, ParseError> {
        let learning_rate = tokens.parse("learning rate")?;
        let weight_limit = tokens.parse("weight limit")?;
        let w_reg = tokens.parse("regularization")?;
        let stable = tokens.parse("stability flag")?;
        let tag = tokens.parse("mutation tag")?;
        let max_complexity = tokens.parse("max complexity")?;
        let program = Program::parse_tokens(tokens)?;
        Ok(Self {
            program,
            params: TreeHyperparams {
                learning_rate,
                weight_limit,
                w_reg,
                max_complexity,
            },
            stable,
            tag,
        })
    }
}

impl fmt::Display for TreeEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let TreeHyperparams {
            learning_rate,
            weight_limit,
            w_reg,
            max_complexity,
        } = self.params;
        write!(
            f,
            "tree {learning_rate} {weight_limit} {w_reg} {} {} {max_complexity} {}",
            self.stable, self.tag, self.program
        )
    }
}
