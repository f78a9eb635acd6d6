//! Weight optimizers.
//!
//! Both strategies minimize a [`Problem`] inside a symmetric box of [`Bounds`] and either
//! return a strictly better point ([`Minimum`]) or an [`OptimizeError`]. They never touch an
//! evaluator; the caller decides whether to commit the returned weights.
//!
//! - [`GradientStep`]: one steepest-descent step with a relative step-size cap
//! - [`QuasiNewton`]: a few iterations of projected limited-memory BFGS

pub use self::{gradient_step::GradientStep, quasi_newton::QuasiNewton};

mod gradient_step;
mod quasi_newton;

/// A differentiable cost function over a flat weight vector.
pub trait Problem {
    fn dimension(&self) -> usize;

    fn cost(&self, x: &[f64]) -> f64;

    /// Cost and gradient at the same point.
    fn cost_and_gradient(&self, x: &[f64]) -> (f64, Vec<f64>);
}

/// Per-component box constraint `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    /// The box `[-limit, limit]`.
    #[must_use]
    pub fn symmetric(limit: f64) -> Self {
        Self {
            lower: -limit,
            upper: limit,
        }
    }

    /// Clamps every component of `x` into the box.
    pub fn project(&self, x: &mut [f64]) {
        for v in x {
            *v = v.clamp(self.lower, self.upper);
        }
    }

    fn at_lower(&self, v: f64) -> bool {
        v <= self.lower
    }

    fn at_upper(&self, v: f64) -> bool {
        v >= self.upper
    }
}

/// Optimizer selection and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::From)]
pub enum Strategy {
    GradientStep(GradientStep),
    QuasiNewton(QuasiNewton),
}

impl Default for Strategy {
    fn default() -> Self {
        Self::GradientStep(GradientStep::default())
    }
}

impl Strategy {
    /// Minimizes `problem` from `x` inside `bounds` with the selected optimizer.
    ///
    /// # Returns
    ///
    /// The improved point, or an [`OptimizeError`] when no strictly better point was found
    pub fn minimize<P>(
        &self,
        problem: &P,
        x: &[f64],
        bounds: Bounds,
    ) -> Result<Minimum, OptimizeError>
    where
        P: Problem + ?Sized,
    {
        match self {
            Self::GradientStep(step) => step.minimize(problem, x, bounds),
            Self::QuasiNewton(qn) => qn.minimize(problem, x, bounds),
        }
    }

    /// Returns the same strategy with its step size scaled to `step_limit`.
    ///
    /// Only [`GradientStep`] has a step limit; other strategies are returned unchanged.
    #[must_use]
    pub fn with_step_limit(self, step_limit: f64) -> Self {
        match self {
            Self::GradientStep(step) => Self::GradientStep(GradientStep { step_limit, ..step }),
            Self::QuasiNewton(_) => self,
        }
    }
}

/// An accepted optimization result.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub cost: f64,
    /// Cost at the starting point.
    pub initial_cost: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum OptimizeError {
    #[display("non-finite objective or gradient")]
    NonFinite,
    #[display("no decrease from objective {cost}")]
    NoDecrease { cost: f64 },
    #[display("line search failed at objective {cost}")]
    LineSearch { cost: f64 },
}

impl OptimizeError {
    /// Objective at the starting point, when it was finite.
    #[must_use]
    pub fn initial_cost(&self) -> Option<f64> {
        match self {
            Self::NonFinite => None,
            Self::NoDecrease { cost } | Self::LineSearch { cost } => Some(*cost),
        }
    }
}

/// Outcome of one evaluator update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateReport {
    pub success: bool,
    /// Objective of the returned evaluator's weights.
    pub objective: f64,
    /// Decrease of the objective; 0 on failure.
    pub improvement: f64,
    /// `‖x_new − x_old‖ / ‖x_old‖`; 0 on failure.
    pub rel_change: f64,
}

impl UpdateReport {
    #[must_use]
    pub fn rejected(objective: f64) -> Self {
        Self {
            success: false,
            objective,
            improvement: 0.0,
            rel_change: 0.0,
        }
    }

    #[must_use]
    pub fn accepted(old: &[f64], minimum: &Minimum) -> Self {
        let change = norm_diff(&minimum.x, old);
        let scale = norm(old);
        Self {
            success: true,
            objective: minimum.cost,
            improvement: minimum.initial_cost - minimum.cost,
            rel_change: if scale > 0.0 { change / scale } else { change },
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    std::iter::zip(a, b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn norm_diff(a: &[f64], b: &[f64]) -> f64 {
    std::iter::zip(a, b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn all_finite(x: &[f64]) -> bool {
    x.iter().all(|v| v.is_finite())
}
