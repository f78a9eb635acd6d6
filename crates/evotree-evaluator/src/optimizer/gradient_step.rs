use super::{Bounds, Minimum, OptimizeError, Problem, all_finite, norm};

/// Single bounded steepest-descent step.
///
/// The step `Δ = −∇f(x)` is rescaled so that `‖Δ‖ / ‖x‖` never exceeds `step_limit`, and
/// the candidate is projected into the bounds. The step is accepted only if it strictly
/// decreases the cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStep {
    /// Maximum relative step length.
    pub step_limit: f64,
    /// Clamp each gradient component to the magnitude of its weight before stepping.
    pub ratio_clamp: bool,
}

impl Default for GradientStep {
    fn default() -> Self {
        Self {
            step_limit: 0.1,
            ratio_clamp: false,
        }
    }
}

impl GradientStep {
    /// Takes one bounded step from `x`, failing with [`OptimizeError::NoDecrease`] if it
    /// does not lower the cost.
    pub fn minimize<P>(
        &self,
        problem: &P,
        x: &[f64],
        bounds: Bounds,
    ) -> Result<Minimum, OptimizeError>
    where
        P: Problem + ?Sized,
    {
        let (f0, g) = problem.cost_and_gradient(x);
        if !f0.is_finite() || !all_finite(&g) {
            return Err(OptimizeError::NonFinite);
        }

        let mut delta: Vec<f64> = g.iter().map(|gi| -gi).collect();
        if self.ratio_clamp {
            for (d, xi) in delta.iter_mut().zip(x) {
                *d = d.clamp(-xi.abs(), xi.abs());
            }
        }

        let step = norm(&delta);
        if step == 0.0 {
            return Err(OptimizeError::NoDecrease { cost: f0 });
        }
        let limit = self.step_limit * norm(x);
        if step > limit && limit > 0.0 {
            let scale = limit / step;
            for d in &mut delta {
                *d *= scale;
            }
        }

        let mut candidate: Vec<f64> = std::iter::zip(x, &delta).map(|(xi, d)| xi + d).collect();
        bounds.project(&mut candidate);
        let f1 = problem.cost(&candidate);
        if !f1.is_finite() {
            return Err(OptimizeError::NonFinite);
        }
        if f1 < f0 {
            Ok(Minimum {
                x: candidate,
                cost: f1,
                initial_cost: f0,
                iterations: 1,
            })
        } else {
            Err(OptimizeError::NoDecrease { cost: f0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::tests::Quadratic;

    fn quadratic() -> Quadratic {
        Quadratic {
            center: vec![1.0, -2.0, 0.5],
            curvature: vec![1.0, 3.0, 0.5],
        }
    }

    #[test]
    fn test_step_is_monotone() {
        let problem = quadratic();
        let step = GradientStep::default();
        let mut x = vec![4.0, 4.0, -4.0];
        let mut cost = problem.cost(&x);
        for _ in 0..50 {
            match step.minimize(&problem, &x, Bounds::symmetric(10.0)) {
                Ok(minimum) => {
                    assert!(minimum.cost < cost);
                    assert_eq!(minimum.initial_cost, cost);
                    cost = minimum.cost;
                    x = minimum.x;
                }
                Err(OptimizeError::NoDecrease { cost: c }) => assert_eq!(c, cost),
                Err(e) => panic!("{e}"),
            }
        }
        assert!(cost < 5.0, "stalled at {cost}");
    }

    #[test]
    fn test_step_respects_relative_limit() {
        let problem = quadratic();
        let step = GradientStep {
            step_limit: 0.01,
            ratio_clamp: false,
        };
        let x = vec![4.0, 4.0, -4.0];
        let minimum = step.minimize(&problem, &x, Bounds::symmetric(10.0)).unwrap();
        let moved = super::super::norm_diff(&minimum.x, &x);
        assert!((moved - 0.01 * norm(&x)).abs() < 1e-12);
    }

    #[test]
    fn test_step_is_projected_into_bounds() {
        let problem = Quadratic {
            center: vec![100.0],
            curvature: vec![1.0],
        };
        let step = GradientStep {
            step_limit: 10.0,
            ratio_clamp: false,
        };
        let minimum = step.minimize(&problem, &[1.0], Bounds::symmetric(2.0)).unwrap();
        assert_eq!(minimum.x, vec![2.0]);
    }

    #[test]
    fn test_ratio_clamp_keeps_zero_weights_fixed() {
        let problem = quadratic();
        let step = GradientStep {
            step_limit: 1.0,
            ratio_clamp: true,
        };
        let minimum = step
            .minimize(&problem, &[0.0, 4.0, 0.0], Bounds::symmetric(10.0))
            .unwrap();
        assert_eq!(minimum.x[0], 0.0);
        assert_eq!(minimum.x[2], 0.0);
        assert!(minimum.x[1] < 4.0);
    }

    #[test]
    fn test_overshoot_is_rejected() {
        // a huge relative limit jumps far past the minimum
        let problem = Quadratic {
            center: vec![0.0],
            curvature: vec![10.0],
        };
        let step = GradientStep {
            step_limit: 100.0,
            ratio_clamp: false,
        };
        assert_eq!(
            step.minimize(&problem, &[1.0], Bounds::symmetric(1e6)),
            Err(OptimizeError::NoDecrease { cost: 10.0 })
        );
    }

    #[test]
    fn test_non_finite_start() {
        let problem = quadratic();
        assert_eq!(
            GradientStep::default().minimize(
                &problem,
                &[f64::NAN, 0.0, 0.0],
                Bounds::symmetric(1.0)
            ),
            Err(OptimizeError::NonFinite)
        );
    }
}
