use std::collections::VecDeque;

use super::{Bounds, Minimum, OptimizeError, Problem, all_finite, dot, norm};

/// Sufficient-decrease constant of the backtracking line search.
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 20;
/// Projected-gradient norm below which the current point is accepted as stationary.
const GRADIENT_TOLERANCE: f64 = 1e-12;
/// Curvature pairs with `sᵀy` at or below this fraction of `‖s‖·‖y‖` are discarded.
const CURVATURE_EPSILON: f64 = 1e-10;

/// Box-constrained limited-memory BFGS with a fixed iteration cap.
///
/// Each iteration computes a two-loop L-BFGS direction from the projected gradient, drops
/// components that would leave the box at an active bound and backtracks along the
/// projected path until the Armijo condition holds. A direction that is not a descent
/// direction resets the curvature memory and falls back to steepest descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuasiNewton {
    pub max_iterations: usize,
    /// Number of curvature pairs kept.
    pub memory: usize,
}

impl Default for QuasiNewton {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            memory: 5,
        }
    }
}

#[derive(Debug)]
struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

impl QuasiNewton {
    /// Runs at most `max_iterations` projected L-BFGS iterations from `x0`.
    ///
    /// The start point is projected into `bounds` first. The result is accepted only if
    /// its cost is below the cost of the unprojected start.
    pub fn minimize<P>(
        &self,
        problem: &P,
        x0: &[f64],
        bounds: Bounds,
    ) -> Result<Minimum, OptimizeError>
    where
        P: Problem + ?Sized,
    {
        let initial_cost = problem.cost(x0);
        let mut x = x0.to_vec();
        bounds.project(&mut x);
        let (mut f, mut g) = problem.cost_and_gradient(&x);
        if !initial_cost.is_finite() || !f.is_finite() || !all_finite(&g) {
            return Err(OptimizeError::NonFinite);
        }

        let mut history: VecDeque<Correction> = VecDeque::with_capacity(self.memory);
        let mut iterations = 0;
        while iterations < self.max_iterations {
            let pg = projected_gradient(&x, &g, bounds);
            if norm(&pg) <= GRADIENT_TOLERANCE {
                break;
            }

            let mut d = direction(&pg, &history);
            block_active(&x, &mut d, bounds);
            if dot(&d, &pg) >= 0.0 {
                history.clear();
                d = direction(&pg, &history);
                block_active(&x, &mut d, bounds);
            }

            let Some(x_next) = line_search(problem, &x, f, &g, &d, bounds)? else {
                if iterations == 0 {
                    return Err(OptimizeError::LineSearch { cost: initial_cost });
                }
                break;
            };
            let (f_next, g_next) = problem.cost_and_gradient(&x_next);
            if !f_next.is_finite() || !all_finite(&g_next) {
                return Err(OptimizeError::NonFinite);
            }

            let s: Vec<f64> = std::iter::zip(&x_next, &x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = std::iter::zip(&g_next, &g).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if self.memory > 0 && sy > CURVATURE_EPSILON * norm(&s) * norm(&y) {
                if history.len() == self.memory {
                    history.pop_front();
                }
                history.push_back(Correction { s, y, rho: 1.0 / sy });
            }

            x = x_next;
            f = f_next;
            g = g_next;
            iterations += 1;
        }

        if f < initial_cost {
            Ok(Minimum {
                x,
                cost: f,
                initial_cost,
                iterations,
            })
        } else {
            Err(OptimizeError::NoDecrease { cost: initial_cost })
        }
    }
}

/// Gradient with components zeroed where descent would leave the box.
fn projected_gradient(x: &[f64], g: &[f64], bounds: Bounds) -> Vec<f64> {
    std::iter::zip(x, g)
        .map(|(&xi, &gi)| {
            if (bounds.at_lower(xi) && gi > 0.0) || (bounds.at_upper(xi) && gi < 0.0) {
                0.0
            } else {
                gi
            }
        })
        .collect()
}

fn block_active(x: &[f64], d: &mut [f64], bounds: Bounds) {
    for (di, &xi) in d.iter_mut().zip(x) {
        if (bounds.at_lower(xi) && *di < 0.0) || (bounds.at_upper(xi) && *di > 0.0) {
            *di = 0.0;
        }
    }
}

/// Two-loop recursion: returns `−H·g` for the inverse-Hessian approximation `H`.
fn direction(g: &[f64], history: &VecDeque<Correction>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let alpha = c.rho * dot(&c.s, &q);
        for (qi, yi) in q.iter_mut().zip(&c.y) {
            *qi -= alpha * yi;
        }
        alphas.push(alpha);
    }

    let gamma = match history.back() {
        Some(c) => dot(&c.s, &c.y) / dot(&c.y, &c.y),
        // first step has at most unit length
        None => 1.0_f64.min(1.0 / norm(g)),
    };
    for qi in &mut q {
        *qi *= gamma;
    }

    for (c, alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = c.rho * dot(&c.y, &q);
        for (qi, si) in q.iter_mut().zip(&c.s) {
            *qi += (alpha - beta) * si;
        }
    }
    for qi in &mut q {
        *qi = -*qi;
    }
    q
}

/// Backtracks along the projected path `P(x + t·d)`.
///
/// Returns `Ok(None)` when no trial point satisfies the Armijo condition.
fn line_search<P>(
    problem: &P,
    x: &[f64],
    f: f64,
    g: &[f64],
    d: &[f64],
    bounds: Bounds,
) -> Result<Option<Vec<f64>>, OptimizeError>
where
    P: Problem + ?Sized,
{
    let mut t = 1.0;
    for _ in 0..MAX_BACKTRACKS {
        let mut trial: Vec<f64> = std::iter::zip(x, d).map(|(xi, di)| xi + t * di).collect();
        bounds.project(&mut trial);
        let f_trial = problem.cost(&trial);
        if !f_trial.is_finite() {
            return Err(OptimizeError::NonFinite);
        }
        let predicted: f64 = std::iter::zip(&trial, x)
            .zip(g)
            .map(|((a, b), gi)| (a - b) * gi)
            .sum();
        if f_trial < f && f_trial <= f + ARMIJO * predicted {
            return Ok(Some(trial));
        }
        t *= 0.5;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{GradientStep, tests::Quadratic};

    fn quadratic() -> Quadratic {
        Quadratic {
            center: vec![1.0, -2.0, 0.5],
            curvature: vec![1.0, 3.0, 0.5],
        }
    }

    #[test]
    fn test_converges_faster_than_single_step() {
        let problem = quadratic();
        let x = vec![4.0, 4.0, -4.0];
        let initial = problem.cost(&x);
        let qn = QuasiNewton::default()
            .minimize(&problem, &x, Bounds::symmetric(10.0))
            .unwrap();
        let gd = GradientStep::default()
            .minimize(&problem, &x, Bounds::symmetric(10.0))
            .unwrap();
        assert_eq!(qn.initial_cost, initial);
        assert!(qn.iterations <= 8);
        assert!(qn.cost < gd.cost);
        assert!(qn.cost < 0.05 * initial, "{} from {initial}", qn.cost);
    }

    #[test]
    fn test_stops_at_active_bound() {
        let problem = Quadratic {
            center: vec![100.0],
            curvature: vec![1.0],
        };
        let minimum = QuasiNewton::default()
            .minimize(&problem, &[1.0], Bounds::symmetric(2.0))
            .unwrap();
        assert_eq!(minimum.x, vec![2.0]);
        assert_eq!(minimum.iterations, 1);
    }

    #[test]
    fn test_projects_start_into_bounds() {
        let problem = Quadratic {
            center: vec![0.0, 0.0],
            curvature: vec![1.0, 1.0],
        };
        let minimum = QuasiNewton::default()
            .minimize(&problem, &[5.0, -0.5], Bounds::symmetric(1.0))
            .unwrap();
        assert!(minimum.x.iter().all(|v| v.abs() <= 1.0));
        assert_eq!(minimum.initial_cost, 25.25);
    }

    #[test]
    fn test_stationary_start_is_rejected() {
        let problem = quadratic();
        assert_eq!(
            QuasiNewton::default().minimize(
                &problem,
                &[1.0, -2.0, 0.5],
                Bounds::symmetric(10.0)
            ),
            Err(OptimizeError::NoDecrease { cost: 0.0 })
        );
    }

    #[test]
    fn test_non_finite_start() {
        let problem = quadratic();
        assert_eq!(
            QuasiNewton::default().minimize(
                &problem,
                &[f64::INFINITY, 0.0, 0.0],
                Bounds::symmetric(1.0)
            ),
            Err(OptimizeError::NonFinite)
        );
    }
}
