//! Operator registry: the closed set of unary and binary functions a program may use.
//!
//! Every operator is paired with its analytic derivative(s). Several operators clamp their
//! value or derivative outside a numerically safe window:
//!
//! - [`BinaryOp::Kernel`] is `exp(-(x/h)²)` only while `h > 0` and `(x/h)² < 40`, and is
//!   exactly 0 (with zero partials) elsewhere.
//! - [`UnaryOp::Sigmoid`] has a zero derivative when `|x| > 20`.
//! - [`BinaryOp::Ratio`] saturates at `±1e12` and has zero partials once saturated. A NaN
//!   operand still yields NaN so the instability reaches the caller.
//!
//! These clamps keep the reverse-mode pass finite near singularities, so gradients can be
//! trusted whenever forward values are finite.

use std::str::FromStr;

/// Largest magnitude [`BinaryOp::Ratio`] may return.
pub const RATIO_LIMIT: f64 = 1e12;

/// Kernel window: beyond `(x/h)² >= KERNEL_CUTOFF` the kernel is treated as 0.
pub const KERNEL_CUTOFF: f64 = 40.0;

/// Sigmoid inputs beyond this magnitude have zero derivative.
pub const SIGMOID_SATURATION: f64 = 20.0;

/// Single-argument operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum UnaryOp {
    #[display("sin")]
    Sin,
    #[display("cos")]
    Cos,
    #[display("atan")]
    Atan,
    #[display("sigmoid")]
    Sigmoid,
    #[display("abs")]
    Abs,
    #[display("signum")]
    Signum,
}

impl UnaryOp {
    pub const ALL: [Self; 6] = [
        Self::Sin,
        Self::Cos,
        Self::Atan,
        Self::Sigmoid,
        Self::Abs,
        Self::Signum,
    ];

    /// Applies the operator.
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Atan => x.atan(),
            Self::Sigmoid => sigmoid(x),
            Self::Abs => x.abs(),
            Self::Signum => sign(x),
        }
    }

    /// Derivative of the operator at `x`.
    #[must_use]
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Self::Sin => x.cos(),
            Self::Cos => -x.sin(),
            Self::Atan => 1.0 / (1.0 + x * x),
            Self::Sigmoid => {
                if x.abs() > SIGMOID_SATURATION {
                    0.0
                } else {
                    let s = sigmoid(x);
                    s * (1.0 - s)
                }
            }
            Self::Abs => sign(x),
            Self::Signum => 0.0,
        }
    }
}

impl FromStr for UnaryOp {
    type Err = UnknownOperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.to_string() == s)
            .ok_or_else(|| UnknownOperatorError { name: s.to_owned() })
    }
}

/// Two-argument operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum BinaryOp {
    /// Gaussian kernel `exp(-(x/h)²)` of the left operand with bandwidth `h` on the right.
    #[display("kernel")]
    Kernel,
    #[display("product")]
    Product,
    #[display("sum")]
    Sum,
    /// Clamped quotient `a / b`.
    #[display("ratio")]
    Ratio,
}

impl BinaryOp {
    pub const ALL: [Self; 4] = [Self::Kernel, Self::Product, Self::Sum, Self::Ratio];

    /// Applies the operator.
    #[must_use]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Kernel => kernel(a, b).unwrap_or(0.0),
            Self::Product => a * b,
            Self::Sum => a + b,
            Self::Ratio => {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else if ratio_is_safe(a, b) {
                    a / b
                } else if a == 0.0 {
                    0.0
                } else {
                    // sign of the quotient; `b` may be a signed zero
                    sign(a) * b.signum() * RATIO_LIMIT
                }
            }
        }
    }

    /// Partial derivatives `(∂f/∂a, ∂f/∂b)` at `(a, b)`.
    #[must_use]
    pub fn partials(self, a: f64, b: f64) -> (f64, f64) {
        match self {
            Self::Kernel => match kernel(a, b) {
                Some(k) => {
                    let h2 = b * b;
                    (-2.0 * a / h2 * k, 2.0 * a * a / (h2 * b) * k)
                }
                None => (0.0, 0.0),
            },
            Self::Product => (b, a),
            Self::Sum => (1.0, 1.0),
            Self::Ratio => {
                if ratio_is_safe(a, b) {
                    (1.0 / b, -a / (b * b))
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }
}

impl FromStr for BinaryOp {
    type Err = UnknownOperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.to_string() == s)
            .ok_or_else(|| UnknownOperatorError { name: s.to_owned() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown operator '{name}'")]
pub struct UnknownOperatorError {
    pub name: String,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Sign with `sign(0) == 0`, unlike [`f64::signum`].
#[must_use]
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Kernel value inside its window, `None` outside.
fn kernel(x: f64, h: f64) -> Option<f64> {
    if h <= 0.0 {
        return None;
    }
    let r = (x / h).powi(2);
    (r < KERNEL_CUTOFF).then(|| (-r).exp())
}

fn ratio_is_safe(a: f64, b: f64) -> bool {
    b != 0.0 && a.abs() < RATIO_LIMIT * b.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn central_difference(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let h = 1e-6;
        (f(x + h) - f(x - h)) / (2.0 * h)
    }

    #[test]
    fn test_unary_derivatives_match_finite_differences() {
        for op in [UnaryOp::Sin, UnaryOp::Cos, UnaryOp::Atan, UnaryOp::Sigmoid] {
            for x in [-3.0, -0.7, 0.2, 1.5, 4.0] {
                let numeric = central_difference(|v| op.apply(v), x);
                let analytic = op.derivative(x);
                assert!(
                    (numeric - analytic).abs() < 1e-6,
                    "{op} at {x}: {numeric} vs {analytic}"
                );
            }
        }
    }

    #[test]
    fn test_binary_partials_match_finite_differences() {
        for op in BinaryOp::ALL {
            for (a, b) in [(0.5, 1.5), (-1.2, 2.0), (2.0, -0.8), (0.3, 0.9)] {
                let (da, db) = op.partials(a, b);
                let na = central_difference(|v| op.apply(v, b), a);
                let nb = central_difference(|v| op.apply(a, v), b);
                assert!((na - da).abs() < 1e-5, "{op} ∂a at ({a}, {b})");
                assert!((nb - db).abs() < 1e-5, "{op} ∂b at ({a}, {b})");
            }
        }
    }

    #[test]
    fn test_kernel_is_zero_outside_window() {
        assert_eq!(BinaryOp::Kernel.apply(1.0, 0.0), 0.0);
        assert_eq!(BinaryOp::Kernel.apply(1.0, -2.0), 0.0);
        assert_eq!(BinaryOp::Kernel.apply(10.0, 1.0), 0.0);
        assert_eq!(BinaryOp::Kernel.partials(10.0, 1.0), (0.0, 0.0));
        assert_eq!(BinaryOp::Kernel.apply(0.0, 1.0), 1.0);
    }

    #[test]
    fn test_sigmoid_derivative_saturates() {
        assert_eq!(UnaryOp::Sigmoid.derivative(25.0), 0.0);
        assert_eq!(UnaryOp::Sigmoid.derivative(-25.0), 0.0);
        assert!(UnaryOp::Sigmoid.derivative(0.0) > 0.2);
    }

    #[test]
    fn test_ratio_is_clamped() {
        assert_eq!(BinaryOp::Ratio.apply(1.0, 0.0), RATIO_LIMIT);
        assert_eq!(BinaryOp::Ratio.apply(-1.0, 0.0), -RATIO_LIMIT);
        assert_eq!(BinaryOp::Ratio.apply(1.0, -1e-20), -RATIO_LIMIT);
        assert_eq!(BinaryOp::Ratio.apply(0.0, 0.0), 0.0);
        assert_eq!(BinaryOp::Ratio.partials(1.0, 0.0), (0.0, 0.0));
        assert_eq!(BinaryOp::Ratio.apply(3.0, 2.0), 1.5);
    }

    #[test]
    fn test_ratio_propagates_nan() {
        assert!(BinaryOp::Ratio.apply(f64::NAN, 1.0).is_nan());
        assert!(BinaryOp::Ratio.apply(1.0, f64::NAN).is_nan());
        assert!(BinaryOp::Ratio.apply(f64::NAN, 0.0).is_nan());
        // infinite operands still saturate
        assert_eq!(BinaryOp::Ratio.apply(f64::INFINITY, 2.0), RATIO_LIMIT);
    }

    #[test]
    fn test_sign_helpers() {
        assert_eq!(UnaryOp::Signum.apply(0.0), 0.0);
        assert_eq!(UnaryOp::Signum.apply(-2.0), -1.0);
        assert_eq!(UnaryOp::Abs.derivative(0.0), 0.0);
        assert_eq!(UnaryOp::Abs.derivative(-3.0), -1.0);
    }

    #[test]
    fn test_names_parse_back() {
        for op in UnaryOp::ALL {
            assert_eq!(op.to_string().parse::<UnaryOp>().unwrap(), op);
        }
        for op in BinaryOp::ALL {
            assert_eq!(op.to_string().parse::<BinaryOp>().unwrap(), op);
        }
        assert!("tanh".parse::<UnaryOp>().is_err());
    }
}
