use crate::errors::ConvergenceError;
use roots::{find_root_brent, Convergency};
use serde::Deserialize;
use serde_valid::Validate;

/// Convergence settings shared by the iterative psychrometric solvers.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSettings {
    /// Width of the final bracket, in the units of the solved-for quantity (ºC).
    #[validate(exclusive_minimum = 0.)]
    pub tolerance: f64,
    #[validate(minimum = 1)]
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            max_iterations: 100,
        }
    }
}

/// Convergence on bracket width only. An exact zero of the residual also
/// stops the search, but a small residual does not, since residuals here are
/// in pascals or kg/kg rather than degrees.
struct BoundedConvergency {
    tolerance: f64,
    max_iterations: usize,
    iterations: usize,
}

impl Convergency<f64> for BoundedConvergency {
    fn is_root_found(&mut self, y: f64) -> bool {
        y == 0.
    }

    fn is_converged(&mut self, x1: f64, x2: f64) -> bool {
        (x1 - x2).abs() < self.tolerance
    }

    fn is_iteration_limit_reached(&mut self, iter: usize) -> bool {
        self.iterations = iter;
        iter >= self.max_iterations
    }
}

/// Find the root of a monotonic function within `[lower, upper]`, failing
/// with a `ConvergenceError` rather than returning a best-effort value.
pub(crate) fn bracketed_root(
    quantity: &'static str,
    func: impl Fn(f64) -> f64,
    lower: f64,
    upper: f64,
    settings: &SolverSettings,
) -> Result<f64, ConvergenceError> {
    let f_lower = func(lower);
    let f_upper = func(upper);
    if f_lower == 0. {
        return Ok(lower);
    }
    if f_upper == 0. {
        return Ok(upper);
    }
    if !f_lower.is_finite() || !f_upper.is_finite() || f_lower.signum() == f_upper.signum() {
        return Err(ConvergenceError {
            quantity,
            iterations: 0,
            tolerance: settings.tolerance,
            reason: format!("no sign change between {lower} and {upper}"),
        });
    }

    let mut convergency = BoundedConvergency {
        tolerance: settings.tolerance,
        max_iterations: settings.max_iterations,
        iterations: 0,
    };

    find_root_brent::<f64, _>(lower, upper, &func, &mut convergency).map_err(|e| {
        ConvergenceError {
            quantity,
            iterations: convergency.iterations,
            tolerance: settings.tolerance,
            reason: e.to_string(),
        }
    })
}
