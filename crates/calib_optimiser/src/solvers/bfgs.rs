//! BFGS quasi-Newton minimiser with Armijo backtracking.
//!
//! Minimises the cost `J(θ) = ||r(θ)||²` of a [`LeastSquaresProblem`]
//! directly, maintaining an approximation `H` of the inverse Hessian:
//!
//! ```text
//! d_k = -H_k ∇J(θ_k)
//! θ_{k+1} = θ_k + α_k d_k        (α_k from Armijo backtracking)
//! H_{k+1} = (I - ρ s yᵀ) H_k (I - ρ y sᵀ) + ρ s sᵀ,   ρ = 1 / yᵀs
//! ```
//!
//! The gradient is `2 Jrᵀ r` when the problem carries a Jacobian, and a
//! forward difference of `J` otherwise.

use calib_core::types::{EvaluationError, Matrix, Point};
use tracing::debug;

use super::problem::LeastSquaresProblem;
use super::{OptimizationAlgorithm, OptimizationResult};
use crate::OptimiserError;

/// Configuration for the BFGS solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BfgsConfig {
    /// Relative cost decrease below which the iteration stops.
    pub tolerance: f64,
    /// Infinity norm of the cost gradient below which the iteration stops.
    pub gradient_tolerance: f64,
    /// Relative step size below which the iteration stops.
    pub param_tolerance: f64,
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Sufficient-decrease constant of the Armijo condition.
    pub armijo: f64,
    /// Step contraction factor of the backtracking line search.
    pub backtrack: f64,
    /// Maximum number of contractions per line search.
    pub max_line_search: usize,
}

impl Default for BfgsConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-14,
            gradient_tolerance: 1e-10,
            param_tolerance: 1e-12,
            max_iterations: 200,
            armijo: 1e-4,
            backtrack: 0.5,
            max_line_search: 60,
        }
    }
}

impl BfgsConfig {
    /// Create a fast configuration with relaxed tolerances.
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-10,
            gradient_tolerance: 1e-7,
            param_tolerance: 1e-9,
            max_iterations: 100,
            ..Default::default()
        }
    }

    /// Create a high precision configuration.
    pub fn high_precision() -> Self {
        Self {
            tolerance: 1e-16,
            gradient_tolerance: 1e-13,
            param_tolerance: 1e-15,
            max_iterations: 1000,
            ..Default::default()
        }
    }
}

/// BFGS quasi-Newton solver.
///
/// # Example
///
/// ```
/// use calib_optimiser::solvers::{BfgsSolver, LeastSquaresProblem, OptimizationAlgorithm};
/// use calib_core::types::Point;
///
/// let problem = LeastSquaresProblem::new(2, |p: &Point| {
///     Ok(Point::from_vec(vec![p[0] - 1.0, 2.0 * (p[1] + 0.5)]))
/// });
/// let result = BfgsSolver::default().minimise(&problem, &Point::zeros(2)).unwrap();
/// assert!((result.solution[0] - 1.0).abs() < 1e-5);
/// assert!((result.solution[1] + 0.5).abs() < 1e-5);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BfgsSolver {
    config: BfgsConfig,
}

impl BfgsSolver {
    /// Create a new BFGS solver with the given configuration.
    pub fn new(config: BfgsConfig) -> Self {
        Self { config }
    }

    /// Get the solver configuration.
    pub fn config(&self) -> &BfgsConfig {
        &self.config
    }

    /// Cost gradient, analytic through the Jacobian when available.
    fn gradient(
        problem: &LeastSquaresProblem<'_>,
        theta: &Point,
        cost: f64,
    ) -> Result<Point, EvaluationError> {
        if problem.has_jacobian() {
            return problem.cost_gradient(theta);
        }
        let mut gradient = Point::zeros(theta.len());
        let mut shifted = theta.clone();
        for j in 0..theta.len() {
            let h = 1e-8 * theta[j].abs().max(1.0);
            shifted[j] = theta[j] + h;
            gradient[j] = (problem.cost(&shifted)? - cost) / h;
            shifted[j] = theta[j];
        }
        Ok(gradient)
    }

    /// Backtracking search for a step satisfying the Armijo condition.
    ///
    /// Returns the accepted point and its cost, or `None` if no decrease was
    /// found within `max_line_search` contractions.
    fn line_search(
        &self,
        problem: &LeastSquaresProblem<'_>,
        theta: &Point,
        cost: f64,
        direction: &Point,
        slope: f64,
    ) -> Result<Option<(Point, f64)>, EvaluationError> {
        let mut alpha = 1.0;
        for _ in 0..self.config.max_line_search {
            let trial = theta + alpha * direction;
            // Non-finite trial costs are rejected like any other non-decrease
            let trial_cost = match problem.cost(&trial) {
                Ok(c) => c,
                Err(EvaluationError::NonFinite { .. }) => f64::INFINITY,
                Err(e) => return Err(e),
            };
            if trial_cost.is_finite() && trial_cost <= cost + self.config.armijo * alpha * slope {
                return Ok(Some((trial, trial_cost)));
            }
            alpha *= self.config.backtrack;
        }
        Ok(None)
    }
}

impl OptimizationAlgorithm for BfgsSolver {
    fn name(&self) -> &'static str {
        "bfgs"
    }

    fn minimise(
        &self,
        problem: &LeastSquaresProblem<'_>,
        start: &Point,
    ) -> Result<OptimizationResult, OptimiserError> {
        let n = problem.dimension();
        if n == 0 || start.len() != n {
            return Err(OptimiserError::empty_problem(format!(
                "problem has {} parameters, start point has {}",
                n,
                start.len()
            )));
        }

        let mut theta = start.clone();
        let r = problem.residual(&theta)?;
        if r.is_empty() {
            return Err(OptimiserError::empty_problem("empty residual vector"));
        }
        let mut cost = r.norm_squared();
        if !cost.is_finite() {
            return Err(OptimiserError::numerical_instability(
                "non-finite cost at start point",
            ));
        }

        let mut gradient = Self::gradient(problem, &theta, cost)?;
        let mut inverse_hessian = Matrix::identity(n, n);
        let mut fresh = true;

        for iteration in 0..self.config.max_iterations {
            if gradient.amax() < self.config.gradient_tolerance {
                debug!(iteration, cost, "BFGS converged on gradient");
                return Ok(OptimizationResult::new(theta, cost, iteration, true));
            }

            let mut direction = -(&inverse_hessian * &gradient);
            let mut slope = gradient.dot(&direction);
            if slope >= 0.0 {
                inverse_hessian = Matrix::identity(n, n);
                fresh = true;
                direction = -gradient.clone();
                slope = -gradient.norm_squared();
            }

            let (next, next_cost) = match self.line_search(problem, &theta, cost, &direction, slope)? {
                Some(accepted) => accepted,
                None if !fresh => {
                    // Restart from steepest descent once before giving up
                    inverse_hessian = Matrix::identity(n, n);
                    fresh = true;
                    continue;
                }
                None => {
                    debug!(iteration, cost, "BFGS line search failed");
                    return Ok(OptimizationResult::new(theta, cost, iteration, false));
                }
            };

            let step = &next - &theta;
            let next_gradient = Self::gradient(problem, &next, next_cost)?;
            let change = &next_gradient - &gradient;

            let decrease = cost - next_cost;
            let small_step = step.norm() / theta.norm().max(1.0) < self.config.param_tolerance;

            theta = next;
            cost = next_cost;
            gradient = next_gradient;

            if decrease <= self.config.tolerance * cost.abs().max(1.0) || small_step {
                debug!(iteration, cost, "BFGS converged on cost/step");
                return Ok(OptimizationResult::new(theta, cost, iteration + 1, true));
            }

            let sy = step.dot(&change);
            if sy > 1e-12 * step.norm() * change.norm() {
                if fresh {
                    // Scale the initial approximation before the first update
                    inverse_hessian *= sy / change.norm_squared();
                    fresh = false;
                }
                let rho = 1.0 / sy;
                let identity = Matrix::identity(n, n);
                let left = &identity - rho * &step * change.transpose();
                let right = &identity - rho * &change * step.transpose();
                inverse_hessian = &left * &inverse_hessian * &right + rho * &step * step.transpose();
            }

            debug!(iteration, cost, "BFGS iteration");
        }

        Ok(OptimizationResult::new(
            theta,
            cost,
            self.config.max_iterations,
            false,
        ))
    }
}
