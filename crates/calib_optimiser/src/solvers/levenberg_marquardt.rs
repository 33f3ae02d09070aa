//! Levenberg-Marquardt nonlinear least-squares solver.
//!
//! This module provides the [`LevenbergMarquardtSolver`] for solving the
//! whitened least-squares problems assembled by 3D-VAR calibration.
//!
//! # Algorithm
//!
//! The Levenberg-Marquardt algorithm combines Gauss-Newton and gradient descent:
//!
//! ```text
//! (J^T J + λI) δ = -J^T r
//! p_{n+1} = p_n + δ
//! ```
//!
//! where:
//! - `J` is the Jacobian matrix of residuals
//! - `r` is the residual vector
//! - `λ` is the damping factor (adjusted during iteration)
//! - `δ` is the parameter update step
//!
//! # Example
//!
//! ```
//! use calib_optimiser::solvers::{LeastSquaresProblem, LevenbergMarquardtSolver, LMConfig, OptimizationAlgorithm};
//! use calib_core::types::Point;
//!
//! // Fit y = a * exp(-b * x) to data
//! let x_data = [0.0, 1.0, 2.0, 3.0, 4.0];
//! let y_data: Vec<f64> = x_data.iter().map(|&x: &f64| 2.0 * (-0.5 * x).exp()).collect();
//!
//! let problem = LeastSquaresProblem::new(2, |p: &Point| {
//!     Ok(Point::from_iterator(
//!         x_data.len(),
//!         x_data.iter().zip(&y_data).map(|(&x, &y)| p[0] * (-p[1] * x).exp() - y),
//!     ))
//! });
//!
//! let solver = LevenbergMarquardtSolver::new(LMConfig::default());
//! let result = solver.minimise(&problem, &Point::from_vec(vec![1.0, 1.0])).unwrap();
//!
//! assert!(result.converged);
//! assert!((result.solution[0] - 2.0).abs() < 1e-6);
//! assert!((result.solution[1] - 0.5).abs() < 1e-6);
//! ```

use calib_core::types::{EvaluationError, Matrix, Point};
use tracing::debug;

use super::problem::LeastSquaresProblem;
use super::{OptimizationAlgorithm, OptimizationResult};
use crate::OptimiserError;

/// Damping schedule and stopping rules for [`LevenbergMarquardtSolver`].
///
/// The iteration stops on the first of: `‖r‖ < tolerance`,
/// `‖Jᵀr‖∞ < gradient_tolerance`, `‖δ‖ / max(‖θ‖, 1) < param_tolerance`,
/// or `max_iterations`. Only the last reports `converged = false`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LMConfig {
    /// Residual norm treated as an exact fit.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Damping `λ` at the start point.
    pub initial_lambda: f64,
    /// Multiplier on `λ` after a rejected trial step.
    pub lambda_up: f64,
    /// Multiplier on `λ` after an accepted trial step.
    pub lambda_down: f64,
    /// Floor for `λ`.
    pub min_lambda: f64,
    /// Ceiling for `λ`.
    pub max_lambda: f64,
    /// Relative step length treated as stagnation.
    pub param_tolerance: f64,
    /// Gradient infinity norm treated as stationarity.
    pub gradient_tolerance: f64,
}

impl Default for LMConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 100,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            param_tolerance: 1e-10,
            gradient_tolerance: 1e-10,
        }
    }
}

impl LMConfig {
    /// Replace the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Replace all three stopping tolerances with one value.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self.param_tolerance = tolerance;
        self.gradient_tolerance = tolerance;
        self
    }

    /// Loose tolerances for bootstrap-heavy runs where each replica is cheap.
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-6,
            ..Self::default().with_tolerance(1e-8).with_max_iterations(50)
        }
    }

    /// Tight tolerances for a single MAP estimate.
    pub fn high_precision() -> Self {
        Self::default()
            .with_tolerance(1e-14)
            .with_max_iterations(500)
    }
}

/// Levenberg-Marquardt nonlinear least-squares solver.
///
/// Solves optimisation problems of the form:
/// ```text
/// min_p ||r(p)||^2
/// ```
///
/// Uses the problem's Jacobian when one is attached and an internal forward
/// difference otherwise. Rejected trial steps, including steps whose cost is
/// not finite, raise the damping factor.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevenbergMarquardtSolver {
    config: LMConfig,
}

impl LevenbergMarquardtSolver {
    /// Create a new LM solver with the given configuration.
    pub fn new(config: LMConfig) -> Self {
        Self { config }
    }

    /// Create a solver with default configuration.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Get the solver configuration.
    pub fn config(&self) -> &LMConfig {
        &self.config
    }

    /// Solve the normal equations (J^T J + λI) δ = -J^T r
    fn solve_normal_equations(jtj: &Matrix, jtr: &Point, lambda: f64) -> Option<Point> {
        let mut damped = jtj.clone();
        for i in 0..damped.nrows() {
            damped[(i, i)] += lambda;
        }
        damped.cholesky().map(|chol| -chol.solve(jtr))
    }
}

impl OptimizationAlgorithm for LevenbergMarquardtSolver {
    fn name(&self) -> &'static str {
        "levenberg_marquardt"
    }

    fn minimise(
        &self,
        problem: &LeastSquaresProblem<'_>,
        start: &Point,
    ) -> Result<OptimizationResult, OptimiserError> {
        let n_params = problem.dimension();
        if n_params == 0 || start.len() != n_params {
            return Err(OptimiserError::empty_problem(format!(
                "problem has {} parameters, start point has {}",
                n_params,
                start.len()
            )));
        }

        let mut params = start.clone();
        let mut lambda = self.config.initial_lambda;

        let mut r = problem.residual(&params)?;
        if r.is_empty() {
            return Err(OptimiserError::empty_problem("empty residual vector"));
        }
        let mut ss = r.norm_squared();
        if !ss.is_finite() {
            return Err(OptimiserError::numerical_instability(
                "non-finite cost at start point",
            ));
        }

        // Refreshed only after an accepted step
        let mut jacobian = problem.jacobian_at(&params, &r)?;
        let mut jtj = jacobian.tr_mul(&jacobian);
        let mut jtr = jacobian.tr_mul(&r);

        for iteration in 0..self.config.max_iterations {
            if ss.sqrt() < self.config.tolerance || jtr.amax() < self.config.gradient_tolerance {
                debug!(iteration, cost = ss, "LM converged on residual/gradient");
                return Ok(OptimizationResult::new(params, ss, iteration, true));
            }

            let delta = match Self::solve_normal_equations(&jtj, &jtr, lambda) {
                Some(d) => d,
                None => {
                    lambda = (lambda * self.config.lambda_up).min(self.config.max_lambda);
                    continue;
                }
            };

            let param_change = delta.norm();
            let param_norm = params.norm().max(1.0);
            if param_change / param_norm < self.config.param_tolerance {
                debug!(iteration, cost = ss, "LM converged on parameter change");
                return Ok(OptimizationResult::new(params, ss, iteration, true));
            }

            let new_params = &params + &delta;
            // Non-finite trial residuals are rejected like any other non-decrease
            let trial = match problem.residual(&new_params) {
                Ok(new_r) => Some(new_r),
                Err(EvaluationError::NonFinite { .. }) => None,
                Err(e) => return Err(e.into()),
            };

            match trial {
                Some(new_r) if new_r.norm_squared() < ss => {
                    params = new_params;
                    ss = new_r.norm_squared();
                    r = new_r;
                    lambda = (lambda * self.config.lambda_down).max(self.config.min_lambda);
                    jacobian = problem.jacobian_at(&params, &r)?;
                    jtj = jacobian.tr_mul(&jacobian);
                    jtr = jacobian.tr_mul(&r);
                }
                _ => {
                    lambda = (lambda * self.config.lambda_up).min(self.config.max_lambda);
                }
            }

            debug!(iteration, cost = ss, lambda, "LM iteration");
        }

        Ok(OptimizationResult::new(
            params,
            ss,
            self.config.max_iterations,
            false,
        ))
    }
}
