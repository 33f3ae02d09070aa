//! Least-squares optimisation strategies.
//!
//! Calibration hands its whitened residual problem to an
//! [`OptimizationAlgorithm`]; this module provides the contract and two
//! bundled strategies.
//!
//! ## Available Solvers
//!
//! - [`LevenbergMarquardtSolver`]: damped Gauss-Newton on the residual
//! - [`BfgsSolver`]: quasi-Newton on the cost with Armijo backtracking
//! - [`Solver`]: serialisable selection of either, Levenberg-Marquardt by default
//!
//! ## Configuration
//!
//! Both solvers take a config struct ([`LMConfig`], [`BfgsConfig`]) with
//! `Default`, `fast()` and `high_precision()` presets.
//!
//! ## Convergence
//!
//! Exhausting the iteration budget is not an error: the last iterate is
//! returned with `converged == false`. Evaluation failures and empty
//! problems are errors.

mod bfgs;
mod levenberg_marquardt;
mod problem;

pub use bfgs::{BfgsConfig, BfgsSolver};
pub use levenberg_marquardt::{LMConfig, LevenbergMarquardtSolver};
pub use problem::{JacobianFn, LeastSquaresProblem, ResidualFn};

use calib_core::types::Point;

use crate::OptimiserError;

/// Outcome of a minimisation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationResult {
    /// Final parameters.
    pub solution: Point,
    /// Cost `||r||²` at `solution`.
    pub cost: f64,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Whether a convergence criterion was met.
    pub converged: bool,
}

impl OptimizationResult {
    /// Create a new optimisation result.
    pub fn new(solution: Point, cost: f64, iterations: usize, converged: bool) -> Self {
        Self {
            solution,
            cost,
            iterations,
            converged,
        }
    }

    /// Root mean square of the residuals at the solution.
    pub fn rmse(&self, n_residuals: usize) -> f64 {
        if n_residuals == 0 {
            return 0.0;
        }
        (self.cost / n_residuals as f64).sqrt()
    }
}

/// Strategy minimising a [`LeastSquaresProblem`].
///
/// Implementations must be shareable across threads: bootstrap replicas call
/// [`minimise`](Self::minimise) concurrently on the same instance.
pub trait OptimizationAlgorithm: Send + Sync {
    /// Minimise `problem` starting from `start`.
    fn minimise(
        &self,
        problem: &LeastSquaresProblem<'_>,
        start: &Point,
    ) -> Result<OptimizationResult, OptimiserError>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Selection of a bundled optimisation strategy.
///
/// # Examples
///
/// ```
/// use calib_optimiser::solvers::{Solver, LMConfig, OptimizationAlgorithm};
///
/// let solver = Solver::default();
/// assert_eq!(solver.name(), "levenberg_marquardt");
/// assert_eq!(solver, Solver::LevenbergMarquardt(LMConfig::default()));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Solver {
    /// Levenberg-Marquardt with the given configuration.
    LevenbergMarquardt(LMConfig),
    /// BFGS with the given configuration.
    Bfgs(BfgsConfig),
}

impl Default for Solver {
    fn default() -> Self {
        Self::LevenbergMarquardt(LMConfig::default())
    }
}

impl OptimizationAlgorithm for Solver {
    fn minimise(
        &self,
        problem: &LeastSquaresProblem<'_>,
        start: &Point,
    ) -> Result<OptimizationResult, OptimiserError> {
        match self {
            Self::LevenbergMarquardt(config) => {
                LevenbergMarquardtSolver::new(*config).minimise(problem, start)
            }
            Self::Bfgs(config) => BfgsSolver::new(*config).minimise(problem, start),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::LevenbergMarquardt(_) => "levenberg_marquardt",
            Self::Bfgs(_) => "bfgs",
        }
    }
}

impl From<LevenbergMarquardtSolver> for Solver {
    fn from(solver: LevenbergMarquardtSolver) -> Self {
        Self::LevenbergMarquardt(*solver.config())
    }
}

impl From<BfgsSolver> for Solver {
    fn from(solver: BfgsSolver) -> Self {
        Self::Bfgs(*solver.config())
    }
}
