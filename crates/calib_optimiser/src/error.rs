//! Optimiser error types.

use calib_core::types::EvaluationError;
use thiserror::Error;

/// Errors raised by [`OptimizationAlgorithm`](crate::solvers::OptimizationAlgorithm)
/// implementations.
///
/// Failing to converge within the iteration budget is not an error; it is
/// reported through [`OptimizationResult::converged`](crate::solvers::OptimizationResult::converged).
///
/// # Examples
///
/// ```
/// use calib_optimiser::OptimiserError;
/// use calib_core::types::EvaluationError;
///
/// let err: OptimiserError = EvaluationError::failed("model blew up").into();
/// assert!(format!("{}", err).contains("model blew up"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimiserError {
    /// The problem has no parameters or no residuals.
    #[error("Empty problem: {0}")]
    EmptyProblem(String),

    /// A residual or Jacobian evaluation failed.
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    /// The iteration cannot continue (non-finite cost, degenerate system).
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
}

impl OptimiserError {
    /// Create an empty problem error.
    pub fn empty_problem(message: impl Into<String>) -> Self {
        Self::EmptyProblem(message.into())
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(message: impl Into<String>) -> Self {
        Self::NumericalInstability(message.into())
    }
}
