//! Calibration error types.

use std::fmt;

use calib_core::types::{DiffError, EvaluationError, LinalgError};
use thiserror::Error;

use crate::OptimiserError;

/// Covariance matrix involved in a numerical singularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceRole {
    /// Background (prior) parameter covariance `Cᵇ`.
    Parameter,
    /// Observation error covariance `Cᵒ`.
    Observation,
    /// Posterior covariance: the normal matrix `AᵀA` or the replica spread.
    Posterior,
}

impl fmt::Display for CovarianceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter => write!(f, "parameter covariance"),
            Self::Observation => write!(f, "observation error covariance"),
            Self::Posterior => write!(f, "posterior covariance"),
        }
    }
}

/// Errors that can occur during 3D-VAR calibration.
///
/// # Variants
///
/// - `DimensionMismatch`: A vector or matrix does not match the model dimensions
/// - `ObservationCountMismatch`: Input and output observations differ in row count
/// - `EmptyObservations`: No observations were supplied
/// - `Singular`: A covariance could not be factorised
/// - `Gradient`: The finite-difference step is invalid for the model
/// - `Optimiser`: The optimisation strategy failed
/// - `Evaluation`: The model failed outside the optimiser
/// - `Bootstrap`: A bootstrap replica failed (with its index)
/// - `InsufficientReplicas`: Too few replicas succeeded under the skip policy
/// - `Persistence`: Saved state could not be read or written
///
/// # Examples
///
/// ```
/// use calib_optimiser::calibration::CalibrationError;
///
/// let err = CalibrationError::dimension_mismatch("candidate", 2, 3);
/// assert_eq!(
///     format!("{}", err),
///     "Dimension mismatch for candidate: expected 2, got 3"
/// );
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// A vector or matrix does not match the model dimensions.
    #[error("Dimension mismatch for {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// What was being checked
        context: String,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        got: usize,
    },

    /// Input and output observations have different row counts.
    #[error("Observation count mismatch: {inputs} inputs, {outputs} outputs")]
    ObservationCountMismatch {
        /// Input observation count
        inputs: usize,
        /// Output observation count
        outputs: usize,
    },

    /// No observations were supplied.
    #[error("Empty observation set")]
    EmptyObservations,

    /// A covariance matrix is not symmetric positive definite.
    #[error("Singular {which}: {source}")]
    Singular {
        /// Which matrix failed
        which: CovarianceRole,
        /// Factorisation error
        source: LinalgError,
    },

    /// Invalid finite-difference step.
    #[error("Gradient error: {0}")]
    Gradient(#[from] DiffError),

    /// Optimisation failure.
    #[error("Optimiser error: {0}")]
    Optimiser(#[from] OptimiserError),

    /// Model evaluation failure outside the optimiser.
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// A bootstrap replica failed.
    #[error("Bootstrap replica {replica} failed: {source}")]
    Bootstrap {
        /// Replica index
        replica: usize,
        /// Underlying failure
        source: Box<CalibrationError>,
    },

    /// Fewer replicas succeeded than needed for a sample covariance.
    #[error("Only {succeeded} bootstrap replicas succeeded, need at least {required}")]
    InsufficientReplicas {
        /// Successful replicas
        succeeded: usize,
        /// Minimum required
        required: usize,
    },

    /// Saved state could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl CalibrationError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(context: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            got,
        }
    }

    /// Create a singularity error.
    pub fn singular(which: CovarianceRole, source: LinalgError) -> Self {
        Self::Singular { which, source }
    }

    /// Wrap a replica failure with its index.
    pub fn bootstrap(replica: usize, source: CalibrationError) -> Self {
        Self::Bootstrap {
            replica,
            source: Box::new(source),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Whether the error is a numerical singularity rather than a
    /// precondition violation.
    pub fn is_singular(&self) -> bool {
        match self {
            Self::Singular { .. } => true,
            Self::Bootstrap { source, .. } => source.is_singular(),
            _ => false,
        }
    }
}
