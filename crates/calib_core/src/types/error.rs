//! Error types for structured error handling.
//!
//! This module provides:
//! - `EvaluationError`: Errors raised by a black-box evaluation
//! - `DiffError`: Errors from finite-difference gradient construction
//! - `LinalgError`: Errors from sample, covariance and factorisation operations

use thiserror::Error;

/// Black-box evaluation errors.
///
/// Raised by [`Evaluation`](crate::traits::Evaluation) and
/// [`ParametricModel`](crate::traits::ParametricModel) implementations and
/// propagated unchanged through gradients, cost functions and optimisers.
///
/// # Variants
/// - `DimensionMismatch`: Input or output point has the wrong length
/// - `NonFinite`: The evaluation produced NaN or infinity
/// - `StepUnderflow`: A finite-difference step vanished when added to the point
/// - `Failed`: Any other model failure
///
/// # Examples
/// ```
/// use calib_core::types::EvaluationError;
///
/// let err = EvaluationError::NonFinite { index: 2 };
/// assert_eq!(format!("{}", err), "Evaluation produced a non-finite value at component 2");
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EvaluationError {
    /// Point length does not match the declared dimension.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Declared dimension
        expected: usize,
        /// Length actually supplied or produced
        got: usize,
    },

    /// The evaluation returned a NaN or infinite component.
    #[error("Evaluation produced a non-finite value at component {index}")]
    NonFinite {
        /// First offending component
        index: usize,
    },

    /// `x[index] + ε` rounds back to `x[index]`, so no difference can be taken.
    #[error("Finite-difference step vanishes at component {index} (value {value})")]
    StepUnderflow {
        /// Component whose step was absorbed
        index: usize,
        /// Coordinate value at that component
        value: f64,
    },

    /// Model-specific failure.
    #[error("Evaluation failed: {0}")]
    Failed(String),
}

impl EvaluationError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Create a generic failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Finite-difference construction errors.
///
/// Raised eagerly when a gradient is built, never at first use.
///
/// # Examples
/// ```
/// use calib_core::types::DiffError;
///
/// let err = DiffError::InvalidStep { index: 0, value: 0.0 };
/// assert!(format!("{}", err).contains("strictly positive"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiffError {
    /// A step component is zero, negative, NaN or infinite.
    #[error("Invalid finite-difference step at index {index}: {value} (must be strictly positive and finite)")]
    InvalidStep {
        /// Component index
        index: usize,
        /// Offending value
        value: f64,
    },

    /// The blended step offset is not strictly positive and finite.
    #[error("Invalid blended step offset: {0} (must be strictly positive and finite)")]
    InvalidEta(f64),

    /// Step length differs from the evaluation input dimension.
    #[error("Step dimension mismatch: evaluation expects {expected}, step has {got}")]
    DimensionMismatch {
        /// Evaluation input dimension
        expected: usize,
        /// Step length
        got: usize,
    },
}

/// Linear-algebra errors for samples and covariance matrices.
///
/// # Variants
/// - `NotSquare`: Matrix is not square
/// - `NotSymmetric`: Matrix is not symmetric within tolerance
/// - `NonFinite`: Matrix or sample contains NaN or infinity
/// - `NotLowerTriangular`: Triangular factor has entries above the diagonal
/// - `NotPositiveDefinite`: Cholesky factorisation failed
/// - `DimensionMismatch`: Operand shapes disagree
/// - `InsufficientSample`: Too few rows to estimate a statistic
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinalgError {
    /// Matrix is not square.
    #[error("Matrix is not square: {rows}x{cols}")]
    NotSquare {
        /// Row count
        rows: usize,
        /// Column count
        cols: usize,
    },

    /// Matrix is not symmetric.
    #[error("Matrix is not symmetric at ({row}, {col})")]
    NotSymmetric {
        /// Row of the first asymmetric entry
        row: usize,
        /// Column of the first asymmetric entry
        col: usize,
    },

    /// Matrix contains a non-finite entry.
    #[error("Matrix contains a non-finite entry at ({row}, {col})")]
    NonFinite {
        /// Row of the entry
        row: usize,
        /// Column of the entry
        col: usize,
    },

    /// Matrix has a non-zero entry above the diagonal.
    #[error("Matrix is not lower triangular at ({row}, {col})")]
    NotLowerTriangular {
        /// Row of the entry
        row: usize,
        /// Column of the entry
        col: usize,
    },

    /// Cholesky factorisation failed.
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    /// Operand dimensions disagree.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Supplied dimension
        got: usize,
    },

    /// Too few rows for a sample statistic.
    #[error("Insufficient sample size: got {got}, need at least {need}")]
    InsufficientSample {
        /// Rows available
        got: usize,
        /// Rows required
        need: usize,
    },
}
