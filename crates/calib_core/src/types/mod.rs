//! Core numeric containers and error types.
//!
//! This module provides:
//! - [`Point`] and [`Matrix`]: dense `f64` vectors and matrices (nalgebra)
//! - `sample`: [`Sample`], a table of observations (one row per observation)
//! - `covariance`: [`CovarianceMatrix`] and its whitening factor [`TriangularMatrix`]
//! - `error`: Structured error types for evaluation, differencing and linear algebra
//!
//! # Re-exports
//!
//! For convenience, commonly used types are re-exported at this module level:
//! - [`Sample`] from `sample`
//! - [`CovarianceMatrix`], [`TriangularMatrix`] from `covariance`
//! - [`EvaluationError`], [`DiffError`], [`LinalgError`] from `error`

pub mod covariance;
pub mod error;
pub mod sample;

/// Ordered, fixed-length sequence of real scalars.
///
/// Used for model inputs, outputs, parameter vectors and step vectors.
pub type Point = nalgebra::DVector<f64>;

/// Dense real matrix.
pub type Matrix = nalgebra::DMatrix<f64>;

// Re-export commonly used types at module level
pub use covariance::{CovarianceMatrix, TriangularMatrix};
pub use error::{DiffError, EvaluationError, LinalgError};
pub use sample::Sample;
