//! # calib_core: Numerical Foundation for 3D-VAR Calibration
//!
//! ## Layer 1 (Foundation) Role
//!
//! calib_core serves as the bottom layer of the calibration workspace, providing:
//! - Point, sample and covariance containers (`types`)
//! - Black-box evaluation contracts: `Evaluation`, `ParametricModel` (`traits`)
//! - Finite-difference step policies and gradients (`math::diff`)
//! - Error types: `EvaluationError`, `DiffError`, `LinalgError` (`types::error`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other calib_* crates, with minimal external dependencies:
//! - nalgebra: dense vectors, matrices and Cholesky factorisation
//! - thiserror: structured error types
//! - serde: Serialisation support (optional)
//!
//! ## Usage Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use calib_core::math::diff::FiniteDifferenceGradient;
//! use calib_core::traits::FnEvaluation;
//! use calib_core::types::Point;
//!
//! // f(x) = [x0 * x1, 3 * x0]
//! let f = FnEvaluation::new(2, 2, |x: &Point| Ok(Point::from_vec(vec![x[0] * x[1], 3.0 * x[0]])));
//! let gradient = FiniteDifferenceGradient::non_centered_uniform(1e-7, Arc::new(f)).unwrap();
//!
//! // Transposed Jacobian: entry (i, j) = dF_j / dx_i
//! let g = gradient.gradient(&Point::from_vec(vec![2.0, 5.0])).unwrap();
//! assert!((g[(0, 0)] - 5.0).abs() < 1e-5);
//! assert!((g[(1, 0)] - 2.0).abs() < 1e-5);
//! assert!((g[(0, 1)] - 3.0).abs() < 1e-5);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Enable serialisation for samples, covariances and step policies

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod math;
pub mod traits;
pub mod types;
