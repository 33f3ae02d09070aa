//! # calib_optimiser
//!
//! 3D-VAR calibration, bootstrap posterior estimation and least-squares
//! solvers.
//!
//! ## Architecture Position
//!
//! Layer 2 of the calibration workspace. Depends on `calib_core` (L1) for
//! samples, covariances, model contracts and finite-difference gradients.
//!
//! ## Modules
//!
//! - `calibration`: [`ThreeDVar`](calibration::ThreeDVar), its configuration,
//!   results, bootstrap resampling and persistence
//! - `solvers`: the [`OptimizationAlgorithm`](solvers::OptimizationAlgorithm)
//!   contract with Levenberg-Marquardt and BFGS strategies
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use calib_core::traits::{FnModel, ParametricModel};
//! use calib_core::types::{CovarianceMatrix, Point, Sample};
//! use calib_optimiser::prelude::*;
//!
//! let model: Arc<dyn ParametricModel> =
//!     Arc::new(FnModel::new(1, 1, 1, |t: &Point, _x: &Point| Ok(t.clone())));
//!
//! let mut algo = ThreeDVar::with_algorithm(
//!     model,
//!     Sample::zeros(1, 1),
//!     Sample::from_rows(&[vec![10.0]]).unwrap(),
//!     Point::zeros(1),
//!     CovarianceMatrix::identity(1),
//!     CovarianceMatrix::identity(1),
//!     Solver::Bfgs(BfgsConfig::default()),
//! ).unwrap();
//!
//! let result = algo.run().unwrap();
//! assert!((result.parameter[0] - 5.0).abs() < 1e-5);
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` (default): Run bootstrap replicas on the rayon thread pool
//! - `serde` (default): Serialisation of configs and results, JSON persistence

#![deny(missing_docs)]

pub mod calibration;
pub mod solvers;

mod error;

pub use error::OptimiserError;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::calibration::*;
    pub use crate::solvers::*;
    pub use crate::OptimiserError;
}
