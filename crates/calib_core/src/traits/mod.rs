//! Core traits for black-box evaluation and calibration.
//!
//! This module defines fundamental abstractions for:
//! - Black-box functions `F(x)` (`Evaluation` trait)
//! - Parametric models `F(θ, x)` (`ParametricModel` trait)
//! - Calibration algorithms (`CalibrationAlgorithm` trait)
//!
//! Models are opaque: they are only ever evaluated, never differentiated
//! symbolically. Derivatives come from [`crate::math::diff`].

pub mod calibration;
pub mod evaluation;

pub use calibration::CalibrationAlgorithm;
pub use evaluation::{Evaluation, FnEvaluation, FnModel, ParametricEvaluation, ParametricModel};
