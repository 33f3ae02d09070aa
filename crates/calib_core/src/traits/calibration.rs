//! Calibration algorithm contract.
//!
//! Every calibration variant exposes the same surface: a `run()` that
//! mutates only the algorithm's own result state, a result accessor, and
//! read access to the model, the observations and the prior candidate.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use calib_core::traits::calibration::CalibrationAlgorithm;
//! use calib_core::traits::{FnModel, ParametricModel};
//! use calib_core::types::{Point, Sample};
//!
//! // Calibrator that returns the candidate unchanged
//! struct Identity {
//!     model: Arc<dyn ParametricModel>,
//!     inputs: Sample,
//!     outputs: Sample,
//!     candidate: Point,
//!     result: Option<Point>,
//! }
//!
//! impl CalibrationAlgorithm for Identity {
//!     type Output = Point;
//!     type Error = std::convert::Infallible;
//!
//!     fn run(&mut self) -> Result<&Point, Self::Error> {
//!         Ok(self.result.insert(self.candidate.clone()))
//!     }
//!     fn result(&self) -> Option<&Point> { self.result.as_ref() }
//!     fn model(&self) -> &Arc<dyn ParametricModel> { &self.model }
//!     fn input_observations(&self) -> &Sample { &self.inputs }
//!     fn output_observations(&self) -> &Sample { &self.outputs }
//!     fn candidate(&self) -> &Point { &self.candidate }
//! }
//!
//! let model: Arc<dyn ParametricModel> =
//!     Arc::new(FnModel::new(1, 1, 1, |t: &Point, _x: &Point| Ok(t.clone())));
//! let mut algo = Identity {
//!     model,
//!     inputs: Sample::zeros(1, 1),
//!     outputs: Sample::zeros(1, 1),
//!     candidate: Point::from_vec(vec![0.5]),
//!     result: None,
//! };
//! assert!(algo.result().is_none());
//! assert_eq!(algo.run().unwrap()[0], 0.5);
//! assert!(algo.result().is_some());
//! ```

use std::sync::Arc;

use super::evaluation::ParametricModel;
use crate::types::{Point, Sample};

/// Trait for calibration algorithms.
///
/// # Type Parameters
///
/// * `Output` - The result produced by [`run`](Self::run)
/// * `Error` - The failure type of a run
pub trait CalibrationAlgorithm {
    /// Result type of a calibration run.
    type Output;
    /// Failure type of a calibration run.
    type Error;

    /// Perform the calibration and store the result.
    ///
    /// Only the algorithm's result state is mutated; the model and the
    /// observations are left untouched.
    fn run(&mut self) -> Result<&Self::Output, Self::Error>;

    /// Result of the last successful run, if any and still valid.
    fn result(&self) -> Option<&Self::Output>;

    /// The model being calibrated.
    fn model(&self) -> &Arc<dyn ParametricModel>;

    /// Input observations, one row per observation.
    fn input_observations(&self) -> &Sample;

    /// Output observations, paired row by row with the inputs.
    fn output_observations(&self) -> &Sample;

    /// Prior (background) parameter value.
    fn candidate(&self) -> &Point;
}
