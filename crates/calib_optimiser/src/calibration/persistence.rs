//! Versioned persistence of 3D-VAR calibrations.
//!
//! The black-box model cannot be serialised; it is supplied again on load.
//! Everything else, including the last result, round-trips through
//! [`ThreeDVarState`].

use std::sync::Arc;

use calib_core::traits::ParametricModel;
use calib_core::types::{CovarianceMatrix, Point, Sample};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::CalibrationError;
use super::result::CalibrationResult;
use super::three_d_var::{ThreeDVar, ThreeDVarConfig};
use crate::solvers::{OptimizationAlgorithm, Solver};

/// Current state format version.
pub const STATE_VERSION: u32 = 1;

/// Serialisable snapshot of a [`ThreeDVar`], minus the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeDVarState<A = Solver> {
    /// Format version.
    pub version: u32,
    /// Input observations.
    pub input_observations: Sample,
    /// Output observations.
    pub output_observations: Sample,
    /// Background parameter.
    pub candidate: Point,
    /// Background covariance.
    pub parameter_covariance: CovarianceMatrix,
    /// Observation error covariance.
    pub error_covariance: CovarianceMatrix,
    /// Optimisation strategy.
    pub algorithm: A,
    /// Run settings.
    pub config: ThreeDVarConfig,
    /// Last result, if any.
    pub result: Option<CalibrationResult>,
}

impl<A: Serialize> ThreeDVarState<A> {
    /// Serialise to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CalibrationError> {
        serde_json::to_string_pretty(self).map_err(|e| CalibrationError::persistence(e.to_string()))
    }
}

impl<A: DeserializeOwned> ThreeDVarState<A> {
    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        serde_json::from_str(json).map_err(|e| CalibrationError::persistence(e.to_string()))
    }
}

impl<A: OptimizationAlgorithm + Clone> ThreeDVar<A> {
    /// Snapshot everything except the model.
    pub fn save(&self) -> ThreeDVarState<A> {
        ThreeDVarState {
            version: STATE_VERSION,
            input_observations: self.input_observations().clone(),
            output_observations: self.output_observations().clone(),
            candidate: self.candidate().clone(),
            parameter_covariance: self.parameter_covariance().clone(),
            error_covariance: self.error_covariance().clone(),
            algorithm: self.algorithm().clone(),
            config: self.config().clone(),
            result: self.result().cloned(),
        }
    }
}

impl<A: OptimizationAlgorithm> ThreeDVar<A> {
    /// Rebuild a calibration from a snapshot and the model.
    ///
    /// # Errors
    ///
    /// - `CalibrationError::Persistence` for an unknown format version
    /// - any construction error if the snapshot does not fit `model`
    pub fn load(
        state: ThreeDVarState<A>,
        model: Arc<dyn ParametricModel>,
    ) -> Result<Self, CalibrationError> {
        if state.version != STATE_VERSION {
            return Err(CalibrationError::persistence(format!(
                "unsupported state version {} (expected {})",
                state.version, STATE_VERSION
            )));
        }
        let mut algo = Self::with_algorithm(
            model,
            state.input_observations,
            state.output_observations,
            state.candidate,
            state.parameter_covariance,
            state.error_covariance,
            state.algorithm,
        )?
        .with_config(state.config)?;
        algo.restore_result(state.result);
        Ok(algo)
    }
}
