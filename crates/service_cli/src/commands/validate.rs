//! Validate command implementation
//!
//! Loads a problem file, reads its observations and checks every dimension
//! and both covariance factorisations without running the calibration.

use std::path::Path;

use calib_optimiser::calibration::{CalibrationError, CovarianceRole};
use calib_optimiser::solvers::OptimizationAlgorithm;
use tracing::info;

use crate::config::ProblemFile;
use crate::Result;

/// Run the validate command
pub fn run(problem_path: &Path) -> Result<()> {
    let problem = ProblemFile::load_with_env_and_validate(problem_path)?;
    let algo = problem.build()?;

    algo.parameter_covariance()
        .inverse_cholesky()
        .map_err(|e| CalibrationError::singular(CovarianceRole::Parameter, e))?;
    algo.error_covariance()
        .inverse_cholesky()
        .map_err(|e| CalibrationError::singular(CovarianceRole::Observation, e))?;

    info!(
        family = problem.model.family(),
        parameters = algo.candidate().len(),
        observations = algo.input_observations().size(),
        algorithm = %problem.algorithm.name(),
        "problem is valid"
    );
    Ok(())
}
