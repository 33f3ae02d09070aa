//! Calibrate command implementation
//!
//! Runs the 3D-VAR calibration described by a problem file and writes the
//! result as JSON.

use std::path::Path;

use tracing::{info, warn};

use crate::config::ProblemFile;
use crate::Result;

/// Run the calibrate command
pub fn run(problem_path: &Path, output: Option<&Path>, state: Option<&Path>) -> Result<()> {
    info!("Starting calibration...");
    info!("  Problem: {}", problem_path.display());

    let problem = ProblemFile::load_with_env_and_validate(problem_path)?;
    info!(
        family = problem.model.family(),
        bootstrap_size = problem.calibration.bootstrap_size,
        seed = problem.calibration.seed,
        "problem loaded"
    );

    let mut algo = problem.build()?;
    let result = algo.run()?;

    if !result.diagnostics.converged {
        warn!("MAP minimisation did not converge; results may be unreliable");
    }
    let deviations = result.posterior.standard_deviations();
    for (i, (value, sd)) in result.parameter.iter().zip(deviations.iter()).enumerate() {
        info!("  θ[{}] = {:.6} ± {:.6}", i, value, sd);
    }

    let json = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => {
            info!("Writing calibration result to: {}", path.display());
            std::fs::write(path, json)?;
        }
        None => println!("{json}"),
    }

    if let Some(path) = state {
        info!("Writing calibration state to: {}", path.display());
        std::fs::write(path, algo.save().to_json()?)?;
    }

    info!("Calibration complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use calib_optimiser::calibration::{CalibrationResult, ThreeDVar, ThreeDVarState};
    use std::fs;
    use tempfile::TempDir;

    const PROBLEM: &str = r#"
candidate = [0.0]

[model]
family = "polynomial"
degree = 0

[observations]
inputs = [[0.0]]
outputs = [[10.0]]

[parameter_covariance]
diagonal = [1.0]

[error_covariance]
diagonal = [1.0]
"#;

    #[test]
    fn test_calibrate_writes_result_and_state() {
        let dir = TempDir::new().unwrap();
        let problem = dir.path().join("problem.toml");
        let output = dir.path().join("result.json");
        let state = dir.path().join("state.json");
        fs::write(&problem, PROBLEM).unwrap();

        run(&problem, Some(&output), Some(&state)).unwrap();

        let result: CalibrationResult =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_relative_eq!(result.parameter[0], 5.0, epsilon = 1e-6);

        let saved = ThreeDVarState::from_json(&fs::read_to_string(&state).unwrap()).unwrap();
        let model = ProblemFile::load(&problem).unwrap().model.build().unwrap();
        let loaded: ThreeDVar = ThreeDVar::load(saved, model).unwrap();
        assert_eq!(loaded.result(), Some(&result));
    }

    #[test]
    fn test_calibrate_missing_problem() {
        let dir = TempDir::new().unwrap();
        assert!(run(&dir.path().join("missing.toml"), None, None).is_err());
    }
}
