//! Integration tests for 3D-VAR calibration.
//!
//! These tests verify end-to-end behaviour: MAP estimation, the linearised
//! and bootstrap posteriors, reproducibility, failure policies and
//! persistence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use calib_core::traits::{CalibrationAlgorithm, FnModel, ParametricModel};
use calib_core::types::{CovarianceMatrix, EvaluationError, Matrix, Point, Sample};
use calib_optimiser::calibration::{
    bootstrap_indices, BootstrapFailurePolicy, CalibrationError, CovarianceRole, PosteriorKind,
    ThreeDVar, ThreeDVarConfig,
};
use calib_optimiser::solvers::{BfgsConfig, LMConfig, Solver};

// ============================================================================
// Fixtures
// ============================================================================

/// F(θ, x) = θ
fn identity_model() -> Arc<dyn ParametricModel> {
    Arc::new(FnModel::new(1, 1, 1, |t: &Point, _x: &Point| Ok(t.clone())))
}

/// F(θ, x) = θ0 · exp(θ1 · x)
fn exponential_model() -> Arc<dyn ParametricModel> {
    Arc::new(FnModel::new(2, 1, 1, |t: &Point, x: &Point| {
        Ok(Point::from_vec(vec![t[0] * (t[1] * x[0]).exp()]))
    }))
}

/// Noisy observations of 2·exp(-0.3·x) on a fixed grid.
fn exponential_data() -> (Sample, Sample) {
    let noise = [0.01, -0.02, 0.015, 0.0, -0.01, 0.02, -0.015, 0.005, 0.01, -0.005];
    let xs: Vec<Vec<f64>> = (0..10).map(|i| vec![0.5 * i as f64]).collect();
    let ys: Vec<Vec<f64>> = xs
        .iter()
        .zip(noise)
        .map(|(x, e)| vec![2.0 * (-0.3 * x[0]).exp() + e])
        .collect();
    (Sample::from_rows(&xs).unwrap(), Sample::from_rows(&ys).unwrap())
}

fn exponential_calibration() -> ThreeDVar {
    let (xs, ys) = exponential_data();
    ThreeDVar::new(
        exponential_model(),
        xs,
        ys,
        Point::from_vec(vec![1.5, -0.2]),
        CovarianceMatrix::from_diagonal(&[1.0, 1.0]).unwrap(),
        CovarianceMatrix::from_diagonal(&[1e-4]).unwrap(),
    )
    .unwrap()
}

// ============================================================================
// MAP estimation
// ============================================================================

#[test]
fn test_identity_model_with_unit_covariances() {
    let mut algo = ThreeDVar::new(
        identity_model(),
        Sample::zeros(1, 1),
        Sample::from_rows(&[vec![10.0]]).unwrap(),
        Point::zeros(1),
        CovarianceMatrix::identity(1),
        CovarianceMatrix::identity(1),
    )
    .unwrap();

    let result = algo.run().unwrap();
    assert_relative_eq!(result.parameter[0], 5.0, epsilon = 1e-6);
}

#[test]
fn test_identity_model_far_from_origin() {
    // ulp(1e9) is not the default 1e-7 step; the Jacobian must still be exact
    let background = 1e9;
    let mut algo = ThreeDVar::new(
        identity_model(),
        Sample::zeros(1, 1),
        Sample::from_rows(&[vec![background + 10.0]]).unwrap(),
        Point::from_vec(vec![background]),
        CovarianceMatrix::identity(1),
        CovarianceMatrix::identity(1),
    )
    .unwrap();

    let result = algo.run().unwrap();
    assert!(result.diagnostics.converged);
    assert!((result.parameter[0] - background - 5.0).abs() < 1e-2);
    assert_relative_eq!(result.covariance().as_matrix()[(0, 0)], 0.5, max_relative = 1e-12);
}

#[test]
fn test_absorbed_gradient_step_fails_the_run() {
    let background = 2e11;
    let mut algo = ThreeDVar::new(
        identity_model(),
        Sample::zeros(1, 1),
        Sample::from_rows(&[vec![background + 10.0]]).unwrap(),
        Point::from_vec(vec![background]),
        CovarianceMatrix::identity(1),
        CovarianceMatrix::identity(1),
    )
    .unwrap();

    assert!(algo.run().is_err());
    assert!(algo.result().is_none());
}

#[test]
fn test_both_strategies_recover_exponential_parameters() {
    for solver in [
        Solver::LevenbergMarquardt(LMConfig::default()),
        Solver::Bfgs(BfgsConfig::default()),
    ] {
        let mut algo = exponential_calibration();
        algo.set_algorithm(solver);
        let result = algo.run().unwrap();
        assert!((result.parameter[0] - 2.0).abs() < 0.05, "{:?}", result.parameter);
        assert!((result.parameter[1] + 0.3).abs() < 0.02, "{:?}", result.parameter);
    }
}

#[test]
fn test_run_through_calibration_contract() {
    fn calibrate<C: CalibrationAlgorithm>(algo: &mut C) -> bool {
        algo.run().is_ok() && algo.result().is_some()
    }
    let mut algo = exponential_calibration();
    assert!(calibrate(&mut algo));
    assert_eq!(CalibrationAlgorithm::candidate(&algo)[0], 1.5);
    assert_eq!(CalibrationAlgorithm::input_observations(&algo).size(), 10);
}

#[test]
fn test_zero_bootstrap_matches_low_level_run() {
    let mut algo = exponential_calibration();
    algo.set_bootstrap_size(0);
    let parameter = algo.run().unwrap().parameter.clone();

    let low_level = algo
        .run_with_factors(
            algo.input_observations(),
            algo.output_observations(),
            algo.candidate(),
            &algo.parameter_covariance().inverse_cholesky().unwrap(),
            &algo.error_covariance().inverse_cholesky().unwrap(),
        )
        .unwrap();

    assert_eq!(parameter, low_level.solution);
}

// ============================================================================
// Posterior
// ============================================================================

#[test]
fn test_linearised_posterior_of_linear_gaussian_model() {
    // y_i = θ + noise, prior N(0, σb²), noise N(0, σo²)
    let (sigma_b2, sigma_o2) = (4.0, 0.5);
    let ys = [1.2, 0.8, 1.1, 0.9, 1.0];
    let n = ys.len() as f64;

    let mut algo = ThreeDVar::new(
        identity_model(),
        Sample::zeros(ys.len(), 1),
        Sample::from_rows(&ys.iter().map(|&y| vec![y]).collect::<Vec<_>>()).unwrap(),
        Point::zeros(1),
        CovarianceMatrix::from_diagonal(&[sigma_b2]).unwrap(),
        CovarianceMatrix::from_diagonal(&[sigma_o2]).unwrap(),
    )
    .unwrap();

    let result = algo.run().unwrap();
    let posterior_variance = 1.0 / (1.0 / sigma_b2 + n / sigma_o2);
    let posterior_mean = posterior_variance * ys.iter().sum::<f64>() / sigma_o2;

    assert_eq!(result.posterior.kind, PosteriorKind::Linearised);
    assert!(result.replicas.is_none());
    assert_relative_eq!(result.parameter[0], posterior_mean, epsilon = 1e-6);
    assert_relative_eq!(result.mean()[0], posterior_mean, epsilon = 1e-6);
    assert_relative_eq!(
        result.covariance().as_matrix()[(0, 0)],
        posterior_variance,
        max_relative = 1e-6
    );
}

#[test]
fn test_linearised_posterior_two_parameters() {
    // F(θ, x) = θ0 + θ1·x: posterior (Cb⁻¹ + Hᵀ Co⁻¹ H)⁻¹
    let model: Arc<dyn ParametricModel> = Arc::new(FnModel::new(2, 1, 1, |t: &Point, x: &Point| {
        Ok(Point::from_vec(vec![t[0] + t[1] * x[0]]))
    }));
    let xs = [0.0, 1.0, 2.0];
    let mut algo = ThreeDVar::new(
        model,
        Sample::from_rows(&xs.iter().map(|&x| vec![x]).collect::<Vec<_>>()).unwrap(),
        Sample::from_rows(&[vec![1.0], vec![3.0], vec![5.0]]).unwrap(),
        Point::zeros(2),
        CovarianceMatrix::identity(2),
        CovarianceMatrix::from_diagonal(&[0.1]).unwrap(),
    )
    .unwrap();
    let result = algo.run().unwrap();

    let h = Matrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
    let precision = Matrix::identity(2, 2) + h.transpose() * &h / 0.1;
    let expected = precision.try_inverse().unwrap();

    let covariance = result.covariance().as_matrix();
    for i in 0..2 {
        for j in 0..2 {
            assert_relative_eq!(covariance[(i, j)], expected[(i, j)], epsilon = 1e-7);
        }
    }
}

#[test]
fn test_bootstrap_posterior() {
    let mut algo = exponential_calibration()
        .with_config(ThreeDVarConfig::default().with_bootstrap_size(40).with_seed(11))
        .unwrap();
    let result = algo.run().unwrap();

    assert_eq!(result.posterior.kind, PosteriorKind::Bootstrap);
    let replicas = result.replicas.as_ref().unwrap();
    assert_eq!(replicas.size(), 40);
    assert_eq!(replicas.dimension(), 2);
    assert_eq!(result.mean(), &replicas.mean());
    assert_eq!(result.covariance(), &replicas.covariance().unwrap());
    assert!((result.mean()[0] - 2.0).abs() < 0.05);
    assert_eq!(result.diagnostics.skipped_replicas, 0);
}

#[test]
fn test_bootstrap_is_reproducible() {
    let config = ThreeDVarConfig::default().with_bootstrap_size(20).with_seed(2024);
    let mut first = exponential_calibration().with_config(config.clone()).unwrap();
    let mut second = exponential_calibration().with_config(config).unwrap();

    let a = first.run().unwrap().replicas.clone().unwrap();
    let b = second.run().unwrap().replicas.clone().unwrap();
    assert_eq!(a, b);

    assert_eq!(bootstrap_indices(10, 2024, 3), bootstrap_indices(10, 2024, 3));

    second.set_seed(2025);
    let c = second.run().unwrap().replicas.clone().unwrap();
    assert_ne!(a, c);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_candidate_and_covariance_dimension_mismatch() {
    let err = ThreeDVar::new(
        exponential_model(),
        Sample::zeros(1, 1),
        Sample::zeros(1, 1),
        Point::zeros(2),
        CovarianceMatrix::identity(3),
        CovarianceMatrix::identity(1),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CalibrationError::dimension_mismatch("parameter covariance", 2, 3)
    );
}

#[test]
fn test_singular_covariance_before_any_evaluation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let model: Arc<dyn ParametricModel> = Arc::new(FnModel::new(1, 1, 1, move |t: &Point, _x: &Point| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(t.clone())
    }));
    let mut algo = ThreeDVar::new(
        model,
        Sample::zeros(2, 1),
        Sample::zeros(2, 1),
        Point::zeros(1),
        CovarianceMatrix::identity(1),
        CovarianceMatrix::new(Matrix::from_element(1, 1, -1.0)).unwrap(),
    )
    .unwrap();

    let err = algo.run().unwrap_err();
    assert!(err.is_singular());
    assert!(matches!(
        err,
        CalibrationError::Singular {
            which: CovarianceRole::Observation,
            ..
        }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(algo.result().is_none());
}

// ============================================================================
// Bootstrap failure policies
// ============================================================================

const FRAGILE_SIZE: usize = 8;
const FRAGILE_REPLICAS: usize = 30;
const FRAGILE_THRESHOLD: f64 = 1.5;

/// F(θ, x) = θ, failing once θ exceeds a threshold.
///
/// Seven observations of 0 and one of 8 under a wide prior put θ̂ just below
/// 1; a replica drawing the last row twice or more pushes θ̂ near 2 and fails.
fn fragile_calibration(policy: BootstrapFailurePolicy, seed: u64) -> ThreeDVar {
    let model: Arc<dyn ParametricModel> = Arc::new(FnModel::new(1, 1, 1, |t: &Point, _x: &Point| {
        if t[0] > FRAGILE_THRESHOLD {
            Err(EvaluationError::failed("parameter out of range"))
        } else {
            Ok(t.clone())
        }
    }));
    let xs: Vec<Vec<f64>> = (0..FRAGILE_SIZE).map(|i| vec![i as f64]).collect();
    let mut ys = vec![vec![0.0]; FRAGILE_SIZE];
    ys[FRAGILE_SIZE - 1] = vec![8.0];
    ThreeDVar::new(
        model,
        Sample::from_rows(&xs).unwrap(),
        Sample::from_rows(&ys).unwrap(),
        Point::zeros(1),
        CovarianceMatrix::from_diagonal(&[100.0]).unwrap(),
        CovarianceMatrix::identity(1),
    )
    .unwrap()
    .with_config(
        ThreeDVarConfig::default()
            .with_bootstrap_size(FRAGILE_REPLICAS)
            .with_seed(seed)
            .with_failure_policy(policy),
    )
    .unwrap()
}

/// Replicas drawing the outlier row at least twice.
fn failing_replicas(seed: u64) -> Vec<usize> {
    (0..FRAGILE_REPLICAS)
        .filter(|&replica| {
            bootstrap_indices(FRAGILE_SIZE, seed, replica)
                .iter()
                .filter(|&&i| i == FRAGILE_SIZE - 1)
                .count()
                >= 2
        })
        .collect()
}

/// First seed with some but not all replicas failing.
fn mixed_seed() -> u64 {
    (0..1000)
        .find(|&seed| {
            let failing = failing_replicas(seed).len();
            failing > 0 && failing + 2 <= FRAGILE_REPLICAS
        })
        .unwrap()
}

#[test]
fn test_skip_policy_drops_failed_replicas() {
    let seed = mixed_seed();
    let expected = failing_replicas(seed);

    let mut algo = fragile_calibration(BootstrapFailurePolicy::Skip, seed);
    let result = algo.run().unwrap();

    assert_eq!(result.diagnostics.skipped_replicas, expected.len());
    let replicas = result.replicas.as_ref().unwrap();
    assert_eq!(replicas.size(), FRAGILE_REPLICAS - expected.len());
    assert!(replicas.rows().all(|theta| theta[0] < FRAGILE_THRESHOLD));
}

#[test]
fn test_abort_policy_reports_first_failing_replica() {
    let seed = mixed_seed();
    let first = failing_replicas(seed)[0];

    let mut algo = fragile_calibration(BootstrapFailurePolicy::Abort, seed);
    match algo.run().unwrap_err() {
        CalibrationError::Bootstrap { replica, .. } => assert_eq!(replica, first),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(algo.result().is_none());
}

#[test]
fn test_model_failure_on_full_data_is_not_a_bootstrap_error() {
    let model: Arc<dyn ParametricModel> = Arc::new(FnModel::new(1, 1, 1, |_t: &Point, x: &Point| {
        if x[0] > 50.0 {
            Err(EvaluationError::failed("input out of range"))
        } else {
            Ok(Point::from_vec(vec![x[0]]))
        }
    }));
    let mut algo = ThreeDVar::new(
        model,
        Sample::from_rows(&[vec![1.0], vec![100.0]]).unwrap(),
        Sample::from_rows(&[vec![1.0], vec![1.0]]).unwrap(),
        Point::zeros(1),
        CovarianceMatrix::identity(1),
        CovarianceMatrix::identity(1),
    )
    .unwrap();
    let err = algo.run().unwrap_err();
    assert!(matches!(err, CalibrationError::Optimiser(_)));
}

// ============================================================================
// Persistence
// ============================================================================

#[cfg(feature = "serde")]
mod persistence {
    use super::*;
    use calib_optimiser::calibration::{ThreeDVarState, STATE_VERSION};

    #[test]
    fn test_round_trip_keeps_result() {
        let mut algo = exponential_calibration()
            .with_config(ThreeDVarConfig::default().with_bootstrap_size(5).with_seed(3))
            .unwrap();
        algo.run().unwrap();

        let json = algo.save().to_json().unwrap();
        let state: ThreeDVarState = ThreeDVarState::from_json(&json).unwrap();
        assert_eq!(state.version, STATE_VERSION);

        let loaded: ThreeDVar = ThreeDVar::load(state, exponential_model()).unwrap();
        assert_eq!(loaded.result(), algo.result());
        assert_eq!(loaded.config(), algo.config());
        assert_eq!(loaded.candidate(), algo.candidate());
    }

    #[test]
    fn test_loaded_calibration_reruns_identically() {
        let config = ThreeDVarConfig::default().with_bootstrap_size(8).with_seed(9);
        let mut algo = exponential_calibration().with_config(config).unwrap();
        let json = algo.save().to_json().unwrap();
        let expected = algo.run().unwrap().replicas.clone();

        let mut loaded: ThreeDVar =
            ThreeDVar::load(ThreeDVarState::from_json(&json).unwrap(), exponential_model()).unwrap();
        assert_eq!(loaded.run().unwrap().replicas, expected);
    }

    #[test]
    fn test_future_version_rejected() {
        let mut state = exponential_calibration().save();
        state.version = STATE_VERSION + 1;
        let err = ThreeDVar::load(state, exponential_model()).unwrap_err();
        assert!(matches!(err, CalibrationError::Persistence(_)));
    }
}
