//! 3D-VAR calibration of a parametric model.
//!
//! # Cost Function
//!
//! Given observations `(x_i, y_i)`, a background (prior) parameter `θᵇ`
//! with covariance `Cᵇ` and an observation error covariance `Cᵒ`, 3D-VAR
//! finds the maximum a-posteriori parameter
//!
//! ```text
//! θ̂ = argmin J(θ),   J(θ) = ||Lᵦ⁻¹(θ - θᵇ)||² + Σ_i ||Lₒ⁻¹(y_i - F(θ, x_i))||²
//! ```
//!
//! where `Cᵇ = Lᵦ Lᵦᵀ` and `Cᵒ = Lₒ Lₒᵀ` are Cholesky factorisations. The
//! stacked whitened residual is handed to an [`OptimizationAlgorithm`]
//! together with its Jacobian, whose observation blocks `-Lₒ⁻¹ J_i` come from
//! forward differences of `θ ↦ F(θ, x_i)`.
//!
//! # Posterior
//!
//! - `bootstrap_size > 0`: the whole minimisation is repeated on resampled
//!   observation sets; the posterior is the sample mean and covariance of
//!   the replica estimates.
//! - `bootstrap_size == 0`: the posterior is the linearised Gaussian around
//!   `θ̂` with covariance `(AᵀA)⁻¹`, `A` the whitened residual Jacobian.
//!
//! # Bootstrap Failures
//!
//! [`BootstrapFailurePolicy::Abort`] (default) fails the run with the first
//! failing replica's error. [`BootstrapFailurePolicy::Skip`] drops failed
//! replicas and needs at least two successes.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use calib_core::math::diff::{FiniteDifferenceGradient, FiniteDifferenceStep};
use calib_core::traits::{CalibrationAlgorithm, ParametricEvaluation, ParametricModel};
use calib_core::types::{
    CovarianceMatrix, EvaluationError, LinalgError, Matrix, Point, Sample, TriangularMatrix,
};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::bootstrap::resample_pair;
use super::error::{CalibrationError, CovarianceRole};
use super::result::{CalibrationDiagnostics, CalibrationResult, PosteriorEstimate, PosteriorKind};
use crate::solvers::{LeastSquaresProblem, OptimizationAlgorithm, OptimizationResult, Solver};

/// Replicas needed for a sample covariance.
const MIN_REPLICAS: usize = 2;

/// What to do when a bootstrap replica fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BootstrapFailurePolicy {
    /// Fail the run with the first failing replica's error.
    #[default]
    Abort,
    /// Drop failed replicas, logging a warning for each.
    Skip,
}

/// Run settings of [`ThreeDVar`].
///
/// # Example
///
/// ```
/// use calib_optimiser::calibration::{BootstrapFailurePolicy, ThreeDVarConfig};
///
/// let config = ThreeDVarConfig::default()
///     .with_bootstrap_size(200)
///     .with_seed(7)
///     .with_failure_policy(BootstrapFailurePolicy::Skip);
/// assert_eq!(config.bootstrap_size, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ThreeDVarConfig {
    /// Number of bootstrap replicas; zero selects the linearised posterior.
    pub bootstrap_size: usize,
    /// Seed of the bootstrap resampling.
    pub seed: u64,
    /// Handling of failed replicas.
    pub failure_policy: BootstrapFailurePolicy,
    /// Finite-difference step for the model Jacobian.
    pub gradient_step: FiniteDifferenceStep,
}

impl ThreeDVarConfig {
    /// Set the number of bootstrap replicas.
    pub fn with_bootstrap_size(mut self, bootstrap_size: usize) -> Self {
        self.bootstrap_size = bootstrap_size;
        self
    }

    /// Set the bootstrap seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, failure_policy: BootstrapFailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Set the finite-difference step.
    pub fn with_gradient_step(mut self, gradient_step: FiniteDifferenceStep) -> Self {
        self.gradient_step = gradient_step;
        self
    }
}

/// 3D-VAR calibration algorithm.
///
/// Constructed once with the model, the observations, the prior and the
/// covariances; [`run`](Self::run) only mutates the stored result. Every
/// setter clears the stored result.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use calib_core::traits::{FnModel, ParametricModel};
/// use calib_core::types::{CovarianceMatrix, Point, Sample};
/// use calib_optimiser::calibration::ThreeDVar;
///
/// // F(θ, x) = θ
/// let model: Arc<dyn ParametricModel> =
///     Arc::new(FnModel::new(1, 1, 1, |t: &Point, _x: &Point| Ok(t.clone())));
///
/// let mut algo = ThreeDVar::new(
///     model,
///     Sample::zeros(1, 1),
///     Sample::from_rows(&[vec![10.0]]).unwrap(),
///     Point::zeros(1),
///     CovarianceMatrix::identity(1),
///     CovarianceMatrix::identity(1),
/// ).unwrap();
///
/// let result = algo.run().unwrap();
/// assert!((result.parameter[0] - 5.0).abs() < 1e-6);
/// ```
#[derive(Clone)]
pub struct ThreeDVar<A: OptimizationAlgorithm = Solver> {
    model: Arc<dyn ParametricModel>,
    input_observations: Sample,
    output_observations: Sample,
    candidate: Point,
    parameter_covariance: CovarianceMatrix,
    error_covariance: CovarianceMatrix,
    algorithm: A,
    config: ThreeDVarConfig,
    result: Option<CalibrationResult>,
}

impl ThreeDVar<Solver> {
    /// Create a calibration with the default Levenberg-Marquardt solver.
    ///
    /// # Errors
    ///
    /// See [`with_algorithm`](Self::with_algorithm).
    pub fn new(
        model: Arc<dyn ParametricModel>,
        input_observations: Sample,
        output_observations: Sample,
        candidate: Point,
        parameter_covariance: CovarianceMatrix,
        error_covariance: CovarianceMatrix,
    ) -> Result<Self, CalibrationError> {
        Self::with_algorithm(
            model,
            input_observations,
            output_observations,
            candidate,
            parameter_covariance,
            error_covariance,
            Solver::default(),
        )
    }
}

impl<A: OptimizationAlgorithm> ThreeDVar<A> {
    /// Create a calibration with an explicit optimisation strategy.
    ///
    /// # Errors
    ///
    /// - `CalibrationError::DimensionMismatch` if the candidate, either
    ///   covariance or the observation dimensions disagree with the model
    /// - `CalibrationError::ObservationCountMismatch` if the samples differ
    ///   in row count
    /// - `CalibrationError::EmptyObservations` if there are no observations
    pub fn with_algorithm(
        model: Arc<dyn ParametricModel>,
        input_observations: Sample,
        output_observations: Sample,
        candidate: Point,
        parameter_covariance: CovarianceMatrix,
        error_covariance: CovarianceMatrix,
        algorithm: A,
    ) -> Result<Self, CalibrationError> {
        let p = model.parameter_dimension();
        if candidate.len() != p {
            return Err(CalibrationError::dimension_mismatch("candidate", p, candidate.len()));
        }
        if parameter_covariance.dimension() != p {
            return Err(CalibrationError::dimension_mismatch(
                "parameter covariance",
                p,
                parameter_covariance.dimension(),
            ));
        }
        let m = model.output_dimension();
        if error_covariance.dimension() != m {
            return Err(CalibrationError::dimension_mismatch(
                "error covariance",
                m,
                error_covariance.dimension(),
            ));
        }
        check_observations(model.as_ref(), &input_observations, &output_observations)?;

        Ok(Self {
            model,
            input_observations,
            output_observations,
            candidate,
            parameter_covariance,
            error_covariance,
            algorithm,
            config: ThreeDVarConfig::default(),
            result: None,
        })
    }

    /// Replace the run settings.
    ///
    /// # Errors
    ///
    /// Returns `CalibrationError::Gradient` if the step does not fit the
    /// parameter dimension.
    pub fn with_config(mut self, config: ThreeDVarConfig) -> Result<Self, CalibrationError> {
        config
            .gradient_step
            .validate(self.model.parameter_dimension())?;
        self.config = config;
        self.result = None;
        Ok(self)
    }

    // ========================================
    // Accessors
    // ========================================

    /// Optimisation strategy.
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    /// Replace the optimisation strategy.
    pub fn set_algorithm(&mut self, algorithm: A) {
        self.algorithm = algorithm;
        self.result = None;
    }

    /// Background parameter `θᵇ`.
    pub fn candidate(&self) -> &Point {
        &self.candidate
    }

    /// Background covariance `Cᵇ`.
    pub fn parameter_covariance(&self) -> &CovarianceMatrix {
        &self.parameter_covariance
    }

    /// Observation error covariance `Cᵒ`.
    pub fn error_covariance(&self) -> &CovarianceMatrix {
        &self.error_covariance
    }

    /// Run settings.
    pub fn config(&self) -> &ThreeDVarConfig {
        &self.config
    }

    /// Number of bootstrap replicas.
    pub fn bootstrap_size(&self) -> usize {
        self.config.bootstrap_size
    }

    /// Set the number of bootstrap replicas.
    pub fn set_bootstrap_size(&mut self, bootstrap_size: usize) {
        self.config.bootstrap_size = bootstrap_size;
        self.result = None;
    }

    /// Bootstrap seed.
    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    /// Set the bootstrap seed.
    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = seed;
        self.result = None;
    }

    /// Bootstrap failure policy.
    pub fn failure_policy(&self) -> BootstrapFailurePolicy {
        self.config.failure_policy
    }

    /// Set the bootstrap failure policy.
    pub fn set_failure_policy(&mut self, failure_policy: BootstrapFailurePolicy) {
        self.config.failure_policy = failure_policy;
        self.result = None;
    }

    /// Finite-difference step of the model Jacobian.
    pub fn gradient_step(&self) -> &FiniteDifferenceStep {
        &self.config.gradient_step
    }

    /// Set the finite-difference step.
    ///
    /// # Errors
    ///
    /// Returns `CalibrationError::Gradient` and leaves the calibration
    /// untouched if the step does not fit the parameter dimension.
    pub fn set_gradient_step(&mut self, step: FiniteDifferenceStep) -> Result<(), CalibrationError> {
        step.validate(self.model.parameter_dimension())?;
        self.config.gradient_step = step;
        self.result = None;
        Ok(())
    }

    /// Model being calibrated.
    pub fn model(&self) -> &Arc<dyn ParametricModel> {
        &self.model
    }

    /// Input observations.
    pub fn input_observations(&self) -> &Sample {
        &self.input_observations
    }

    /// Output observations.
    pub fn output_observations(&self) -> &Sample {
        &self.output_observations
    }

    /// Result of the last run, cleared by every setter.
    pub fn result(&self) -> Option<&CalibrationResult> {
        self.result.as_ref()
    }

    #[cfg(feature = "serde")]
    pub(crate) fn restore_result(&mut self, result: Option<CalibrationResult>) {
        self.result = result;
    }

    // ========================================
    // Calibration
    // ========================================

    /// Calibrate and store the result.
    ///
    /// The inverse Cholesky factors of `Cᵇ` and `Cᵒ` are computed first, so
    /// a covariance that is not positive definite fails with
    /// `CalibrationError::Singular` before any model evaluation.
    pub fn run(&mut self) -> Result<&CalibrationResult, CalibrationError> {
        let started = Instant::now();
        info!(
            algorithm = self.algorithm.name(),
            observations = self.input_observations.size(),
            bootstrap_size = self.config.bootstrap_size,
            "starting 3D-VAR calibration"
        );

        let parameter_factor = self
            .parameter_covariance
            .inverse_cholesky()
            .map_err(|e| CalibrationError::singular(CovarianceRole::Parameter, e))?;
        let error_factor = self
            .error_covariance
            .inverse_cholesky()
            .map_err(|e| CalibrationError::singular(CovarianceRole::Observation, e))?;

        let map = self.run_with_factors(
            &self.input_observations,
            &self.output_observations,
            &self.candidate,
            &parameter_factor,
            &error_factor,
        )?;
        if !map.converged {
            warn!(
                iterations = map.iterations,
                cost = map.cost,
                "3D-VAR minimisation did not converge"
            );
        }

        let mut diagnostics = CalibrationDiagnostics {
            algorithm: self.algorithm.name().to_string(),
            iterations: map.iterations,
            converged: map.converged,
            skipped_replicas: 0,
            unconverged_replicas: 0,
            duration: Default::default(),
        };

        let (posterior, replicas) = if self.config.bootstrap_size > 0 {
            let outcome = self.bootstrap(&parameter_factor, &error_factor)?;
            diagnostics.skipped_replicas = outcome.skipped;
            diagnostics.unconverged_replicas = outcome.unconverged;
            (outcome.posterior, Some(outcome.replicas))
        } else {
            let posterior =
                self.linearised_posterior(&map.solution, &parameter_factor, &error_factor)?;
            (posterior, None)
        };

        diagnostics.duration = started.elapsed();
        info!(
            cost = map.cost,
            iterations = map.iterations,
            duration_ms = diagnostics.duration.as_millis() as u64,
            "3D-VAR calibration finished"
        );

        let result = CalibrationResult {
            parameter: map.solution,
            cost: map.cost,
            posterior,
            replicas,
            diagnostics,
        };
        Ok(self.result.insert(result))
    }

    /// Minimise the 3D-VAR cost for explicit observations, prior and
    /// whitening factors, starting from `candidate`.
    ///
    /// `parameter_inverse_cholesky` and `error_inverse_cholesky` are
    /// `Lᵦ⁻¹` and `Lₒ⁻¹`. Nothing is stored.
    ///
    /// # Errors
    ///
    /// - `CalibrationError::DimensionMismatch` if the samples, the candidate
    ///   or the factors disagree with the model
    /// - `CalibrationError::ObservationCountMismatch`,
    ///   `CalibrationError::EmptyObservations` for unusable samples
    /// - `CalibrationError::Gradient` for an invalid finite-difference step
    /// - `CalibrationError::Optimiser` for optimiser and model failures
    pub fn run_with_factors(
        &self,
        input_observations: &Sample,
        output_observations: &Sample,
        candidate: &Point,
        parameter_inverse_cholesky: &TriangularMatrix,
        error_inverse_cholesky: &TriangularMatrix,
    ) -> Result<OptimizationResult, CalibrationError> {
        let problem = self.assemble(
            input_observations,
            output_observations,
            candidate,
            parameter_inverse_cholesky,
            error_inverse_cholesky,
        )?;
        let result = self.algorithm.minimise(&problem, candidate)?;
        debug!(
            cost = result.cost,
            iterations = result.iterations,
            converged = result.converged,
            "3D-VAR minimisation"
        );
        Ok(result)
    }

    /// Build the whitened least-squares problem.
    fn assemble<'a>(
        &'a self,
        input_observations: &Sample,
        output_observations: &Sample,
        candidate: &'a Point,
        parameter_factor: &'a TriangularMatrix,
        error_factor: &'a TriangularMatrix,
    ) -> Result<LeastSquaresProblem<'a>, CalibrationError> {
        let p = self.model.parameter_dimension();
        let m = self.model.output_dimension();
        check_observations(self.model.as_ref(), input_observations, output_observations)?;
        if candidate.len() != p {
            return Err(CalibrationError::dimension_mismatch("candidate", p, candidate.len()));
        }
        if parameter_factor.dimension() != p {
            return Err(CalibrationError::dimension_mismatch(
                "parameter inverse Cholesky factor",
                p,
                parameter_factor.dimension(),
            ));
        }
        if error_factor.dimension() != m {
            return Err(CalibrationError::dimension_mismatch(
                "error inverse Cholesky factor",
                m,
                error_factor.dimension(),
            ));
        }

        let inputs: Vec<Point> = input_observations.rows().collect();
        let outputs: Vec<Point> = output_observations.rows().collect();
        let gradients = inputs
            .iter()
            .map(|x| {
                let evaluation = ParametricEvaluation::new(self.model.clone(), x.clone())?;
                Ok(FiniteDifferenceGradient::non_centered(
                    self.config.gradient_step.clone(),
                    Arc::new(evaluation),
                )?)
            })
            .collect::<Result<Vec<_>, CalibrationError>>()?;

        let n_residuals = p + inputs.len() * m;
        let model = &self.model;

        let residual = move |theta: &Point| -> Result<Point, EvaluationError> {
            let mut r = Point::zeros(n_residuals);
            r.rows_mut(0, p)
                .copy_from(&parameter_factor.apply(&(theta - candidate)));
            for (i, (x, y)) in inputs.iter().zip(&outputs).enumerate() {
                let f = model.evaluate_checked(theta, x)?;
                r.rows_mut(p + i * m, m)
                    .copy_from(&error_factor.apply(&(y - f)));
            }
            Ok(r)
        };

        let jacobian = move |theta: &Point| -> Result<Matrix, EvaluationError> {
            let mut jac = Matrix::zeros(n_residuals, p);
            jac.view_mut((0, 0), (p, p))
                .copy_from(parameter_factor.as_matrix());
            for (i, gradient) in gradients.iter().enumerate() {
                let block = error_factor.apply_matrix(&gradient.jacobian(theta)?);
                jac.view_mut((p + i * m, 0), (m, p)).copy_from(&(-block));
            }
            Ok(jac)
        };

        Ok(LeastSquaresProblem::new(p, residual).with_jacobian(jacobian))
    }

    /// Gaussian posterior `N(θ̂, (AᵀA)⁻¹)` from the whitened Jacobian at `θ̂`.
    fn linearised_posterior(
        &self,
        solution: &Point,
        parameter_factor: &TriangularMatrix,
        error_factor: &TriangularMatrix,
    ) -> Result<PosteriorEstimate, CalibrationError> {
        let problem = self.assemble(
            &self.input_observations,
            &self.output_observations,
            &self.candidate,
            parameter_factor,
            error_factor,
        )?;
        let a = problem.jacobian(solution)?;
        let p = solution.len();
        let normal = a.tr_mul(&a);
        let cholesky = normal.cholesky().ok_or(CalibrationError::singular(
            CovarianceRole::Posterior,
            LinalgError::NotPositiveDefinite,
        ))?;
        let inverse = cholesky.solve(&Matrix::identity(p, p));
        let symmetric = (&inverse + inverse.transpose()) * 0.5;
        let covariance = CovarianceMatrix::new(symmetric)
            .map_err(|e| CalibrationError::singular(CovarianceRole::Posterior, e))?;

        Ok(PosteriorEstimate {
            mean: solution.clone(),
            covariance,
            kind: PosteriorKind::Linearised,
        })
    }

    /// Rerun the minimisation on resampled observation sets.
    fn bootstrap(
        &self,
        parameter_factor: &TriangularMatrix,
        error_factor: &TriangularMatrix,
    ) -> Result<BootstrapOutcome, CalibrationError> {
        let size = self.config.bootstrap_size;
        let seed = self.config.seed;

        let replica = |index: usize| {
            let (inputs, outputs) =
                resample_pair(&self.input_observations, &self.output_observations, seed, index);
            let result =
                self.run_with_factors(&inputs, &outputs, &self.candidate, parameter_factor, error_factor);
            debug!(replica = index, ok = result.is_ok(), "bootstrap replica finished");
            result
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<Result<OptimizationResult, CalibrationError>> =
            (0..size).into_par_iter().map(replica).collect();

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<Result<OptimizationResult, CalibrationError>> =
            (0..size).map(replica).collect();

        let mut estimates = Vec::with_capacity(size);
        let mut skipped = 0;
        let mut unconverged = 0;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(result) => {
                    if !result.converged {
                        unconverged += 1;
                    }
                    estimates.push(result.solution);
                }
                Err(error) => match self.config.failure_policy {
                    BootstrapFailurePolicy::Abort => {
                        return Err(CalibrationError::bootstrap(index, error));
                    }
                    BootstrapFailurePolicy::Skip => {
                        warn!(replica = index, %error, "skipping failed bootstrap replica");
                        skipped += 1;
                    }
                },
            }
        }
        if unconverged > 0 {
            warn!(unconverged, "bootstrap replicas did not converge");
        }
        let (replicas, posterior) = replica_posterior(&estimates, self.candidate.len())?;

        Ok(BootstrapOutcome {
            posterior,
            replicas,
            skipped,
            unconverged,
        })
    }
}

/// Sample mean and covariance of the replica estimates.
fn replica_posterior(
    estimates: &[Point],
    dimension: usize,
) -> Result<(Sample, PosteriorEstimate), CalibrationError> {
    if estimates.len() < MIN_REPLICAS {
        return Err(CalibrationError::InsufficientReplicas {
            succeeded: estimates.len(),
            required: MIN_REPLICAS,
        });
    }
    let replicas = Sample::new(Matrix::from_fn(estimates.len(), dimension, |i, j| {
        estimates[i][j]
    }));
    let covariance = replicas
        .covariance()
        .map_err(|e| CalibrationError::singular(CovarianceRole::Posterior, e))?;
    let posterior = PosteriorEstimate {
        mean: replicas.mean(),
        covariance,
        kind: PosteriorKind::Bootstrap,
    };
    Ok((replicas, posterior))
}

struct BootstrapOutcome {
    posterior: PosteriorEstimate,
    replicas: Sample,
    skipped: usize,
    unconverged: usize,
}

/// Check paired observations against the model dimensions.
fn check_observations(
    model: &dyn ParametricModel,
    input_observations: &Sample,
    output_observations: &Sample,
) -> Result<(), CalibrationError> {
    if input_observations.size() != output_observations.size() {
        return Err(CalibrationError::ObservationCountMismatch {
            inputs: input_observations.size(),
            outputs: output_observations.size(),
        });
    }
    if input_observations.is_empty() {
        return Err(CalibrationError::EmptyObservations);
    }
    if input_observations.dimension() != model.input_dimension() {
        return Err(CalibrationError::dimension_mismatch(
            "input observations",
            model.input_dimension(),
            input_observations.dimension(),
        ));
    }
    if output_observations.dimension() != model.output_dimension() {
        return Err(CalibrationError::dimension_mismatch(
            "output observations",
            model.output_dimension(),
            output_observations.dimension(),
        ));
    }
    Ok(())
}

impl<A: OptimizationAlgorithm> CalibrationAlgorithm for ThreeDVar<A> {
    type Output = CalibrationResult;
    type Error = CalibrationError;

    fn run(&mut self) -> Result<&CalibrationResult, CalibrationError> {
        ThreeDVar::run(self)
    }

    fn result(&self) -> Option<&CalibrationResult> {
        ThreeDVar::result(self)
    }

    fn model(&self) -> &Arc<dyn ParametricModel> {
        &self.model
    }

    fn input_observations(&self) -> &Sample {
        &self.input_observations
    }

    fn output_observations(&self) -> &Sample {
        &self.output_observations
    }

    fn candidate(&self) -> &Point {
        &self.candidate
    }
}

impl<A: OptimizationAlgorithm + fmt::Debug> fmt::Debug for ThreeDVar<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreeDVar")
            .field("parameter_dimension", &self.model.parameter_dimension())
            .field("observations", &self.input_observations.size())
            .field("candidate", &self.candidate)
            .field("algorithm", &self.algorithm)
            .field("config", &self.config)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}
