//! Finite-difference gradients of black-box evaluations.

use std::fmt;
use std::sync::Arc;

use super::step::FiniteDifferenceStep;
use crate::traits::Evaluation;
use crate::types::{DiffError, EvaluationError, Matrix, Point};

/// Difference formula used to approximate each partial derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DifferenceScheme {
    /// Forward difference `(F(x + ε_i e_i) - F(x)) / ε_i`, first order.
    #[default]
    NonCentered,
    /// Centred difference `(F(x + ε_i e_i) - F(x - ε_i e_i)) / 2ε_i`, second order.
    Centered,
}

impl DifferenceScheme {
    /// Number of evaluations issued per gradient for an input of size `n`.
    #[inline]
    pub fn evaluation_count(&self, n: usize) -> usize {
        match self {
            Self::NonCentered => n + 1,
            Self::Centered => 2 * n,
        }
    }
}

/// Finite-difference gradient of an [`Evaluation`].
///
/// The gradient is the transposed Jacobian: an `n × m` matrix whose entry
/// `(i, j)` is `∂F_j/∂x_i`, with `n` the input and `m` the output dimension
/// declared by the evaluation.
///
/// The step policy is validated against the evaluation at construction.
/// Evaluations are issued sequentially and never cached.
#[derive(Clone)]
pub struct FiniteDifferenceGradient {
    step: FiniteDifferenceStep,
    scheme: DifferenceScheme,
    evaluation: Arc<dyn Evaluation>,
}

impl FiniteDifferenceGradient {
    /// Create a gradient with an explicit scheme.
    ///
    /// # Errors
    ///
    /// Returns a [`DiffError`] if `step` is not valid for the evaluation's
    /// input dimension.
    pub fn new(
        step: FiniteDifferenceStep,
        scheme: DifferenceScheme,
        evaluation: Arc<dyn Evaluation>,
    ) -> Result<Self, DiffError> {
        step.validate(evaluation.input_dimension())?;
        Ok(Self {
            step,
            scheme,
            evaluation,
        })
    }

    /// Forward-difference gradient.
    pub fn non_centered(
        step: FiniteDifferenceStep,
        evaluation: Arc<dyn Evaluation>,
    ) -> Result<Self, DiffError> {
        Self::new(step, DifferenceScheme::NonCentered, evaluation)
    }

    /// Forward-difference gradient with a single scalar step.
    pub fn non_centered_uniform(
        epsilon: f64,
        evaluation: Arc<dyn Evaluation>,
    ) -> Result<Self, DiffError> {
        Self::non_centered(FiniteDifferenceStep::Uniform(epsilon), evaluation)
    }

    /// Centred-difference gradient.
    pub fn centered(
        step: FiniteDifferenceStep,
        evaluation: Arc<dyn Evaluation>,
    ) -> Result<Self, DiffError> {
        Self::new(step, DifferenceScheme::Centered, evaluation)
    }

    /// Step policy.
    pub fn step(&self) -> &FiniteDifferenceStep {
        &self.step
    }

    /// Difference scheme.
    pub fn scheme(&self) -> DifferenceScheme {
        self.scheme
    }

    /// Evaluation being differentiated.
    pub fn evaluation(&self) -> &Arc<dyn Evaluation> {
        &self.evaluation
    }

    /// Number of evaluations issued by one call to [`gradient`](Self::gradient).
    pub fn evaluation_count(&self) -> usize {
        self.scheme
            .evaluation_count(self.evaluation.input_dimension())
    }

    /// Transposed Jacobian at `x` (`n × m`).
    ///
    /// # Errors
    ///
    /// - `EvaluationError::DimensionMismatch` if `x` or an evaluation result
    ///   has the wrong length
    /// - `EvaluationError::StepUnderflow` if a step is absorbed by the
    ///   magnitude of its coordinate
    /// - Any error returned by the evaluation, unchanged
    pub fn gradient(&self, x: &Point) -> Result<Matrix, EvaluationError> {
        let n = self.evaluation.input_dimension();
        let m = self.evaluation.output_dimension();
        if x.len() != n {
            return Err(EvaluationError::dimension_mismatch(n, x.len()));
        }

        let epsilon = self.step.epsilon(x);
        let mut gradient = Matrix::zeros(n, m);

        match self.scheme {
            DifferenceScheme::NonCentered => {
                let base = self.evaluation.evaluate_checked(x)?;
                let mut shifted = x.clone();
                for i in 0..n {
                    shifted[i] = x[i] + epsilon[i];
                    let h = realised_step(i, x[i], shifted[i] - x[i])?;
                    let value = self.evaluation.evaluate_checked(&shifted)?;
                    shifted[i] = x[i];
                    for j in 0..m {
                        gradient[(i, j)] = (value[j] - base[j]) / h;
                    }
                }
            }
            DifferenceScheme::Centered => {
                let mut shifted = x.clone();
                for i in 0..n {
                    let (upper, lower) = (x[i] + epsilon[i], x[i] - epsilon[i]);
                    let h = realised_step(i, x[i], upper - lower)?;
                    shifted[i] = upper;
                    let up = self.evaluation.evaluate_checked(&shifted)?;
                    shifted[i] = lower;
                    let down = self.evaluation.evaluate_checked(&shifted)?;
                    shifted[i] = x[i];
                    for j in 0..m {
                        gradient[(i, j)] = (up[j] - down[j]) / h;
                    }
                }
            }
        }

        Ok(gradient)
    }

    /// Conventional Jacobian at `x` (`m × n`), the transpose of
    /// [`gradient`](Self::gradient).
    pub fn jacobian(&self, x: &Point) -> Result<Matrix, EvaluationError> {
        self.gradient(x).map(|g| g.transpose())
    }
}

/// Divide by the step that survived rounding, never the requested one.
fn realised_step(index: usize, value: f64, h: f64) -> Result<f64, EvaluationError> {
    if h == 0.0 {
        return Err(EvaluationError::StepUnderflow { index, value });
    }
    Ok(h)
}

impl fmt::Debug for FiniteDifferenceGradient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiniteDifferenceGradient")
            .field("step", &self.step)
            .field("scheme", &self.scheme)
            .field("input_dimension", &self.evaluation.input_dimension())
            .field("output_dimension", &self.evaluation.output_dimension())
            .finish()
    }
}

/// Forward-difference gradient with the scheme fixed at construction.
///
/// Thin wrapper over [`FiniteDifferenceGradient`] for callers that must not
/// be able to switch to the centred formula.
#[derive(Debug, Clone)]
pub struct NonCenteredFiniteDifferenceGradient(FiniteDifferenceGradient);

impl NonCenteredFiniteDifferenceGradient {
    /// Create a forward-difference gradient.
    pub fn new(
        step: FiniteDifferenceStep,
        evaluation: Arc<dyn Evaluation>,
    ) -> Result<Self, DiffError> {
        FiniteDifferenceGradient::non_centered(step, evaluation).map(Self)
    }

    /// Transposed Jacobian at `x` (`n × m`).
    pub fn gradient(&self, x: &Point) -> Result<Matrix, EvaluationError> {
        self.0.gradient(x)
    }

    /// Conventional Jacobian at `x` (`m × n`).
    pub fn jacobian(&self, x: &Point) -> Result<Matrix, EvaluationError> {
        self.0.jacobian(x)
    }

    /// Step policy.
    pub fn step(&self) -> &FiniteDifferenceStep {
        self.0.step()
    }

    /// Always `n + 1`.
    pub fn evaluation_count(&self) -> usize {
        self.0.evaluation_count()
    }
}

impl From<NonCenteredFiniteDifferenceGradient> for FiniteDifferenceGradient {
    fn from(gradient: NonCenteredFiniteDifferenceGradient) -> Self {
        gradient.0
    }
}
