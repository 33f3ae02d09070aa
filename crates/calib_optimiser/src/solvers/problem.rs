//! Nonlinear least-squares problem description.

use std::fmt;

use calib_core::types::{EvaluationError, Matrix, Point};

/// Residual function `θ ↦ r(θ)`.
pub type ResidualFn<'a> = dyn Fn(&Point) -> Result<Point, EvaluationError> + 'a;

/// Residual Jacobian `θ ↦ ∂r/∂θ` (`m × n`).
pub type JacobianFn<'a> = dyn Fn(&Point) -> Result<Matrix, EvaluationError> + 'a;

/// Relative step of the internal forward difference used when no Jacobian is supplied.
const FALLBACK_STEP: f64 = 1e-8;

/// Problem `min_θ ||r(θ)||²`.
///
/// The cost is `J(θ) = r(θ)ᵀ r(θ)` and its gradient `∇J = 2 Jrᵀ r`. When no
/// Jacobian is attached, [`jacobian`](Self::jacobian) falls back to a forward
/// difference with step `1e-8 · max(|θ_j|, 1)`.
///
/// # Example
///
/// ```
/// use calib_optimiser::solvers::LeastSquaresProblem;
/// use calib_core::types::Point;
///
/// let problem = LeastSquaresProblem::new(1, |t: &Point| {
///     Ok(Point::from_vec(vec![t[0] - 3.0, 2.0 * t[0]]))
/// });
///
/// let theta = Point::from_vec(vec![1.0]);
/// assert_eq!(problem.cost(&theta).unwrap(), 8.0);
/// let g = problem.cost_gradient(&theta).unwrap();
/// assert!((g[0] - 4.0).abs() < 1e-5);
/// ```
pub struct LeastSquaresProblem<'a> {
    dimension: usize,
    residual: Box<ResidualFn<'a>>,
    jacobian: Option<Box<JacobianFn<'a>>>,
}

impl<'a> LeastSquaresProblem<'a> {
    /// Create a problem over `dimension` parameters.
    pub fn new<R>(dimension: usize, residual: R) -> Self
    where
        R: Fn(&Point) -> Result<Point, EvaluationError> + 'a,
    {
        Self {
            dimension,
            residual: Box::new(residual),
            jacobian: None,
        }
    }

    /// Attach an analytic or externally computed residual Jacobian.
    pub fn with_jacobian<J>(mut self, jacobian: J) -> Self
    where
        J: Fn(&Point) -> Result<Matrix, EvaluationError> + 'a,
    {
        self.jacobian = Some(Box::new(jacobian));
        self
    }

    /// Number of parameters.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether a Jacobian was attached.
    pub fn has_jacobian(&self) -> bool {
        self.jacobian.is_some()
    }

    /// Residual vector at `theta`.
    pub fn residual(&self, theta: &Point) -> Result<Point, EvaluationError> {
        if theta.len() != self.dimension {
            return Err(EvaluationError::dimension_mismatch(self.dimension, theta.len()));
        }
        (self.residual)(theta)
    }

    /// Residual Jacobian at `theta` (`m × n`).
    pub fn jacobian(&self, theta: &Point) -> Result<Matrix, EvaluationError> {
        match &self.jacobian {
            Some(jacobian) => jacobian(theta),
            None => {
                let r0 = self.residual(theta)?;
                self.forward_jacobian(theta, &r0)
            }
        }
    }

    /// Residual Jacobian when the residual at `theta` is already known.
    pub(crate) fn jacobian_at(&self, theta: &Point, r0: &Point) -> Result<Matrix, EvaluationError> {
        match &self.jacobian {
            Some(jacobian) => jacobian(theta),
            None => self.forward_jacobian(theta, r0),
        }
    }

    /// Cost `r(θ)ᵀ r(θ)`.
    pub fn cost(&self, theta: &Point) -> Result<f64, EvaluationError> {
        self.residual(theta).map(|r| r.norm_squared())
    }

    /// Cost gradient `2 Jrᵀ r`.
    pub fn cost_gradient(&self, theta: &Point) -> Result<Point, EvaluationError> {
        let r = self.residual(theta)?;
        let jacobian = self.jacobian_at(theta, &r)?;
        Ok(2.0 * jacobian.tr_mul(&r))
    }

    fn forward_jacobian(&self, theta: &Point, r0: &Point) -> Result<Matrix, EvaluationError> {
        let mut jacobian = Matrix::zeros(r0.len(), self.dimension);
        let mut shifted = theta.clone();
        for j in 0..self.dimension {
            let h = FALLBACK_STEP * theta[j].abs().max(1.0);
            shifted[j] = theta[j] + h;
            let r_plus = self.residual(&shifted)?;
            shifted[j] = theta[j];
            if r_plus.len() != r0.len() {
                return Err(EvaluationError::dimension_mismatch(r0.len(), r_plus.len()));
            }
            jacobian.set_column(j, &((r_plus - r0) / h));
        }
        Ok(jacobian)
    }
}

impl fmt::Debug for LeastSquaresProblem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeastSquaresProblem")
            .field("dimension", &self.dimension)
            .field("has_jacobian", &self.has_jacobian())
            .finish()
    }
}
