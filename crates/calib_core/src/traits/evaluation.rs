//! Black-box evaluation contracts.
//!
//! This module defines the two function shapes used throughout calibration:
//! - [`Evaluation`]: `F(x) -> y`, the shape differentiated by finite differences
//! - [`ParametricModel`]: `F(θ, x) -> y`, the model being calibrated
//!
//! [`ParametricEvaluation`] bridges the two by freezing the input `x` and
//! exposing `θ ↦ F(θ, x)` as an [`Evaluation`].
//!
//! # Thread Safety
//!
//! Both traits require `Send + Sync`. Implementations are shared by `Arc`
//! between gradients and bootstrap replicas, possibly across threads, and
//! must therefore be stateless or internally synchronised. Any cache must
//! be explicitly thread-safe.

use std::fmt;
use std::sync::Arc;

use crate::types::{EvaluationError, Point};

/// Check a point against a declared dimension and for finite components.
fn check_output(point: &Point, expected: usize) -> Result<(), EvaluationError> {
    if point.len() != expected {
        return Err(EvaluationError::dimension_mismatch(expected, point.len()));
    }
    if let Some(index) = point.iter().position(|v| !v.is_finite()) {
        return Err(EvaluationError::NonFinite { index });
    }
    Ok(())
}

/// A deterministic function `F: R^n -> R^m`.
///
/// # Example
///
/// ```
/// use calib_core::traits::Evaluation;
/// use calib_core::types::{EvaluationError, Point};
///
/// struct Square;
///
/// impl Evaluation for Square {
///     fn input_dimension(&self) -> usize { 1 }
///     fn output_dimension(&self) -> usize { 1 }
///     fn evaluate(&self, x: &Point) -> Result<Point, EvaluationError> {
///         Ok(Point::from_vec(vec![x[0] * x[0]]))
///     }
/// }
///
/// let y = Square.evaluate_checked(&Point::from_vec(vec![3.0])).unwrap();
/// assert_eq!(y[0], 9.0);
/// assert!(Square.evaluate_checked(&Point::from_vec(vec![1.0, 2.0])).is_err());
/// ```
pub trait Evaluation: Send + Sync {
    /// Declared input dimension `n`.
    fn input_dimension(&self) -> usize;

    /// Declared output dimension `m`.
    fn output_dimension(&self) -> usize;

    /// Evaluate `F(x)`.
    fn evaluate(&self, x: &Point) -> Result<Point, EvaluationError>;

    /// Evaluate `F(x)` and enforce the declared dimensions and finiteness.
    ///
    /// # Errors
    ///
    /// - `EvaluationError::DimensionMismatch` for a wrong-length input or output
    /// - `EvaluationError::NonFinite` for a NaN or infinite output component
    /// - any error returned by [`Evaluation::evaluate`], unchanged
    fn evaluate_checked(&self, x: &Point) -> Result<Point, EvaluationError> {
        if x.len() != self.input_dimension() {
            return Err(EvaluationError::dimension_mismatch(
                self.input_dimension(),
                x.len(),
            ));
        }
        let y = self.evaluate(x)?;
        check_output(&y, self.output_dimension())?;
        Ok(y)
    }
}

/// A parametric model `F(θ, x) -> y`.
///
/// `θ` has [`parameter_dimension`](Self::parameter_dimension) components,
/// `x` has [`input_dimension`](Self::input_dimension) components and `y`
/// has [`output_dimension`](Self::output_dimension) components.
///
/// The model must be pure: the same `(θ, x)` always yields the same `y`.
pub trait ParametricModel: Send + Sync {
    /// Dimension of the calibrated parameter `θ`.
    fn parameter_dimension(&self) -> usize;

    /// Dimension of an input observation `x`.
    fn input_dimension(&self) -> usize;

    /// Dimension of an output observation `y`.
    fn output_dimension(&self) -> usize;

    /// Evaluate `F(θ, x)`.
    fn evaluate(&self, parameter: &Point, input: &Point) -> Result<Point, EvaluationError>;

    /// Evaluate `F(θ, x)` and enforce the declared dimensions and finiteness.
    fn evaluate_checked(&self, parameter: &Point, input: &Point) -> Result<Point, EvaluationError> {
        if parameter.len() != self.parameter_dimension() {
            return Err(EvaluationError::dimension_mismatch(
                self.parameter_dimension(),
                parameter.len(),
            ));
        }
        if input.len() != self.input_dimension() {
            return Err(EvaluationError::dimension_mismatch(
                self.input_dimension(),
                input.len(),
            ));
        }
        let y = self.evaluate(parameter, input)?;
        check_output(&y, self.output_dimension())?;
        Ok(y)
    }
}

impl<M: ParametricModel + ?Sized> ParametricModel for Arc<M> {
    fn parameter_dimension(&self) -> usize {
        (**self).parameter_dimension()
    }

    fn input_dimension(&self) -> usize {
        (**self).input_dimension()
    }

    fn output_dimension(&self) -> usize {
        (**self).output_dimension()
    }

    fn evaluate(&self, parameter: &Point, input: &Point) -> Result<Point, EvaluationError> {
        (**self).evaluate(parameter, input)
    }
}

/// `θ ↦ F(θ, x)` for a fixed input observation `x`.
///
/// This is the function whose Jacobian drives the 3D-VAR gradient.
#[derive(Clone)]
pub struct ParametricEvaluation {
    model: Arc<dyn ParametricModel>,
    input: Point,
}

impl ParametricEvaluation {
    /// Freeze `input` as the model's observation input.
    ///
    /// # Errors
    ///
    /// `EvaluationError::DimensionMismatch` if `input` does not match the
    /// model's input dimension.
    pub fn new(model: Arc<dyn ParametricModel>, input: Point) -> Result<Self, EvaluationError> {
        if input.len() != model.input_dimension() {
            return Err(EvaluationError::dimension_mismatch(
                model.input_dimension(),
                input.len(),
            ));
        }
        Ok(Self { model, input })
    }

    /// The frozen input observation.
    pub fn input(&self) -> &Point {
        &self.input
    }
}

impl Evaluation for ParametricEvaluation {
    fn input_dimension(&self) -> usize {
        self.model.parameter_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.model.output_dimension()
    }

    fn evaluate(&self, parameter: &Point) -> Result<Point, EvaluationError> {
        self.model.evaluate(parameter, &self.input)
    }
}

impl fmt::Debug for ParametricEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParametricEvaluation")
            .field("parameter_dimension", &self.model.parameter_dimension())
            .field("input", &self.input)
            .finish()
    }
}

/// [`Evaluation`] backed by a closure.
///
/// # Example
///
/// ```
/// use calib_core::traits::{Evaluation, FnEvaluation};
/// use calib_core::types::Point;
///
/// let f = FnEvaluation::new(2, 1, |x: &Point| Ok(Point::from_vec(vec![x[0] + x[1]])));
/// assert_eq!(f.evaluate(&Point::from_vec(vec![1.0, 2.0])).unwrap()[0], 3.0);
/// ```
pub struct FnEvaluation<F> {
    input_dimension: usize,
    output_dimension: usize,
    function: F,
}

impl<F> FnEvaluation<F>
where
    F: Fn(&Point) -> Result<Point, EvaluationError> + Send + Sync,
{
    /// Wrap `function` with its declared dimensions.
    pub fn new(input_dimension: usize, output_dimension: usize, function: F) -> Self {
        Self {
            input_dimension,
            output_dimension,
            function,
        }
    }
}

impl<F> Evaluation for FnEvaluation<F>
where
    F: Fn(&Point) -> Result<Point, EvaluationError> + Send + Sync,
{
    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn evaluate(&self, x: &Point) -> Result<Point, EvaluationError> {
        (self.function)(x)
    }
}

impl<F> fmt::Debug for FnEvaluation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEvaluation")
            .field("input_dimension", &self.input_dimension)
            .field("output_dimension", &self.output_dimension)
            .finish()
    }
}

/// [`ParametricModel`] backed by a closure `(θ, x) -> y`.
///
/// # Example
///
/// ```
/// use calib_core::traits::{FnModel, ParametricModel};
/// use calib_core::types::Point;
///
/// // y = θ0 + θ1 * x
/// let line = FnModel::new(2, 1, 1, |theta: &Point, x: &Point| {
///     Ok(Point::from_vec(vec![theta[0] + theta[1] * x[0]]))
/// });
/// let y = line.evaluate(&Point::from_vec(vec![1.0, 2.0]), &Point::from_vec(vec![3.0])).unwrap();
/// assert_eq!(y[0], 7.0);
/// ```
pub struct FnModel<F> {
    parameter_dimension: usize,
    input_dimension: usize,
    output_dimension: usize,
    function: F,
}

impl<F> FnModel<F>
where
    F: Fn(&Point, &Point) -> Result<Point, EvaluationError> + Send + Sync,
{
    /// Wrap `function` with its declared dimensions.
    pub fn new(
        parameter_dimension: usize,
        input_dimension: usize,
        output_dimension: usize,
        function: F,
    ) -> Self {
        Self {
            parameter_dimension,
            input_dimension,
            output_dimension,
            function,
        }
    }
}

impl<F> ParametricModel for FnModel<F>
where
    F: Fn(&Point, &Point) -> Result<Point, EvaluationError> + Send + Sync,
{
    fn parameter_dimension(&self) -> usize {
        self.parameter_dimension
    }

    fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    fn output_dimension(&self) -> usize {
        self.output_dimension
    }

    fn evaluate(&self, parameter: &Point, input: &Point) -> Result<Point, EvaluationError> {
        (self.function)(parameter, input)
    }
}

impl<F> fmt::Debug for FnModel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModel")
            .field("parameter_dimension", &self.parameter_dimension)
            .field("input_dimension", &self.input_dimension)
            .field("output_dimension", &self.output_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affine_model() -> Arc<dyn ParametricModel> {
        // y = [θ0 + θ1 x, θ1]
        Arc::new(FnModel::new(2, 1, 2, |t: &Point, x: &Point| {
            Ok(Point::from_vec(vec![t[0] + t[1] * x[0], t[1]]))
        }))
    }

    #[test]
    fn test_evaluate_checked_input_dimension() {
        let f = FnEvaluation::new(2, 1, |x: &Point| Ok(Point::from_vec(vec![x[0]])));
        let err = f.evaluate_checked(&Point::from_vec(vec![1.0])).unwrap_err();
        assert_eq!(err, EvaluationError::dimension_mismatch(2, 1));
    }

    #[test]
    fn test_evaluate_checked_output_dimension() {
        let f = FnEvaluation::new(1, 2, |x: &Point| Ok(Point::from_vec(vec![x[0]])));
        let err = f.evaluate_checked(&Point::from_vec(vec![1.0])).unwrap_err();
        assert_eq!(err, EvaluationError::dimension_mismatch(2, 1));
    }

    #[test]
    fn test_evaluate_checked_non_finite() {
        let f = FnEvaluation::new(1, 2, |x: &Point| Ok(Point::from_vec(vec![x[0], f64::NAN])));
        let err = f.evaluate_checked(&Point::from_vec(vec![1.0])).unwrap_err();
        assert_eq!(err, EvaluationError::NonFinite { index: 1 });
    }

    #[test]
    fn test_evaluate_checked_propagates_failure() {
        let f = FnEvaluation::new(1, 1, |_: &Point| Err(EvaluationError::failed("boom")));
        let err = f.evaluate_checked(&Point::from_vec(vec![1.0])).unwrap_err();
        assert_eq!(err, EvaluationError::Failed("boom".to_string()));
    }

    #[test]
    fn test_model_evaluate_checked_parameter_dimension() {
        let model = affine_model();
        let err = model
            .evaluate_checked(&Point::from_vec(vec![1.0]), &Point::from_vec(vec![1.0]))
            .unwrap_err();
        assert_eq!(err, EvaluationError::dimension_mismatch(2, 1));
    }

    #[test]
    fn test_parametric_evaluation_freezes_input() {
        let model = affine_model();
        let eval = ParametricEvaluation::new(model, Point::from_vec(vec![2.0])).unwrap();
        assert_eq!(eval.input_dimension(), 2);
        assert_eq!(eval.output_dimension(), 2);
        let y = eval.evaluate_checked(&Point::from_vec(vec![1.0, 3.0])).unwrap();
        assert_eq!(y, Point::from_vec(vec![7.0, 3.0]));
        assert_eq!(eval.input()[0], 2.0);
    }

    #[test]
    fn test_parametric_evaluation_rejects_bad_input() {
        let model = affine_model();
        let err = ParametricEvaluation::new(model, Point::from_vec(vec![1.0, 2.0])).unwrap_err();
        assert_eq!(err, EvaluationError::dimension_mismatch(1, 2));
    }

    #[test]
    fn test_debug_impls() {
        let f = FnEvaluation::new(3, 1, |x: &Point| Ok(Point::from_vec(vec![x.sum()])));
        assert!(format!("{:?}", f).contains("input_dimension: 3"));
        let eval = ParametricEvaluation::new(affine_model(), Point::from_vec(vec![0.0])).unwrap();
        assert!(format!("{:?}", eval).contains("ParametricEvaluation"));
    }
}
