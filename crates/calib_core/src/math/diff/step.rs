//! Finite-difference step policies.

use crate::types::{DiffError, Point};

/// Default step for non-centred (forward) differences.
pub const DEFAULT_NON_CENTERED_EPSILON: f64 = 1e-7;

/// Default step for centred differences.
pub const DEFAULT_CENTERED_EPSILON: f64 = 1e-5;

/// Policy returning the perturbation applied to each coordinate.
///
/// # Variants
///
/// - `Uniform`: one `ε` broadcast to every coordinate
/// - `PerDimension`: an explicit `ε_i` per coordinate
/// - `Blended`: `ε_i · max(|x_i|, η)`, absolute near zero and relative for
///   large coordinates
///
/// # Examples
///
/// ```
/// use calib_core::math::diff::FiniteDifferenceStep;
/// use calib_core::types::Point;
///
/// let x = Point::from_vec(vec![0.0, 200.0]);
///
/// let uniform = FiniteDifferenceStep::Uniform(1e-4);
/// assert_eq!(uniform.epsilon(&x), Point::from_vec(vec![1e-4, 1e-4]));
///
/// let blended = FiniteDifferenceStep::Blended { epsilon: vec![1e-4, 1e-4], eta: 1.0 };
/// let eps = blended.epsilon(&x);
/// assert_eq!(eps[0], 1e-4);
/// assert!((eps[1] - 2e-2).abs() < 1e-15);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FiniteDifferenceStep {
    /// Same step for every coordinate.
    Uniform(f64),
    /// One step per coordinate.
    PerDimension(Vec<f64>),
    /// Step scaled by the coordinate magnitude, floored at `eta`.
    Blended {
        /// Base step per coordinate
        epsilon: Vec<f64>,
        /// Magnitude floor
        eta: f64,
    },
}

impl Default for FiniteDifferenceStep {
    fn default() -> Self {
        Self::Uniform(DEFAULT_NON_CENTERED_EPSILON)
    }
}

impl FiniteDifferenceStep {
    /// Per-dimension step from a point.
    pub fn from_point(epsilon: &Point) -> Self {
        Self::PerDimension(epsilon.iter().copied().collect())
    }

    /// Check the policy against an input dimension.
    ///
    /// # Errors
    ///
    /// - `DiffError::DimensionMismatch` if an explicit step length differs
    ///   from `dimension`
    /// - `DiffError::InvalidStep` if a step is zero, negative or non-finite
    /// - `DiffError::InvalidEta` if the blended floor is invalid
    pub fn validate(&self, dimension: usize) -> Result<(), DiffError> {
        match self {
            Self::Uniform(epsilon) => check_positive(0, *epsilon),
            Self::PerDimension(epsilon) => check_vector(epsilon, dimension),
            Self::Blended { epsilon, eta } => {
                check_vector(epsilon, dimension)?;
                if !(eta.is_finite() && *eta > 0.0) {
                    return Err(DiffError::InvalidEta(*eta));
                }
                Ok(())
            }
        }
    }

    /// Deviation to apply to each coordinate of `point`.
    ///
    /// The policy is assumed valid for `point.len()`; see
    /// [`validate`](Self::validate).
    pub fn epsilon(&self, point: &Point) -> Point {
        match self {
            Self::Uniform(epsilon) => Point::from_element(point.len(), *epsilon),
            Self::PerDimension(epsilon) => Point::from_vec(epsilon.clone()),
            Self::Blended { epsilon, eta } => {
                Point::from_fn(point.len(), |i, _| epsilon[i] * point[i].abs().max(*eta))
            }
        }
    }
}

fn check_positive(index: usize, value: f64) -> Result<(), DiffError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DiffError::InvalidStep { index, value })
    }
}

fn check_vector(epsilon: &[f64], dimension: usize) -> Result<(), DiffError> {
    if epsilon.len() != dimension {
        return Err(DiffError::DimensionMismatch {
            expected: dimension,
            got: epsilon.len(),
        });
    }
    epsilon
        .iter()
        .enumerate()
        .try_for_each(|(i, &e)| check_positive(i, e))
}
