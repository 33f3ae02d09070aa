//! Finite-difference differentiation of black-box evaluations.
//!
//! ## Components
//!
//! - [`FiniteDifferenceStep`]: per-coordinate perturbation policy
//! - [`FiniteDifferenceGradient`]: transposed Jacobian of an
//!   [`Evaluation`](crate::traits::Evaluation), forward or centred
//! - [`NonCenteredFiniteDifferenceGradient`]: forward-only wrapper
//!
//! ## Conventions
//!
//! The gradient of `F: R^n -> R^m` is returned as an `n × m` matrix with
//! entry `(i, j) = ∂F_j/∂x_i`. Use `jacobian()` for the `m × n` layout.
//!
//! | Scheme | Evaluations | Order |
//! |--------|-------------|-------|
//! | `NonCentered` | n + 1 | 1 |
//! | `Centered` | 2n | 2 |
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use calib_core::math::diff::{FiniteDifferenceGradient, FiniteDifferenceStep};
//! use calib_core::traits::FnEvaluation;
//! use calib_core::types::Point;
//!
//! let f = FnEvaluation::new(1, 1, |x: &Point| Ok(Point::from_vec(vec![x[0].powi(3)])));
//! let gradient = FiniteDifferenceGradient::centered(
//!     FiniteDifferenceStep::Uniform(1e-5),
//!     Arc::new(f),
//! ).unwrap();
//!
//! let g = gradient.gradient(&Point::from_vec(vec![2.0])).unwrap();
//! assert!((g[(0, 0)] - 12.0).abs() < 1e-8);
//! assert_eq!(gradient.evaluation_count(), 2);
//! ```

mod gradient;
mod step;

pub use gradient::{DifferenceScheme, FiniteDifferenceGradient, NonCenteredFiniteDifferenceGradient};
pub use step::{FiniteDifferenceStep, DEFAULT_CENTERED_EPSILON, DEFAULT_NON_CENTERED_EPSILON};
