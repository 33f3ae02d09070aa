//! 3D-VAR calibration.
//!
//! ## Components
//!
//! - [`ThreeDVar`]: cost assembly, injected optimiser, bootstrap posterior
//! - [`ThreeDVarConfig`]: bootstrap size, seed, failure policy and gradient step
//! - [`CalibrationResult`]: MAP estimate, posterior summary and diagnostics
//! - [`bootstrap_indices`]: reproducible resampling of observation rows
//! - `ThreeDVarState` (feature `serde`): versioned persistence
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use calib_core::traits::{FnModel, ParametricModel};
//! use calib_core::types::{CovarianceMatrix, Point, Sample};
//! use calib_optimiser::calibration::{PosteriorKind, ThreeDVar, ThreeDVarConfig};
//!
//! // y = a·x with prior a ~ N(1, 1) and noise variance 0.01
//! let model: Arc<dyn ParametricModel> = Arc::new(FnModel::new(1, 1, 1, |t: &Point, x: &Point| {
//!     Ok(Point::from_vec(vec![t[0] * x[0]]))
//! }));
//! let xs = Sample::from_rows(&[vec![1.0], vec![2.0], vec![3.0], vec![4.0]]).unwrap();
//! let ys = Sample::from_rows(&[vec![2.1], vec![3.9], vec![6.0], vec![8.1]]).unwrap();
//!
//! let mut algo = ThreeDVar::new(
//!     model,
//!     xs,
//!     ys,
//!     Point::from_vec(vec![1.0]),
//!     CovarianceMatrix::identity(1),
//!     CovarianceMatrix::from_diagonal(&[0.01]).unwrap(),
//! )
//! .unwrap()
//! .with_config(ThreeDVarConfig::default().with_bootstrap_size(50).with_seed(42))
//! .unwrap();
//!
//! let result = algo.run().unwrap();
//! assert_eq!(result.posterior.kind, PosteriorKind::Bootstrap);
//! assert!((result.parameter[0] - 2.0).abs() < 0.05);
//! assert_eq!(result.replicas.as_ref().unwrap().size(), 50);
//! ```

mod bootstrap;
mod error;
#[cfg(feature = "serde")]
mod persistence;
mod result;
mod three_d_var;

pub use bootstrap::{bootstrap_indices, replica_seed, resample_pair};
pub use error::{CalibrationError, CovarianceRole};
#[cfg(feature = "serde")]
pub use persistence::{ThreeDVarState, STATE_VERSION};
pub use result::{CalibrationDiagnostics, CalibrationResult, PosteriorEstimate, PosteriorKind};
pub use three_d_var::{BootstrapFailurePolicy, ThreeDVar, ThreeDVarConfig};
