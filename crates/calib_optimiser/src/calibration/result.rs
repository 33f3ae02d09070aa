//! Calibration result types.
//!
//! A 3D-VAR run produces the MAP estimate `θ̂` from the full observation
//! set, a Gaussian posterior summary and optimiser diagnostics.

use std::time::Duration;

use calib_core::types::{CovarianceMatrix, Point, Sample};

/// How the posterior covariance was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PosteriorKind {
    /// Sample mean and covariance of bootstrap replicas.
    Bootstrap,
    /// Gaussian approximation `(AᵀA)⁻¹` around `θ̂` from the whitened
    /// residual Jacobian `A`.
    Linearised,
}

/// Gaussian summary of the parameter posterior.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PosteriorEstimate {
    /// Posterior mean.
    pub mean: Point,
    /// Posterior covariance.
    pub covariance: CovarianceMatrix,
    /// Estimation method.
    pub kind: PosteriorKind,
}

impl PosteriorEstimate {
    /// Marginal standard deviations.
    pub fn standard_deviations(&self) -> Point {
        self.covariance.as_matrix().diagonal().map(|v| v.max(0.0).sqrt())
    }
}

/// Calibration diagnostics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationDiagnostics {
    /// Optimiser identifier
    pub algorithm: String,
    /// Iterations of the full-data minimisation
    pub iterations: usize,
    /// Whether the full-data minimisation converged
    pub converged: bool,
    /// Bootstrap replicas dropped under the skip policy
    pub skipped_replicas: usize,
    /// Bootstrap replicas that did not converge
    pub unconverged_replicas: usize,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Result of a 3D-VAR calibration run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationResult {
    /// MAP estimate from the full observation set.
    pub parameter: Point,
    /// Whitened cost `J(θ̂)`.
    pub cost: f64,
    /// Posterior mean and covariance.
    pub posterior: PosteriorEstimate,
    /// Bootstrap replica estimates, one row per successful replica.
    pub replicas: Option<Sample>,
    /// Run diagnostics.
    pub diagnostics: CalibrationDiagnostics,
}

impl CalibrationResult {
    /// Posterior mean.
    pub fn mean(&self) -> &Point {
        &self.posterior.mean
    }

    /// Posterior covariance.
    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.posterior.covariance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_core::types::Matrix;

    #[test]
    fn test_standard_deviations() {
        let posterior = PosteriorEstimate {
            mean: Point::zeros(2),
            covariance: CovarianceMatrix::new(Matrix::from_row_slice(2, 2, &[4.0, 0.5, 0.5, 9.0]))
                .unwrap(),
            kind: PosteriorKind::Linearised,
        };
        let sd = posterior.standard_deviations();
        assert_eq!(sd[0], 2.0);
        assert_eq!(sd[1], 3.0);
    }
}
