//! Covariance matrices and their triangular whitening factors.
//!
//! Calibration never inverts a covariance matrix directly. Instead the
//! lower Cholesky factor `C = L·Lᵀ` is computed once and its inverse `L⁻¹`
//! is applied to residuals, so that `‖L⁻¹·r‖² = rᵀ·C⁻¹·r`.

use super::error::LinalgError;
use super::{Matrix, Point};

/// Relative tolerance used by the symmetry check.
const SYMMETRY_TOLERANCE: f64 = 1e-10;

/// Symmetric, finite, square matrix.
///
/// Positive-definiteness is not checked on construction; it is reported by
/// [`CovarianceMatrix::cholesky`] and [`CovarianceMatrix::inverse_cholesky`].
///
/// # Examples
///
/// ```
/// use calib_core::types::{CovarianceMatrix, Matrix, Point};
///
/// let cov = CovarianceMatrix::new(Matrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0])).unwrap();
/// let whitening = cov.inverse_cholesky().unwrap();
///
/// // |L^-1 r|^2 == r^T C^-1 r
/// let r = Point::from_vec(vec![1.0, -1.0]);
/// let w = whitening.apply(&r);
/// let expected = r.dot(&(cov.as_matrix().clone().try_inverse().unwrap() * &r));
/// assert!((w.norm_squared() - expected).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Matrix", into = "Matrix")
)]
pub struct CovarianceMatrix(Matrix);

impl CovarianceMatrix {
    /// Validate and wrap a covariance matrix.
    ///
    /// # Errors
    ///
    /// - `LinalgError::NotSquare` if the matrix is rectangular
    /// - `LinalgError::NonFinite` if an entry is NaN or infinite
    /// - `LinalgError::NotSymmetric` if `|a_ij - a_ji|` exceeds the tolerance
    pub fn new(matrix: Matrix) -> Result<Self, LinalgError> {
        let (rows, cols) = matrix.shape();
        if rows != cols {
            return Err(LinalgError::NotSquare { rows, cols });
        }
        let mut scale = 1.0_f64;
        for j in 0..cols {
            for i in 0..rows {
                let v = matrix[(i, j)];
                if !v.is_finite() {
                    return Err(LinalgError::NonFinite { row: i, col: j });
                }
                scale = scale.max(v.abs());
            }
        }
        for i in 0..rows {
            for j in (i + 1)..cols {
                if (matrix[(i, j)] - matrix[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(LinalgError::NotSymmetric { row: i, col: j });
                }
            }
        }
        Ok(Self(matrix))
    }

    /// Identity covariance of the given dimension.
    pub fn identity(dimension: usize) -> Self {
        Self(Matrix::identity(dimension, dimension))
    }

    /// Diagonal covariance from variances.
    pub fn from_diagonal(variances: &[f64]) -> Result<Self, LinalgError> {
        Self::new(Matrix::from_diagonal(&Point::from_vec(variances.to_vec())))
    }

    /// Side length.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.0.nrows()
    }

    /// Underlying matrix.
    #[inline]
    pub fn as_matrix(&self) -> &Matrix {
        &self.0
    }

    /// Consume and return the underlying matrix.
    pub fn into_matrix(self) -> Matrix {
        self.0
    }

    /// Lower Cholesky factor `L` with `C = L·Lᵀ`.
    ///
    /// # Errors
    ///
    /// `LinalgError::NotPositiveDefinite` when the factorisation fails.
    pub fn cholesky(&self) -> Result<TriangularMatrix, LinalgError> {
        let factor = self
            .0
            .clone()
            .cholesky()
            .ok_or(LinalgError::NotPositiveDefinite)?;
        Ok(TriangularMatrix(factor.l()))
    }

    /// Inverse of the lower Cholesky factor, `L⁻¹`.
    ///
    /// This is the whitening operator: `L⁻¹·r` has identity covariance when
    /// `r` has covariance `C`.
    ///
    /// # Errors
    ///
    /// `LinalgError::NotPositiveDefinite` when the factorisation fails.
    pub fn inverse_cholesky(&self) -> Result<TriangularMatrix, LinalgError> {
        let l = self.cholesky()?;
        let n = self.dimension();
        let inverse = l
            .0
            .solve_lower_triangular(&Matrix::identity(n, n))
            .ok_or(LinalgError::NotPositiveDefinite)?;
        Ok(TriangularMatrix(inverse))
    }
}

impl TryFrom<Matrix> for CovarianceMatrix {
    type Error = LinalgError;

    fn try_from(matrix: Matrix) -> Result<Self, Self::Error> {
        Self::new(matrix)
    }
}

impl From<CovarianceMatrix> for Matrix {
    fn from(cov: CovarianceMatrix) -> Self {
        cov.0
    }
}

/// Square lower-triangular matrix.
///
/// In calibration this holds an inverse Cholesky factor `L⁻¹` and is used
/// to whiten residual vectors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Matrix", into = "Matrix")
)]
pub struct TriangularMatrix(Matrix);

impl TriangularMatrix {
    /// Validate and wrap a lower-triangular matrix.
    ///
    /// # Errors
    ///
    /// - `LinalgError::NotSquare` if the matrix is rectangular
    /// - `LinalgError::NonFinite` if an entry is NaN or infinite
    /// - `LinalgError::NotLowerTriangular` if an entry above the diagonal is non-zero
    pub fn new(matrix: Matrix) -> Result<Self, LinalgError> {
        let (rows, cols) = matrix.shape();
        if rows != cols {
            return Err(LinalgError::NotSquare { rows, cols });
        }
        for j in 0..cols {
            for i in 0..rows {
                let v = matrix[(i, j)];
                if !v.is_finite() {
                    return Err(LinalgError::NonFinite { row: i, col: j });
                }
                if j > i && v != 0.0 {
                    return Err(LinalgError::NotLowerTriangular { row: i, col: j });
                }
            }
        }
        Ok(Self(matrix))
    }

    /// Side length.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.0.nrows()
    }

    /// Underlying matrix.
    #[inline]
    pub fn as_matrix(&self) -> &Matrix {
        &self.0
    }

    /// Multiply a vector: `L·v`.
    ///
    /// # Panics
    ///
    /// Panics if `v.len() != self.dimension()`.
    #[inline]
    pub fn apply(&self, v: &Point) -> Point {
        &self.0 * v
    }

    /// Multiply a matrix: `L·M`.
    ///
    /// # Panics
    ///
    /// Panics if `m.nrows() != self.dimension()`.
    #[inline]
    pub fn apply_matrix(&self, m: &Matrix) -> Matrix {
        &self.0 * m
    }
}

impl TryFrom<Matrix> for TriangularMatrix {
    type Error = LinalgError;

    fn try_from(matrix: Matrix) -> Result<Self, Self::Error> {
        Self::new(matrix)
    }
}

impl From<TriangularMatrix> for Matrix {
    fn from(t: TriangularMatrix) -> Self {
        t.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd_2x2() -> CovarianceMatrix {
        CovarianceMatrix::new(Matrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0])).unwrap()
    }

    #[test]
    fn test_new_rejects_rectangular() {
        let err = CovarianceMatrix::new(Matrix::zeros(2, 3)).unwrap_err();
        assert_eq!(err, LinalgError::NotSquare { rows: 2, cols: 3 });
    }

    #[test]
    fn test_new_rejects_asymmetric() {
        let m = Matrix::from_row_slice(2, 2, &[1.0, 0.5, 0.4, 1.0]);
        assert_eq!(
            CovarianceMatrix::new(m).unwrap_err(),
            LinalgError::NotSymmetric { row: 0, col: 1 }
        );
    }

    #[test]
    fn test_new_rejects_nan() {
        let m = Matrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, f64::NAN]);
        assert_eq!(
            CovarianceMatrix::new(m).unwrap_err(),
            LinalgError::NonFinite { row: 1, col: 1 }
        );
    }

    #[test]
    fn test_from_diagonal() {
        let cov = CovarianceMatrix::from_diagonal(&[1.0, 4.0]).unwrap();
        assert_eq!(cov.dimension(), 2);
        assert_eq!(cov.as_matrix()[(1, 1)], 4.0);
        assert_eq!(cov.as_matrix()[(0, 1)], 0.0);
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let cov = spd_2x2();
        let l = cov.cholesky().unwrap();
        let rebuilt = l.as_matrix() * l.as_matrix().transpose();
        assert_relative_eq!(rebuilt, cov.as_matrix().clone(), epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_cholesky_whitens() {
        let cov = spd_2x2();
        let w = cov.inverse_cholesky().unwrap();
        // L^-1 C L^-T == I
        let whitened = w.as_matrix() * cov.as_matrix() * w.as_matrix().transpose();
        assert_relative_eq!(whitened, Matrix::identity(2, 2), epsilon = 1e-12);
        assert_eq!(w.as_matrix()[(0, 1)], 0.0);
    }

    #[test]
    fn test_diagonal_inverse_cholesky() {
        let cov = CovarianceMatrix::from_diagonal(&[4.0, 0.25]).unwrap();
        let w = cov.inverse_cholesky().unwrap();
        assert_relative_eq!(w.as_matrix()[(0, 0)], 0.5, epsilon = 1e-14);
        assert_relative_eq!(w.as_matrix()[(1, 1)], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn test_not_positive_definite() {
        let cov = CovarianceMatrix::new(Matrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0])).unwrap();
        assert_eq!(cov.cholesky().unwrap_err(), LinalgError::NotPositiveDefinite);
        assert_eq!(
            cov.inverse_cholesky().unwrap_err(),
            LinalgError::NotPositiveDefinite
        );
    }

    #[test]
    fn test_triangular_rejects_upper_entries() {
        let m = Matrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]);
        assert_eq!(
            TriangularMatrix::new(m).unwrap_err(),
            LinalgError::NotLowerTriangular { row: 0, col: 1 }
        );
    }

    #[test]
    fn test_triangular_apply() {
        let t = TriangularMatrix::new(Matrix::from_row_slice(2, 2, &[2.0, 0.0, 1.0, 3.0])).unwrap();
        let v = t.apply(&Point::from_vec(vec![1.0, 1.0]));
        assert_eq!(v, Point::from_vec(vec![2.0, 4.0]));
        let m = t.apply_matrix(&Matrix::identity(2, 2));
        assert_eq!(&m, t.as_matrix());
    }

    #[test]
    fn test_try_from_validates() {
        let m = Matrix::from_row_slice(2, 2, &[1.0, 0.3, 0.0, 1.0]);
        assert!(CovarianceMatrix::try_from(m).is_err());

        let back: Matrix = spd_2x2().into();
        assert_eq!(back[(0, 1)], 2.0);
    }
}
