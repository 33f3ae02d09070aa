//! Observation samples.
//!
//! A [`Sample`] is a dense table of observations: one row per observation,
//! one column per variable. Input and output observation sets used in
//! calibration are both samples and are paired row by row.

use super::covariance::CovarianceMatrix;
use super::error::LinalgError;
use super::{Matrix, Point};

/// Ordered collection of points sharing a common dimension.
///
/// # Examples
///
/// ```
/// use calib_core::types::Sample;
///
/// let sample = Sample::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
/// assert_eq!(sample.size(), 3);
/// assert_eq!(sample.dimension(), 2);
/// assert_eq!(sample.row(1)[0], 3.0);
///
/// // Bootstrap-style selection: rows may repeat
/// let selected = sample.select(&[2, 2, 0]);
/// assert_eq!(selected.row(0)[1], 6.0);
/// assert_eq!(selected.row(2)[1], 2.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    data: Matrix,
}

impl Sample {
    /// Wrap a matrix whose rows are observations.
    pub fn new(data: Matrix) -> Self {
        Self { data }
    }

    /// Create a sample of `size` zero rows of the given dimension.
    pub fn zeros(size: usize, dimension: usize) -> Self {
        Self {
            data: Matrix::zeros(size, dimension),
        }
    }

    /// Build a sample from row vectors.
    ///
    /// All rows must share the length of the first row. An empty slice
    /// yields an empty, zero-dimensional sample.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, LinalgError> {
        let dimension = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != dimension) {
            return Err(LinalgError::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }
        let data = Matrix::from_fn(rows.len(), dimension, |i, j| rows[i][j]);
        Ok(Self { data })
    }

    /// Build a sample from points.
    pub fn from_points(points: &[Point]) -> Result<Self, LinalgError> {
        let dimension = points.first().map_or(0, |p| p.len());
        if let Some(bad) = points.iter().find(|p| p.len() != dimension) {
            return Err(LinalgError::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }
        let data = Matrix::from_fn(points.len(), dimension, |i, j| points[i][j]);
        Ok(Self { data })
    }

    /// Number of observations (rows).
    #[inline]
    pub fn size(&self) -> usize {
        self.data.nrows()
    }

    /// Variable dimension (columns).
    #[inline]
    pub fn dimension(&self) -> usize {
        self.data.ncols()
    }

    /// Whether the sample holds no observation.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Copy of row `index` as a point.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.size()`.
    pub fn row(&self, index: usize) -> Point {
        self.data.row(index).transpose()
    }

    /// Iterate over the rows as points.
    pub fn rows(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.size()).map(move |i| self.row(i))
    }

    /// Rows at `indices`, in order. Indices may repeat.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range.
    pub fn select(&self, indices: &[usize]) -> Sample {
        Sample {
            data: self.data.select_rows(indices.iter()),
        }
    }

    /// Component-wise mean. Zero for an empty sample.
    pub fn mean(&self) -> Point {
        if self.is_empty() {
            return Point::zeros(self.dimension());
        }
        Point::from_fn(self.dimension(), |j, _| self.data.column(j).mean())
    }

    /// Unbiased sample covariance (denominator `size - 1`).
    pub fn covariance(&self) -> Result<CovarianceMatrix, LinalgError> {
        let n = self.size();
        if n < 2 {
            return Err(LinalgError::InsufficientSample { got: n, need: 2 });
        }
        let mean = self.mean();
        let mut centred = self.data.clone();
        for j in 0..self.dimension() {
            for i in 0..n {
                centred[(i, j)] -= mean[j];
            }
        }
        let cov = centred.transpose() * &centred / (n - 1) as f64;
        // Symmetrise away round-off so validation cannot fail on it.
        CovarianceMatrix::new((&cov + cov.transpose()) * 0.5)
    }

    /// Underlying matrix (rows are observations).
    #[inline]
    pub fn as_matrix(&self) -> &Matrix {
        &self.data
    }

    /// Consume the sample, returning the underlying matrix.
    pub fn into_matrix(self) -> Matrix {
        self.data
    }
}
