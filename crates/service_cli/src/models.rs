//! Built-in model families selectable from a problem file.
//!
//! | family        | F(θ, x)                 | θ          | x | y |
//! |---------------|-------------------------|------------|---|---|
//! | `polynomial`  | Σ_k θ_k x^k             | degree + 1 | 1 | 1 |
//! | `exponential` | θ0 · exp(θ1 · x)        | 2          | 1 | 1 |
//! | `linear`      | H θ (x is a label only) | cols of H  | 1 | rows of H |

use std::sync::Arc;

use calib_core::traits::ParametricModel;
use calib_core::types::{EvaluationError, Matrix, Point};
use serde::Deserialize;

use crate::{CliError, Result};

/// Highest accepted polynomial degree.
pub const MAX_POLYNOMIAL_DEGREE: usize = 16;

/// Model family section of a problem file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Univariate polynomial with coefficients θ.
    Polynomial {
        /// Polynomial degree
        degree: usize,
    },
    /// Two-parameter exponential.
    Exponential,
    /// Linear observation operator `H`, given row by row.
    Linear {
        /// Operator rows
        matrix: Vec<Vec<f64>>,
    },
}

impl ModelSpec {
    /// Family name as written in problem files.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Polynomial { .. } => "polynomial",
            Self::Exponential => "exponential",
            Self::Linear { .. } => "linear",
        }
    }

    /// Check the family parameters, collecting every problem.
    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            Self::Polynomial { degree } if *degree > MAX_POLYNOMIAL_DEGREE => {
                errors.push(format!(
                    "polynomial degree {} exceeds maximum {}",
                    degree, MAX_POLYNOMIAL_DEGREE
                ));
            }
            Self::Linear { matrix } => {
                if matrix.is_empty() || matrix[0].is_empty() {
                    errors.push("linear model matrix cannot be empty".to_string());
                } else if matrix.iter().any(|row| row.len() != matrix[0].len()) {
                    errors.push("linear model matrix rows differ in length".to_string());
                }
                if matrix.iter().flatten().any(|v| !v.is_finite()) {
                    errors.push("linear model matrix has non-finite entries".to_string());
                }
            }
            _ => {}
        }
        errors
    }

    /// Instantiate the model.
    pub fn build(&self) -> Result<Arc<dyn ParametricModel>> {
        let errors = self.problems();
        if !errors.is_empty() {
            return Err(CliError::Validation(errors));
        }
        Ok(match self {
            Self::Polynomial { degree } => Arc::new(PolynomialModel { degree: *degree }),
            Self::Exponential => Arc::new(ExponentialModel),
            Self::Linear { matrix } => {
                let rows = matrix.len();
                let cols = matrix[0].len();
                let operator = Matrix::from_fn(rows, cols, |i, j| matrix[i][j]);
                Arc::new(LinearModel { operator })
            }
        })
    }
}

/// `F(θ, x) = Σ_k θ_k x^k`, evaluated by Horner's rule.
#[derive(Debug, Clone, Copy)]
pub struct PolynomialModel {
    degree: usize,
}

impl ParametricModel for PolynomialModel {
    fn parameter_dimension(&self) -> usize {
        self.degree + 1
    }

    fn input_dimension(&self) -> usize {
        1
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn evaluate(&self, parameter: &Point, input: &Point) -> std::result::Result<Point, EvaluationError> {
        let x = input[0];
        let y = parameter.iter().rev().fold(0.0, |acc, &c| acc * x + c);
        Ok(Point::from_vec(vec![y]))
    }
}

/// `F(θ, x) = θ0 · exp(θ1 · x)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialModel;

impl ParametricModel for ExponentialModel {
    fn parameter_dimension(&self) -> usize {
        2
    }

    fn input_dimension(&self) -> usize {
        1
    }

    fn output_dimension(&self) -> usize {
        1
    }

    fn evaluate(&self, parameter: &Point, input: &Point) -> std::result::Result<Point, EvaluationError> {
        Ok(Point::from_vec(vec![
            parameter[0] * (parameter[1] * input[0]).exp(),
        ]))
    }
}

/// `F(θ, x) = H θ`.
#[derive(Debug, Clone)]
pub struct LinearModel {
    operator: Matrix,
}

impl ParametricModel for LinearModel {
    fn parameter_dimension(&self) -> usize {
        self.operator.ncols()
    }

    fn input_dimension(&self) -> usize {
        1
    }

    fn output_dimension(&self) -> usize {
        self.operator.nrows()
    }

    fn evaluate(&self, parameter: &Point, _input: &Point) -> std::result::Result<Point, EvaluationError> {
        Ok(&self.operator * parameter)
    }
}
