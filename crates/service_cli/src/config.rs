//! Problem file loading.
//!
//! A problem file is TOML describing one 3D-VAR calibration:
//!
//! ```toml
//! candidate = [1.0, -0.1]
//!
//! [model]
//! family = "exponential"
//!
//! [observations]
//! inputs_csv = "inputs.csv"     # or: inputs = [[0.0], [1.0]]
//! outputs_csv = "outputs.csv"   #     outputs = [[2.0], [1.5]]
//!
//! [parameter_covariance]
//! diagonal = [1.0, 1.0]         # or: matrix = [[1.0, 0.0], [0.0, 1.0]]
//!
//! [error_covariance]
//! diagonal = [1e-4]
//!
//! [algorithm]
//! kind = "levenberg_marquardt"
//!
//! [calibration]
//! bootstrap_size = 100
//! seed = 42
//! failure_policy = "skip"
//! ```
//!
//! Relative CSV paths resolve against the problem file's directory.
//! `CALIB_BOOTSTRAP_SIZE` and `CALIB_SEED` override the `[calibration]`
//! values.

use std::path::{Path, PathBuf};

use calib_core::types::{CovarianceMatrix, Matrix, Point, Sample};
use calib_optimiser::calibration::{ThreeDVar, ThreeDVarConfig};
use calib_optimiser::solvers::Solver;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::ModelSpec;
use crate::{CliError, Result};

/// Environment variable overriding the bootstrap size.
pub const ENV_BOOTSTRAP_SIZE: &str = "CALIB_BOOTSTRAP_SIZE";

/// Environment variable overriding the bootstrap seed.
pub const ENV_SEED: &str = "CALIB_SEED";

/// Observation pairs, inline or from CSV files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ObservationSpec {
    /// Rows given in the problem file.
    Inline {
        /// Input rows
        inputs: Vec<Vec<f64>>,
        /// Output rows
        outputs: Vec<Vec<f64>>,
    },
    /// Headerless CSV files, one observation per line.
    Csv {
        /// Input file
        inputs_csv: PathBuf,
        /// Output file
        outputs_csv: PathBuf,
    },
}

/// Covariance given by its diagonal or in full.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CovarianceSpec {
    /// Independent components.
    Diagonal {
        /// Variances
        diagonal: Vec<f64>,
    },
    /// Full symmetric matrix, row by row.
    Full {
        /// Rows
        matrix: Vec<Vec<f64>>,
    },
}

impl CovarianceSpec {
    /// Build the covariance matrix.
    pub fn build(&self) -> Result<CovarianceMatrix> {
        match self {
            Self::Diagonal { diagonal } => Ok(CovarianceMatrix::from_diagonal(diagonal)?),
            Self::Full { matrix } => {
                let sample = Sample::from_rows(matrix)?;
                Ok(CovarianceMatrix::new(sample.into_matrix())?)
            }
        }
    }

    fn dimension(&self) -> usize {
        match self {
            Self::Diagonal { diagonal } => diagonal.len(),
            Self::Full { matrix } => matrix.len(),
        }
    }
}

/// Parsed problem file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemFile {
    /// Background parameter θᵇ
    pub candidate: Vec<f64>,

    /// Model family
    pub model: ModelSpec,

    /// Observation pairs
    pub observations: ObservationSpec,

    /// Background covariance Cᵇ
    pub parameter_covariance: CovarianceSpec,

    /// Observation error covariance Cᵒ
    pub error_covariance: CovarianceSpec,

    /// Optimisation strategy
    #[serde(default)]
    pub algorithm: Solver,

    /// Bootstrap and gradient settings
    #[serde(default)]
    pub calibration: ThreeDVarConfig,

    /// Directory relative CSV paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ProblemFile {
    /// Parse a problem from TOML text; `origin` names the source in errors.
    pub fn parse(content: &str, origin: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut problem: Self =
            toml::from_str(content).map_err(|e| CliError::parse(origin, e.to_string()))?;
        problem.base_dir = base_dir.into();
        Ok(problem)
    }

    /// Load a problem from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let problem = Self::parse(&content, &path.display().to_string(), base_dir)?;
        debug!(path = %path.display(), family = problem.model.family(), "loaded problem file");
        Ok(problem)
    }

    /// Apply environment variable overrides
    pub fn with_env_override(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_BOOTSTRAP_SIZE) {
            match value.trim().parse() {
                Ok(size) => self.calibration.bootstrap_size = size,
                Err(_) => warn!(variable = ENV_BOOTSTRAP_SIZE, %value, "ignoring invalid override"),
            }
        }
        if let Some(value) = lookup(ENV_SEED) {
            match value.trim().parse() {
                Ok(seed) => self.calibration.seed = seed,
                Err(_) => warn!(variable = ENV_SEED, %value, "ignoring invalid override"),
            }
        }
        self
    }

    /// Validate the problem without touching observation files
    pub fn validate(&self) -> Result<()> {
        let mut errors = self.model.problems();

        if self.candidate.is_empty() {
            errors.push("candidate cannot be empty".to_string());
        }
        if self.candidate.iter().any(|v| !v.is_finite()) {
            errors.push("candidate has non-finite entries".to_string());
        }
        if self.parameter_covariance.dimension() != self.candidate.len() {
            errors.push(format!(
                "parameter_covariance has dimension {}, candidate has {}",
                self.parameter_covariance.dimension(),
                self.candidate.len()
            ));
        }
        if self.calibration.bootstrap_size == 1 {
            errors.push("bootstrap_size must be 0 or at least 2".to_string());
        }
        if let ObservationSpec::Inline { inputs, outputs } = &self.observations {
            if inputs.len() != outputs.len() {
                errors.push(format!(
                    "{} input rows but {} output rows",
                    inputs.len(),
                    outputs.len()
                ));
            }
            if inputs.is_empty() {
                errors.push("observations cannot be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CliError::Validation(errors))
        }
    }

    /// Load from file with environment overrides and validate
    pub fn load_with_env_and_validate(path: &Path) -> Result<Self> {
        let problem = Self::load(path)?.with_env_override();
        problem.validate()?;
        Ok(problem)
    }

    /// Read the observation samples.
    pub fn observations(&self) -> Result<(Sample, Sample)> {
        match &self.observations {
            ObservationSpec::Inline { inputs, outputs } => {
                Ok((Sample::from_rows(inputs)?, Sample::from_rows(outputs)?))
            }
            ObservationSpec::Csv {
                inputs_csv,
                outputs_csv,
            } => Ok((
                read_csv(&self.base_dir.join(inputs_csv))?,
                read_csv(&self.base_dir.join(outputs_csv))?,
            )),
        }
    }

    /// Assemble the calibration described by this problem.
    pub fn build(&self) -> Result<ThreeDVar> {
        let model = self.model.build()?;
        let (inputs, outputs) = self.observations()?;
        let algo = ThreeDVar::with_algorithm(
            model,
            inputs,
            outputs,
            Point::from_vec(self.candidate.clone()),
            self.parameter_covariance.build()?,
            self.error_covariance.build()?,
            self.algorithm.clone(),
        )?
        .with_config(self.calibration.clone())?;
        Ok(algo)
    }
}

/// Read a headerless numeric CSV file into a sample, one row per line.
///
/// Lines starting with `#` are comments.
pub fn read_csv(path: &Path) -> Result<Sample> {
    if !path.exists() {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let row = record
            .iter()
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    CliError::data(format!(
                        "{}: record {}: '{}' is not a number",
                        path.display(),
                        line + 1,
                        field
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(CliError::data(format!("{}: no observations", path.display())));
    }
    let columns = rows[0].len();
    Ok(Sample::new(Matrix::from_fn(rows.len(), columns, |i, j| {
        rows[i][j]
    })))
}
