//! Error types for the calibration CLI.

use calib_core::types::LinalgError;
use calib_optimiser::calibration::CalibrationError;
use thiserror::Error;

/// CLI error type
#[derive(Debug, Error)]
pub enum CliError {
    /// Input file does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Problem file could not be parsed
    #[error("Parse error in {path}: {message}")]
    Parse {
        /// Offending file
        path: String,
        /// Parser message
        message: String,
    },

    /// Problem file is inconsistent
    #[error("Validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Observation file error
    #[error("Observation data error: {0}")]
    Data(String),

    /// Calibration failure
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// Covariance or sample construction failure
    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    /// CSV reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Create a parse error
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an observation data error
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }
}

/// Result alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
