//! Error types for artifact loading and inference

use std::path::PathBuf;
use thiserror::Error;

/// Failure raised by a classifier or transform while processing one vector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("shape mismatch: expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("non-finite value produced at feature {0}")]
    NonFinite(usize),
    #[error("unexpected class label {0}")]
    InvalidLabel(i64),
    #[error("invalid probability output: {0}")]
    InvalidProbability(String),
    #[error("{0}")]
    Runtime(String),
}

/// Errors surfaced to the caller of a prediction.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Invalid input: expected {expected} features, got {got}")]
    InvalidInput { expected: usize, got: usize },
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("Failed to load artifact {}: {reason}", .path.display())]
    Artifact { path: PathBuf, reason: String },
    #[error("Classification failed: {0}")]
    Classification(#[from] ModelError),
}

impl PredictionError {
    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PredictionError::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
