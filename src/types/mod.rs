//! Type definitions for the diabetes predictor

pub mod patient;
pub mod prediction;

pub use patient::PatientMetrics;
pub use prediction::{DegradeReason, Diagnosis, Prediction, PredictionRecord};
