//! Diabetes Risk Predictor Library
//!
//! Predicts diabetes risk from eight patient health metrics with a
//! pre-trained classifier, and keeps a per-user prediction history.

pub mod analytics;
pub mod app;
pub mod auth;
pub mod config;
pub mod feature_extractor;
pub mod models;
pub mod session;
pub mod store;
pub mod synthetic;
pub mod training;
pub mod types;

pub use app::{App, AppError};
pub use config::AppConfig;
pub use feature_extractor::{FeatureExtractor, FeatureVector};
pub use models::inference::InferenceEngine;
pub use session::Session;
pub use types::{patient::PatientMetrics, prediction::Prediction};
