//! ML model inference components

pub mod artifact;
pub mod classifier;
pub mod error;
pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::{Classifier, Step, Transform};
pub use error::{ModelError, PredictionError};
pub use inference::InferenceEngine;
pub use loader::{ArtifactSource, ModelLoader};
