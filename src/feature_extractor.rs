//! Feature extraction for diabetes model inference.
//!
//! Raw user-entered values are ordered into the fixed 8-feature schema the
//! persisted models were trained with. Values are passed through unchanged;
//! zero is a valid placeholder for "unknown".

use crate::models::error::PredictionError;
use crate::types::patient::PatientMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of features in the training schema.
pub const FEATURE_COUNT: usize = 8;

/// Column names of the training data, in schema order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Pregnancies",
    "Glucose",
    "BloodPressure",
    "SkinThickness",
    "Insulin",
    "BMI",
    "DiabetesPedigreeFunction",
    "Age",
];

/// One column of the feature schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Pregnancies,
    Glucose,
    BloodPressure,
    SkinThickness,
    Insulin,
    Bmi,
    DiabetesPedigreeFunction,
    Age,
}

impl Feature {
    /// All features in schema order.
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Pregnancies,
        Feature::Glucose,
        Feature::BloodPressure,
        Feature::SkinThickness,
        Feature::Insulin,
        Feature::Bmi,
        Feature::DiabetesPedigreeFunction,
        Feature::Age,
    ];

    /// Position of the feature in the vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Training column name.
    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self.index()]
    }
}

/// Ordered, fixed-size model input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    /// Wrap values already in schema order.
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    /// Value of one feature.
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    /// Values in schema order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        self.values
    }

    /// Values as `f32`, for runtimes that take single precision tensors.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }

    pub fn glucose(&self) -> f64 {
        self.get(Feature::Glucose)
    }

    pub fn bmi(&self) -> f64 {
        self.get(Feature::Bmi)
    }

    pub fn age(&self) -> f64 {
        self.get(Feature::Age)
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = Feature::ALL
            .iter()
            .map(|feat| format!("{}={}", feat.name(), self.get(*feat)))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Feature extractor that orders raw inputs into model features.
///
/// Features are produced in the exact order expected by the persisted models.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Build a feature vector from raw values given in schema order.
    ///
    /// Fails when the number of values is not exactly [`FEATURE_COUNT`].
    pub fn extract(&self, raw: &[f64]) -> Result<FeatureVector, PredictionError> {
        let values = <[f64; FEATURE_COUNT]>::try_from(raw).map_err(|_| {
            PredictionError::InvalidInput {
                expected: FEATURE_COUNT,
                got: raw.len(),
            }
        })?;
        Ok(FeatureVector::new(values))
    }

    /// Build a feature vector from named patient metrics.
    pub fn extract_metrics(&self, metrics: &PatientMetrics) -> FeatureVector {
        FeatureVector::new([
            metrics.pregnancies,
            metrics.glucose,
            metrics.blood_pressure,
            metrics.skin_thickness,
            metrics.insulin,
            metrics.bmi,
            metrics.diabetes_pedigree_function,
            metrics.age,
        ])
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names (training column order).
    pub fn feature_names(&self) -> Vec<&'static str> {
        FEATURE_NAMES.to_vec()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}
