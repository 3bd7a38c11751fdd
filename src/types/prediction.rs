//! Prediction results and persisted prediction records

use crate::feature_extractor::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary diagnosis derived from the model label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    NoDiabetes,
    Diabetes,
}

impl Diagnosis {
    /// Map a class label to a diagnosis. Only 0 and 1 are valid.
    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            0 => Some(Diagnosis::NoDiabetes),
            1 => Some(Diagnosis::Diabetes),
            _ => None,
        }
    }

    pub fn label(self) -> u8 {
        match self {
            Diagnosis::NoDiabetes => 0,
            Diagnosis::Diabetes => 1,
        }
    }

    /// Text shown right after a prediction.
    pub fn text(self) -> &'static str {
        match self {
            Diagnosis::NoDiabetes => "No Diabetes",
            Diagnosis::Diabetes => "Diabetes",
        }
    }

    /// Label used by the history and chart views.
    pub fn risk_label(self) -> &'static str {
        match self {
            Diagnosis::NoDiabetes => "Low Risk",
            Diagnosis::Diabetes => "High Risk",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Why an inference continued with reduced functionality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradeReason {
    /// The scaler failed; the raw vector was used instead
    TransformFailed(String),
    /// The model rejected the scaled vector; the raw vector was classified
    ClassifiedRawInput(String),
    /// No positive-class probability could be produced
    ProbabilityUnavailable(String),
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::TransformFailed(e) => write!(f, "scaler failed, used raw input: {}", e),
            DegradeReason::ClassifiedRawInput(e) => {
                write!(f, "model rejected scaled input, used raw input: {}", e)
            }
            DegradeReason::ProbabilityUnavailable(e) => write!(f, "probability unavailable: {}", e),
        }
    }
}

/// Result of one inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class label (0 or 1)
    pub label: u8,
    /// Human readable category derived from the label
    pub text: String,
    /// Probability of the positive class, as a percentage in [0, 100]
    pub proba: Option<f64>,
    /// Raw features the prediction was made for
    pub features: FeatureVector,
    /// Fallbacks taken while producing this result
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<DegradeReason>,
}

impl Prediction {
    pub fn new(diagnosis: Diagnosis, proba: Option<f64>, features: FeatureVector) -> Self {
        Self {
            label: diagnosis.label(),
            text: diagnosis.text().to_string(),
            proba,
            features,
            degradations: Vec::new(),
        }
    }

    pub fn with_degradations(mut self, degradations: Vec<DegradeReason>) -> Self {
        self.degradations = degradations;
        self
    }

    pub fn diagnosis(&self) -> Diagnosis {
        if self.label == 1 {
            Diagnosis::Diabetes
        } else {
            Diagnosis::NoDiabetes
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Convert the prediction into a record for the prediction history
    pub fn to_record(&self, username: &str) -> PredictionRecord {
        PredictionRecord::new(username.to_string(), self.features, self.diagnosis(), self.proba)
    }
}

/// Persisted prediction, owned by the prediction store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Row id, assigned by the store
    pub id: Option<i64>,
    /// User the prediction was made for
    pub username: String,
    /// Raw feature values
    pub features: FeatureVector,
    /// Predicted diagnosis
    pub diagnosis: Diagnosis,
    /// Positive-class probability in percent, when it was available
    pub probability: Option<f64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(
        username: String,
        features: FeatureVector,
        diagnosis: Diagnosis,
        probability: Option<f64>,
    ) -> Self {
        Self {
            id: None,
            username,
            features,
            diagnosis,
            probability,
            created_at: Utc::now(),
        }
    }

    /// Probability formatted the way the history view shows it.
    pub fn probability_display(&self) -> String {
        match self.probability {
            Some(p) => format!("{:.1}%", p),
            None => "n/a".to_string(),
        }
    }
}
