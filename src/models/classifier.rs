//! Classifier and transform interfaces shared by every artifact backend

use crate::feature_extractor::FeatureVector;
use crate::models::error::ModelError;
use crate::types::prediction::DegradeReason;

/// A persisted binary classifier.
pub trait Classifier: Send + Sync {
    /// Short backend name used in logs and model info.
    fn kind(&self) -> &'static str;

    /// Classify one vector. Returns the raw class label.
    fn predict(&self, input: &FeatureVector) -> Result<i64, ModelError>;

    /// Class probability distribution, ordered by class label.
    ///
    /// `Ok(None)` means the model has no probability capability.
    fn probabilities(&self, _input: &FeatureVector) -> Result<Option<Vec<f64>>, ModelError> {
        Ok(None)
    }

    /// Whether [`Classifier::probabilities`] can return a distribution.
    fn has_probabilities(&self) -> bool {
        false
    }
}

/// A feature scaling transform applied before classification.
pub trait Transform: Send + Sync {
    /// Short scaler name used in logs and model info.
    fn kind(&self) -> &'static str;

    /// Map a raw vector to the scale the model was trained on.
    fn apply(&self, input: &FeatureVector) -> Result<FeatureVector, ModelError>;
}

/// Outcome of one fallback-capable inference step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Ok(T),
    Degraded(DegradeReason),
}

/// Read the positive-class probability from the last column of a
/// distribution and scale it to a percentage.
pub fn positive_class_percent(distribution: &[f64]) -> Result<f64, ModelError> {
    let last = distribution
        .last()
        .copied()
        .ok_or_else(|| ModelError::InvalidProbability("empty distribution".to_string()))?;

    if !last.is_finite() || !(0.0..=1.0 + 1e-9).contains(&last) {
        return Err(ModelError::InvalidProbability(format!(
            "positive class probability {} outside [0, 1]",
            last
        )));
    }

    Ok((last * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_class_is_last_column() {
        assert_eq!(positive_class_percent(&[0.25, 0.75]).unwrap(), 75.0);
        assert_eq!(positive_class_percent(&[0.4]).unwrap(), 40.0);
    }

    #[test]
    fn test_invalid_distributions() {
        assert!(positive_class_percent(&[]).is_err());
        assert!(positive_class_percent(&[0.5, 1.5]).is_err());
        assert!(positive_class_percent(&[0.5, f64::NAN]).is_err());
        assert!(positive_class_percent(&[1.2, -0.2]).is_err());
    }
}
