//! Inference engine for diabetes risk prediction
//!
//! Every call loads the model and scaler fresh from the artifact source, then
//! runs three steps. Scaling and probability extraction degrade instead of
//! failing; classification retries the raw vector when the scaled one is
//! rejected.

use crate::config::AppConfig;
use crate::feature_extractor::{FeatureExtractor, FeatureVector};
use crate::models::classifier::{positive_class_percent, Classifier, Step, Transform};
use crate::models::error::{ModelError, PredictionError};
use crate::models::loader::{ArtifactSource, ModelLoader};
use crate::types::patient::PatientMetrics;
use crate::types::prediction::{DegradeReason, Diagnosis, Prediction};
use tracing::{debug, info, warn};

/// Single-model inference engine
pub struct InferenceEngine<S = ModelLoader> {
    /// Where model and scaler are loaded from on each call
    source: S,
    /// Orders raw inputs into the feature schema
    extractor: FeatureExtractor,
}

impl InferenceEngine<ModelLoader> {
    /// Create an inference engine from configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(ModelLoader::from_config(&config.models))
    }
}

impl<S: ArtifactSource> InferenceEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Predict from raw values given in schema order.
    ///
    /// The feature count is checked before any artifact is loaded.
    pub fn predict(&self, raw: &[f64]) -> Result<Prediction, PredictionError> {
        let features = self.extractor.extract(raw)?;
        self.predict_features(&features)
    }

    /// Predict from named patient metrics
    pub fn predict_metrics(&self, metrics: &PatientMetrics) -> Result<Prediction, PredictionError> {
        let features = self.extractor.extract_metrics(metrics);
        self.predict_features(&features)
    }

    /// Run inference on a batch of raw inputs
    pub fn predict_batch(&self, batch: &[Vec<f64>]) -> Vec<Result<Prediction, PredictionError>> {
        batch.iter().map(|raw| self.predict(raw)).collect()
    }

    /// Run inference on a validated feature vector
    pub fn predict_features(&self, features: &FeatureVector) -> Result<Prediction, PredictionError> {
        let model = self.source.load_model()?;
        let scaler = self.source.load_scaler()?;
        let mut degradations = Vec::new();

        let scaled = match scaler.as_deref() {
            Some(scaler) => match Self::scale_step(scaler, features) {
                Step::Ok(scaled) => Some(scaled),
                Step::Degraded(reason) => {
                    degradations.push(reason);
                    None
                }
            },
            None => None,
        };

        let (label, model_input) = match scaled {
            Some(scaled) => match Self::classify_step(model.as_ref(), &scaled) {
                Step::Ok(label) => (label, scaled),
                Step::Degraded(reason) => {
                    degradations.push(reason);
                    (Self::classify(model.as_ref(), features)?, *features)
                }
            },
            None => (Self::classify(model.as_ref(), features)?, *features),
        };

        let mut candidates = vec![model_input];
        if model_input != *features {
            candidates.push(*features);
        }
        let proba = match Self::probability_step(model.as_ref(), &candidates) {
            Step::Ok(proba) => Some(proba),
            Step::Degraded(reason) => {
                degradations.push(reason);
                None
            }
        };

        info!(
            model = model.kind(),
            label = label.label(),
            proba = ?proba,
            degraded = !degradations.is_empty(),
            "Prediction complete"
        );

        Ok(Prediction::new(label, proba, *features).with_degradations(degradations))
    }

    /// Apply the scaler; a failure degrades to the raw vector
    fn scale_step(scaler: &dyn Transform, features: &FeatureVector) -> Step<FeatureVector> {
        match scaler.apply(features) {
            Ok(scaled) => {
                debug!(scaler = scaler.kind(), scaled = %scaled, "Features scaled");
                Step::Ok(scaled)
            }
            Err(e) => {
                warn!(scaler = scaler.kind(), error = %e, "Scaler failed, using raw features");
                Step::Degraded(DegradeReason::TransformFailed(e.to_string()))
            }
        }
    }

    /// Classify the scaled vector; a failure means the raw vector is tried next
    fn classify_step(model: &dyn Classifier, scaled: &FeatureVector) -> Step<Diagnosis> {
        match Self::classify(model, scaled) {
            Ok(label) => Step::Ok(label),
            Err(e) => {
                warn!(model = model.kind(), error = %e, "Model rejected scaled features, retrying raw");
                Step::Degraded(DegradeReason::ClassifiedRawInput(e.to_string()))
            }
        }
    }

    fn classify(model: &dyn Classifier, input: &FeatureVector) -> Result<Diagnosis, ModelError> {
        let label = model.predict(input)?;
        Diagnosis::from_label(label).ok_or(ModelError::InvalidLabel(label))
    }

    /// Positive-class probability in percent, from the first candidate input
    /// the model accepts
    fn probability_step(model: &dyn Classifier, candidates: &[FeatureVector]) -> Step<f64> {
        if !model.has_probabilities() {
            debug!(model = model.kind(), "Model has no probability output");
            return Step::Degraded(DegradeReason::ProbabilityUnavailable(
                "model has no probability output".to_string(),
            ));
        }

        let mut last_error = String::new();
        for input in candidates {
            let result = model.probabilities(input).and_then(|dist| match dist {
                Some(dist) => positive_class_percent(&dist),
                None => Err(ModelError::InvalidProbability(
                    "model returned no distribution".to_string(),
                )),
            });
            match result {
                Ok(percent) => return Step::Ok(percent),
                Err(e) => last_error = e.to_string(),
            }
        }

        warn!(model = model.kind(), error = %last_error, "Probability unavailable");
        Step::Degraded(DegradeReason::ProbabilityUnavailable(last_error))
    }
}
