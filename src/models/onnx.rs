//! ONNX Runtime classifier backend
//!
//! Handles the two common export layouts: a `label` tensor plus a
//! probability tensor (`[batch, classes]`), or a `label` tensor plus a
//! `seq(map(int64, float))` probability output.

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use crate::models::classifier::Classifier;
use crate::models::error::ModelError;
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    /// Session (running requires exclusive access)
    session: Mutex<Session>,
    /// Input name for the model
    input_name: String,
    /// Output name for class labels, if exported
    label_name: Option<String>,
    /// Output name for probabilities, if exported
    proba_name: Option<String>,
}

impl OnnxClassifier {
    /// Load an ONNX model from file
    pub fn load<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let proba_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone());

        info!(
            input = %input_name,
            label = ?label_name,
            probabilities = ?proba_name,
            "ONNX model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            label_name,
            proba_name,
        })
    }

    /// Run the session once and hand the outputs to `extract`
    fn run<T>(
        &self,
        input: &FeatureVector,
        extract: impl FnOnce(&SessionOutputs) -> Result<T, ModelError>,
    ) -> Result<T, ModelError> {
        let shape = vec![1_i64, FEATURE_COUNT as i64];
        let tensor = Tensor::from_array((shape, input.to_f32_vec()))
            .map_err(|e| ModelError::Runtime(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ModelError::Runtime(format!("Lock error: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| ModelError::Runtime(e.to_string()))?;

        extract(&outputs)
    }

    fn distribution_from(&self, outputs: &SessionOutputs) -> Result<Vec<f64>, ModelError> {
        let name = self
            .proba_name
            .as_deref()
            .ok_or_else(|| ModelError::InvalidProbability("no probability output".to_string()))?;
        let output = outputs
            .get(name)
            .ok_or_else(|| ModelError::InvalidProbability(format!("output {} missing", name)))?;

        // Tensor format: [batch, classes]
        if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
            return Ok(data.iter().map(|&p| p as f64).collect());
        }

        // Sequence format: seq(map(int64, float))
        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return extract_from_sequence_map(output);
        }

        Err(ModelError::InvalidProbability(format!(
            "unsupported output type for {}",
            name
        )))
    }
}

/// Class distribution from the first map of a `seq(map(int64, float))` output,
/// ordered by class id.
fn extract_from_sequence_map(output: &DynValue) -> Result<Vec<f64>, ModelError> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| ModelError::InvalidProbability(format!("not a sequence: {}", e)))?;

    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| ModelError::InvalidProbability(e.to_string()))?;

    let map_value = maps
        .first()
        .ok_or_else(|| ModelError::InvalidProbability("empty sequence".to_string()))?;

    let mut pairs = map_value
        .try_extract_key_values::<i64, f32>()
        .map_err(|e| ModelError::InvalidProbability(e.to_string()))?;
    pairs.sort_by_key(|(class_id, _)| *class_id);

    Ok(pairs.into_iter().map(|(_, p)| p as f64).collect())
}

impl Classifier for OnnxClassifier {
    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn predict(&self, input: &FeatureVector) -> Result<i64, ModelError> {
        self.run(input, |outputs| {
            if let Some(name) = self.label_name.as_deref() {
                if let Some(output) = outputs.get(name) {
                    if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
                        let label = data.first().copied().ok_or_else(|| {
                            ModelError::Runtime("empty label output".to_string())
                        })?;
                        debug!(label = label, "Extracted label tensor");
                        return Ok(label);
                    }
                }
            }

            // No label output: threshold the positive class probability
            let distribution = self.distribution_from(outputs)?;
            let positive = distribution.last().copied().unwrap_or(0.0);
            Ok(if positive >= 0.5 { 1 } else { 0 })
        })
    }

    fn probabilities(&self, input: &FeatureVector) -> Result<Option<Vec<f64>>, ModelError> {
        if self.proba_name.is_none() {
            return Ok(None);
        }
        self.run(input, |outputs| self.distribution_from(outputs).map(Some))
    }

    fn has_probabilities(&self) -> bool {
        self.proba_name.is_some()
    }
}
