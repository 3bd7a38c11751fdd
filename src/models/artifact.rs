//! Portable JSON model and scaler artifacts.
//!
//! Plain parameter dumps written by the `train-model` tool (or any exporter
//! producing the same layout), evaluated without a training runtime. Every
//! artifact carries a `kind` tag:
//!
//! ```json
//! { "kind": "random_forest", "feature_names": [...], "trees": [{ "nodes": [...] }] }
//! { "kind": "logistic_regression", "coefficients": [...], "intercept": -4.2 }
//! { "kind": "standard_scaler", "mean": [...], "scale": [...] }
//! ```

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::models::classifier::{Classifier, Transform};
use crate::models::error::ModelError;
use serde::{Deserialize, Serialize};

/// A model artifact file: the model parameters plus optional schema metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    /// Training column order; checked against the feature schema when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    #[serde(flatten)]
    pub model: ModelArtifact,
}

impl ModelFile {
    /// Decode and validate a model artifact.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, String> {
        let file: ModelFile = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(names) = &self.feature_names {
            if names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
                return Err(format!(
                    "feature schema mismatch: artifact was trained on {:?}, expected {:?}",
                    names, FEATURE_NAMES
                ));
            }
        }
        self.model.validate()
    }
}

/// Supported model families.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    RandomForest(RandomForest),
    LogisticRegression(LinearModel),
    /// Linear SVM without probability calibration
    LinearSvm(LinearModel),
}

impl ModelArtifact {
    fn validate(&self) -> Result<(), String> {
        match self {
            ModelArtifact::RandomForest(forest) => forest.validate(),
            ModelArtifact::LogisticRegression(linear) | ModelArtifact::LinearSvm(linear) => {
                linear.validate()
            }
        }
    }
}

impl Classifier for ModelArtifact {
    fn kind(&self) -> &'static str {
        match self {
            ModelArtifact::RandomForest(_) => "random_forest",
            ModelArtifact::LogisticRegression(_) => "logistic_regression",
            ModelArtifact::LinearSvm(_) => "linear_svm",
        }
    }

    fn predict(&self, input: &FeatureVector) -> Result<i64, ModelError> {
        match self {
            ModelArtifact::RandomForest(forest) => forest.predict(input.as_slice()),
            ModelArtifact::LogisticRegression(linear) | ModelArtifact::LinearSvm(linear) => {
                let decision = linear.decision(input.as_slice())?;
                Ok(if decision > 0.0 { 1 } else { 0 })
            }
        }
    }

    fn probabilities(&self, input: &FeatureVector) -> Result<Option<Vec<f64>>, ModelError> {
        match self {
            ModelArtifact::RandomForest(forest) => forest.predict_proba(input.as_slice()).map(Some),
            ModelArtifact::LogisticRegression(linear) => {
                let p = sigmoid(linear.decision(input.as_slice())?);
                Ok(Some(vec![1.0 - p, p]))
            }
            ModelArtifact::LinearSvm(_) => Ok(None),
        }
    }

    fn has_probabilities(&self) -> bool {
        !matches!(self, ModelArtifact::LinearSvm(_))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

/// Soft-voting ensemble of decision trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    /// Class labels, in the column order of leaf values
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("random_forest has no classes".to_string());
        }
        if self.trees.is_empty() {
            return Err("random_forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.classes.len())
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    /// Mean of the normalized leaf distributions across all trees.
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_width(x)?;
        let mut totals = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let leaf = tree.leaf_for(x)?;
            let sum: f64 = leaf.iter().sum();
            for (total, weight) in totals.iter_mut().zip(leaf) {
                *total += weight / sum;
            }
        }
        let n = self.trees.len() as f64;
        Ok(totals.into_iter().map(|t| t / n).collect())
    }

    /// Class with the highest mean probability; ties go to the first class.
    pub fn predict(&self, x: &[f64]) -> Result<i64, ModelError> {
        let proba = self.predict_proba(x)?;
        let best = proba
            .iter()
            .enumerate()
            .fold(0, |best, (i, &p)| if p > proba[best] { i } else { best });
        Ok(self.classes[best])
    }
}

/// Decision tree stored as a flat node array; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// `x[feature] <= threshold` continues at `left`, otherwise at `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: Vec<f64> },
}

impl DecisionTree {
    fn validate(&self, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(format!("node {}: feature index {} out of range", idx, feature));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {}: threshold is not finite", idx));
                    }
                    // Children always follow their parent, so traversal terminates.
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {}: invalid child index {}", idx, child));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(format!(
                            "node {}: leaf has {} values, expected {}",
                            idx,
                            value.len(),
                            n_classes
                        ));
                    }
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0)
                        || value.iter().sum::<f64>() <= 0.0
                    {
                        return Err(format!("node {}: leaf weights must be non-negative", idx));
                    }
                }
            }
        }
        Ok(())
    }

    /// Index of the leaf node `x` lands in
    pub(crate) fn leaf_index(&self, x: &[f64]) -> Result<usize, ModelError> {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = *x
                        .get(*feature)
                        .ok_or_else(|| ModelError::Runtime(format!("feature {} missing", feature)))?;
                    idx = if value <= *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { .. }) => return Ok(idx),
                None => return Err(ModelError::Runtime(format!("dangling node index {}", idx))),
            }
        }
    }

    fn leaf_for(&self, x: &[f64]) -> Result<&[f64], ModelError> {
        match &self.nodes[self.leaf_index(x)?] {
            TreeNode::Leaf { value } => Ok(value.as_slice()),
            TreeNode::Split { .. } => Err(ModelError::Runtime("traversal ended on a split".to_string())),
        }
    }
}

/// Linear decision function `w . x + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(format!(
                "expected {} coefficients, got {}",
                FEATURE_COUNT,
                self.coefficients.len()
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("coefficients must be finite".to_string());
        }
        Ok(())
    }

    fn decision(&self, x: &[f64]) -> Result<f64, ModelError> {
        check_width(x)?;
        let dot: f64 = self.coefficients.iter().zip(x).map(|(w, v)| w * v).sum();
        Ok(dot + self.intercept)
    }
}

fn check_width(x: &[f64]) -> Result<(), ModelError> {
    if x.len() != FEATURE_COUNT {
        return Err(ModelError::ShapeMismatch {
            expected: FEATURE_COUNT,
            got: x.len(),
        });
    }
    Ok(())
}

/// Supported feature scalers.
///
/// Parameter lengths are only checked when the scaler is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerArtifact {
    /// `(x - mean) / scale`
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`
    MinMaxScaler { min: Vec<f64>, scale: Vec<f64> },
}

impl ScalerArtifact {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

impl Transform for ScalerArtifact {
    fn kind(&self) -> &'static str {
        match self {
            ScalerArtifact::StandardScaler { .. } => "standard_scaler",
            ScalerArtifact::MinMaxScaler { .. } => "min_max_scaler",
        }
    }

    fn apply(&self, input: &FeatureVector) -> Result<FeatureVector, ModelError> {
        let (offsets, scales) = match self {
            ScalerArtifact::StandardScaler { mean, scale } => (mean, scale),
            ScalerArtifact::MinMaxScaler { min, scale } => (min, scale),
        };
        for params in [offsets, scales] {
            if params.len() != FEATURE_COUNT {
                return Err(ModelError::ShapeMismatch {
                    expected: FEATURE_COUNT,
                    got: params.len(),
                });
            }
        }

        let mut out = [0.0; FEATURE_COUNT];
        for (i, &x) in input.as_slice().iter().enumerate() {
            let v = match self {
                ScalerArtifact::StandardScaler { .. } => (x - offsets[i]) / scales[i],
                ScalerArtifact::MinMaxScaler { .. } => x * scales[i] + offsets[i],
            };
            if !v.is_finite() {
                return Err(ModelError::NonFinite(i));
            }
            out[i] = v;
        }
        Ok(FeatureVector::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLUCOSE_FOREST: &str = r#"{
        "kind": "random_forest",
        "feature_names": ["Pregnancies","Glucose","BloodPressure","SkinThickness",
                          "Insulin","BMI","DiabetesPedigreeFunction","Age"],
        "trees": [
            { "nodes": [
                { "feature": 1, "threshold": 140.0, "left": 1, "right": 2 },
                { "value": [45, 5] },
                { "value": [6, 34] }
            ] },
            { "nodes": [
                { "feature": 5, "threshold": 30.0, "left": 1, "right": 2 },
                { "value": [0.8, 0.2] },
                { "value": [0.3, 0.7] }
            ] }
        ]
    }"#;

    fn vector(glucose: f64, bmi: f64) -> FeatureVector {
        FeatureVector::new([1.0, glucose, 70.0, 20.0, 80.0, bmi, 0.4, 30.0])
    }

    #[test]
    fn test_random_forest_soft_voting() {
        let file = ModelFile::from_json_slice(GLUCOSE_FOREST.as_bytes()).unwrap();
        let model = file.model;
        assert_eq!(model.kind(), "random_forest");
        assert!(model.has_probabilities());

        // tree 1 -> [0.15, 0.85], tree 2 -> [0.3, 0.7]
        let proba = model.probabilities(&vector(150.0, 32.5)).unwrap().unwrap();
        assert!((proba[1] - 0.775).abs() < 1e-9);
        assert_eq!(model.predict(&vector(150.0, 32.5)).unwrap(), 1);

        // tree 1 -> [0.9, 0.1], tree 2 -> [0.8, 0.2]
        assert_eq!(model.predict(&vector(100.0, 22.0)).unwrap(), 0);
    }

    #[test]
    fn test_threshold_goes_left_when_equal() {
        let file = ModelFile::from_json_slice(GLUCOSE_FOREST.as_bytes()).unwrap();
        let forest = match file.model {
            ModelArtifact::RandomForest(forest) => forest,
            other => panic!("unexpected model {:?}", other),
        };
        let leaf = forest.trees[0].leaf_for(vector(140.0, 20.0).as_slice()).unwrap();
        assert_eq!(leaf, &[45.0, 5.0]);
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let json = r#"{
            "kind": "logistic_regression",
            "feature_names": ["Glucose","Pregnancies","BloodPressure","SkinThickness",
                              "Insulin","BMI","DiabetesPedigreeFunction","Age"],
            "coefficients": [0, 0, 0, 0, 0, 0, 0, 0],
            "intercept": 0
        }"#;
        let err = ModelFile::from_json_slice(json.as_bytes()).unwrap_err();
        assert!(err.contains("feature schema mismatch"));
    }

    #[test]
    fn test_invalid_tree_rejected() {
        let cyclic = r#"{ "kind": "random_forest", "trees": [ { "nodes": [
            { "feature": 1, "threshold": 1.0, "left": 0, "right": 1 },
            { "value": [1, 0] }
        ] } ] }"#;
        assert!(ModelFile::from_json_slice(cyclic.as_bytes()).is_err());

        let bad_feature = r#"{ "kind": "random_forest", "trees": [ { "nodes": [
            { "feature": 8, "threshold": 1.0, "left": 1, "right": 2 },
            { "value": [1, 0] }, { "value": [0, 1] }
        ] } ] }"#;
        assert!(ModelFile::from_json_slice(bad_feature.as_bytes()).is_err());

        let short_leaf = r#"{ "kind": "random_forest", "trees": [ { "nodes": [
            { "value": [1] }
        ] } ] }"#;
        assert!(ModelFile::from_json_slice(short_leaf.as_bytes()).is_err());
    }

    #[test]
    fn test_logistic_regression() {
        let json = r#"{
            "kind": "logistic_regression",
            "coefficients": [0, 0.05, 0, 0, 0, 0, 0, 0],
            "intercept": -7.0
        }"#;
        let model = ModelFile::from_json_slice(json.as_bytes()).unwrap().model;

        // decision = 0.05 * 150 - 7 = 0.5
        let proba = model.probabilities(&vector(150.0, 25.0)).unwrap().unwrap();
        assert!((proba[1] - sigmoid(0.5)).abs() < 1e-12);
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-12);
        assert_eq!(model.predict(&vector(150.0, 25.0)).unwrap(), 1);
        assert_eq!(model.predict(&vector(100.0, 25.0)).unwrap(), 0);
    }

    #[test]
    fn test_linear_svm_has_no_probabilities() {
        let json = r#"{
            "kind": "linear_svm",
            "coefficients": [0, 1, 0, 0, 0, 0, 0, 0],
            "intercept": -140.0
        }"#;
        let model = ModelFile::from_json_slice(json.as_bytes()).unwrap().model;

        assert!(!model.has_probabilities());
        assert_eq!(model.probabilities(&vector(150.0, 25.0)).unwrap(), None);
        assert_eq!(model.predict(&vector(150.0, 25.0)).unwrap(), 1);
        assert_eq!(model.predict(&vector(140.0, 25.0)).unwrap(), 0);
    }

    #[test]
    fn test_standard_scaler() {
        let scaler = ScalerArtifact::from_json_slice(
            br#"{ "kind": "standard_scaler",
                  "mean": [3, 120, 70, 20, 80, 25, 0.5, 50],
                  "scale": [3, 30, 20, 15, 100, 7, 0.3, 17] }"#,
        )
        .unwrap();

        let scaled = scaler.apply(&vector(150.0, 32.0)).unwrap();
        assert!((scaled.glucose() - 1.0).abs() < 1e-12);
        assert!((scaled.bmi() - 1.0).abs() < 1e-12);
        assert_eq!(scaler.kind(), "standard_scaler");
    }

    #[test]
    fn test_scaler_shape_mismatch_fails_on_apply() {
        let scaler = ScalerArtifact::StandardScaler {
            mean: vec![0.0; 7],
            scale: vec![1.0; 7],
        };
        let err = scaler.apply(&vector(150.0, 32.0)).unwrap_err();
        assert_eq!(
            err,
            ModelError::ShapeMismatch {
                expected: 8,
                got: 7
            }
        );
    }

    #[test]
    fn test_scaler_zero_scale_is_non_finite() {
        let scaler = ScalerArtifact::StandardScaler {
            mean: vec![0.0; 8],
            scale: vec![1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        };
        let err = scaler.apply(&vector(150.0, 32.0)).unwrap_err();
        assert_eq!(err, ModelError::NonFinite(1));
    }
}
