//! Model training on synthetic patients
//!
//! Generates the reference dataset, fits a standard scaler and a bagged
//! ensemble of CART trees on the scaled features, and exports both in the
//! portable JSON artifact format the loader reads.

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::models::artifact::{
    DecisionTree, ModelArtifact, ModelFile, RandomForest, ScalerArtifact, TreeNode,
};
use crate::models::classifier::{Classifier, Transform};
use crate::models::error::ModelError;
use crate::synthetic::{DistributionError, PatientGenerator, DEFAULT_SEED};
use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_trees::{DecisionTree as CartTree, SplitQuality, TreeNode as CartNode};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

type Row = [f64; FEATURE_COUNT];

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("training set is empty")]
    EmptyDataset,
    #[error("dataset shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("tree fitting failed: {0}")]
    Fit(String),
    #[error("fitted tree cannot be exported: {0}")]
    Export(String),
    #[error("exported model failed: {0}")]
    Model(#[from] ModelError),
    #[error("failed to serialize artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Training run parameters
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Synthetic patients to generate
    pub samples: usize,
    /// Share of the dataset held out for evaluation
    pub test_fraction: f64,
    /// Trees in the forest, each fitted on a bootstrap sample
    pub trees: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            samples: 1000,
            test_fraction: 0.2,
            trees: 100,
            max_depth: Some(10),
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub positives: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub train_accuracy: f64,
    /// `None` when nothing was held out
    pub test_accuracy: Option<f64>,
}

/// Fitted artifacts plus evaluation results
pub struct TrainedModel {
    pub model: ModelFile,
    pub scaler: ScalerArtifact,
    pub report: TrainingReport,
}

impl TrainedModel {
    /// Write model and scaler as JSON artifacts, creating parent directories
    pub fn write(&self, model_path: &Path, scaler_path: &Path) -> Result<(), TrainingError> {
        write_json(model_path, &serde_json::to_vec(&self.model)?)?;
        write_json(scaler_path, &serde_json::to_vec_pretty(&self.scaler)?)?;
        info!(
            model = %model_path.display(),
            scaler = %scaler_path.display(),
            "Artifacts written"
        );
        Ok(())
    }
}

fn write_json(path: &Path, bytes: &[u8]) -> Result<(), TrainingError> {
    let io_error = |source| TrainingError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, bytes).map_err(io_error)
}

/// Generate the synthetic dataset, then fit and evaluate scaler and forest
pub fn train(config: &TrainingConfig) -> Result<TrainedModel, TrainingError> {
    let mut generator = PatientGenerator::new(Some(config.seed))?;
    let mut data = generator.labeled_dataset(config.samples);
    let positives = data.iter().filter(|(_, label)| *label == 1).count();
    info!(
        samples = data.len(),
        positives = positives,
        "Synthetic dataset generated"
    );

    data.shuffle(generator.rng_mut());
    let test_size = (data.len() as f64 * config.test_fraction.clamp(0.0, 0.9)).round() as usize;
    let (test, train) = data.split_at(test_size);
    if train.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }

    let train_rows: Vec<Row> = train.iter().map(|(x, _)| *x).collect();
    let scaler = fit_standard_scaler(&train_rows);
    let train_scaled = scale_rows(&scaler, train)?;
    let test_scaled = scale_rows(&scaler, test)?;

    let mut trees = Vec::with_capacity(config.trees);
    for i in 0..config.trees.max(1) {
        let bootstrap: Vec<(Row, usize)> = (0..train_scaled.len())
            .map(|_| train_scaled[generator.rng_mut().gen_range(0..train_scaled.len())])
            .collect();
        let tree = fit_tree(&bootstrap, config.max_depth)?;
        debug!(tree = i, nodes = tree.nodes.len(), "Tree fitted");
        trees.push(tree);
    }

    let forest = ModelArtifact::RandomForest(RandomForest {
        classes: vec![0, 1],
        trees,
    });
    let train_accuracy = accuracy(&forest, &train_scaled)?.unwrap_or(0.0);
    let test_accuracy = accuracy(&forest, &test_scaled)?;
    info!(
        train_accuracy = train_accuracy,
        test_accuracy = ?test_accuracy,
        "Random forest trained"
    );

    Ok(TrainedModel {
        model: ModelFile {
            feature_names: Some(FEATURE_NAMES.iter().map(|name| name.to_string()).collect()),
            model: forest,
        },
        scaler,
        report: TrainingReport {
            samples: data.len(),
            positives,
            train_size: train.len(),
            test_size: test.len(),
            train_accuracy,
            test_accuracy,
        },
    })
}

/// Per-feature mean and population standard deviation; constant features
/// keep a scale of 1
pub fn fit_standard_scaler(rows: &[Row]) -> ScalerArtifact {
    let n = rows.len().max(1) as f64;
    let mut mean = vec![0.0; FEATURE_COUNT];
    for row in rows {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x / n;
        }
    }

    let mut scale = vec![0.0; FEATURE_COUNT];
    for row in rows {
        for ((s, m), x) in scale.iter_mut().zip(&mean).zip(row) {
            *s += (x - m).powi(2) / n;
        }
    }
    for s in scale.iter_mut() {
        *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
    }

    ScalerArtifact::StandardScaler { mean, scale }
}

fn scale_rows(
    scaler: &ScalerArtifact,
    rows: &[(Row, usize)],
) -> Result<Vec<(Row, usize)>, ModelError> {
    rows.iter()
        .map(|(x, label)| -> Result<(Row, usize), ModelError> {
            Ok((scaler.apply(&FeatureVector::new(*x))?.to_array(), *label))
        })
        .collect()
}

fn fit_tree(sample: &[(Row, usize)], max_depth: Option<usize>) -> Result<DecisionTree, TrainingError> {
    let flat: Vec<f64> = sample.iter().flat_map(|(x, _)| x.iter().copied()).collect();
    let records = Array2::from_shape_vec((sample.len(), FEATURE_COUNT), flat)?;
    let targets: Array1<usize> = sample.iter().map(|(_, label)| *label).collect();
    let dataset = DatasetBase::new(records, targets);

    let cart = CartTree::<f64, usize>::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(max_depth)
        .fit(&dataset)
        .map_err(|e| TrainingError::Fit(e.to_string()))?;

    let mut nodes = Vec::new();
    flatten(cart.root_node(), &mut nodes)?;
    let mut tree = DecisionTree { nodes };
    fill_leaf_counts(&mut tree, sample)?;
    Ok(tree)
}

/// Append `node` and its subtree in pre-order, so children always follow
/// their parent. Returns the index of `node`.
fn flatten(node: &CartNode<f64, usize>, nodes: &mut Vec<TreeNode>) -> Result<usize, TrainingError> {
    let idx = nodes.len();
    if node.is_leaf() {
        let label = node
            .prediction()
            .ok_or_else(|| TrainingError::Export(format!("leaf {} has no prediction", idx)))?;
        let mut value = vec![0.0; 2];
        *value
            .get_mut(label)
            .ok_or_else(|| TrainingError::Export(format!("label {} is not binary", label)))? = 1.0;
        nodes.push(TreeNode::Leaf { value });
        return Ok(idx);
    }

    let (feature, threshold, _) = node.split();
    nodes.push(TreeNode::Split {
        feature,
        threshold,
        left: idx,
        right: idx,
    });
    let (left, right) = match node.children().as_slice() {
        [Some(left), Some(right)] => (flatten(left, nodes)?, flatten(right, nodes)?),
        _ => {
            return Err(TrainingError::Export(format!(
                "split node {} is missing a child",
                idx
            )))
        }
    };
    nodes[idx] = TreeNode::Split {
        feature,
        threshold,
        left,
        right,
    };
    Ok(idx)
}

/// Replace each reached leaf with the class counts of the samples routed to
/// it; unreached leaves keep the fitted majority label.
fn fill_leaf_counts(tree: &mut DecisionTree, sample: &[(Row, usize)]) -> Result<(), TrainingError> {
    let mut counts = vec![[0.0_f64; 2]; tree.nodes.len()];
    for (x, label) in sample {
        let leaf = tree.leaf_index(x)?;
        if let Some(slot) = counts[leaf].get_mut(*label) {
            *slot += 1.0;
        }
    }

    for (node, count) in tree.nodes.iter_mut().zip(&counts) {
        if let TreeNode::Leaf { value } = node {
            if count.iter().sum::<f64>() > 0.0 {
                *value = count.to_vec();
            }
        }
    }
    Ok(())
}

fn accuracy(model: &ModelArtifact, rows: &[(Row, usize)]) -> Result<Option<f64>, TrainingError> {
    if rows.is_empty() {
        return Ok(None);
    }
    let mut correct = 0;
    for (x, label) in rows {
        if model.predict(&FeatureVector::new(*x))? == *label as i64 {
            correct += 1;
        }
    }
    Ok(Some(correct as f64 / rows.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inference::InferenceEngine;
    use crate::models::loader::ModelLoader;
    use tempfile::TempDir;

    fn small() -> TrainingConfig {
        TrainingConfig {
            samples: 400,
            trees: 5,
            max_depth: Some(6),
            ..Default::default()
        }
    }

    #[test]
    fn test_standard_scaler_fit() {
        let mut low = [0.0; FEATURE_COUNT];
        let mut high = [0.0; FEATURE_COUNT];
        low[1] = 100.0;
        high[1] = 140.0;
        low[7] = 30.0;
        high[7] = 30.0;

        let scaler = fit_standard_scaler(&[low, high]);

        match &scaler {
            ScalerArtifact::StandardScaler { mean, scale } => {
                assert_eq!(mean[1], 120.0);
                assert_eq!(scale[1], 20.0);
                // constant column
                assert_eq!(mean[7], 30.0);
                assert_eq!(scale[7], 1.0);
            }
            other => panic!("unexpected scaler {:?}", other),
        }
        let scaled = scaler.apply(&FeatureVector::new(high)).unwrap();
        assert_eq!(scaled.glucose(), 1.0);
    }

    #[test]
    fn test_training_report() {
        let trained = train(&small()).unwrap();
        let report = &trained.report;

        assert_eq!(report.samples, 400);
        assert_eq!(report.test_size, 80);
        assert_eq!(report.train_size, 320);
        assert!(report.positives > 0 && report.positives < 400);
        assert!(report.train_accuracy > 0.8);
        assert!(report.test_accuracy.unwrap() > 0.8);

        match &trained.model.model {
            ModelArtifact::RandomForest(forest) => assert_eq!(forest.trees.len(), 5),
            other => panic!("unexpected model {:?}", other),
        }
    }

    #[test]
    fn test_training_is_reproducible() {
        let a = train(&small()).unwrap();
        let b = train(&small()).unwrap();
        assert_eq!(
            serde_json::to_string(&a.model).unwrap(),
            serde_json::to_string(&b.model).unwrap()
        );
    }

    #[test]
    fn test_exported_artifacts_serve_predictions() {
        let dir = TempDir::new().unwrap();
        let model_path = dir.path().join("model").join("diabetes_model.json");
        let scaler_path = dir.path().join("model").join("scaler.json");
        train(&small()).unwrap().write(&model_path, &scaler_path).unwrap();

        let engine = InferenceEngine::new(ModelLoader::new(&model_path, vec![scaler_path]));

        let high = engine
            .predict(&[8.0, 185.0, 95.0, 30.0, 100.0, 37.0, 0.6, 65.0])
            .unwrap();
        assert_eq!(high.label, 1);
        assert!(high.proba.unwrap() > 50.0);
        assert!(!high.is_degraded());

        let low = engine
            .predict(&[1.0, 90.0, 65.0, 20.0, 80.0, 22.0, 0.3, 25.0])
            .unwrap();
        assert_eq!(low.label, 0);
        assert!(low.proba.unwrap() < 50.0);
    }
}
