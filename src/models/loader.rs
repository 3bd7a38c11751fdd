//! Model and scaler artifact loader

use crate::config::ModelsConfig;
use crate::models::artifact::{ModelFile, ScalerArtifact};
use crate::models::classifier::{Classifier, Transform};
use crate::models::error::PredictionError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of the model and the optional scaler used by one inference call.
pub trait ArtifactSource {
    fn load_model(&self) -> Result<Box<dyn Classifier>, PredictionError>;

    /// `Ok(None)` when no scaler is configured or none of the candidates exist.
    fn load_scaler(&self) -> Result<Option<Box<dyn Transform>>, PredictionError>;
}

/// On-disk artifact format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Onnx,
    /// Python object serialization; cannot be evaluated here
    Pickle,
    Unknown,
}

impl ArtifactFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => ArtifactFormat::Json,
            Some("onnx") => ArtifactFormat::Onnx,
            Some("pkl") | Some("pickle") | Some("joblib") => ArtifactFormat::Pickle,
            _ => ArtifactFormat::Unknown,
        }
    }
}

/// Loads artifacts from a primary model path and ordered scaler candidates
#[derive(Debug, Clone)]
pub struct ModelLoader {
    model_path: PathBuf,
    scaler_paths: Vec<PathBuf>,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    pub fn new(model_path: impl Into<PathBuf>, scaler_paths: Vec<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            scaler_paths,
            onnx_threads: 1,
        }
    }

    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::new(
            &config.model_path,
            config.scaler_paths.iter().map(PathBuf::from).collect(),
        )
        .with_threads(config.onnx_threads)
    }

    pub fn with_threads(mut self, onnx_threads: usize) -> Self {
        self.onnx_threads = onnx_threads.max(1);
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn scaler_paths(&self) -> &[PathBuf] {
        &self.scaler_paths
    }

    /// First scaler candidate that exists on disk
    pub fn resolve_scaler_path(&self) -> Option<&Path> {
        self.scaler_paths
            .iter()
            .map(PathBuf::as_path)
            .find(|p| p.is_file())
    }

    fn read(path: &Path) -> Result<Vec<u8>, PredictionError> {
        fs::read(path).map_err(|e| PredictionError::artifact(path, e))
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, path: &Path) -> Result<Box<dyn Classifier>, PredictionError> {
        let model = crate::models::onnx::OnnxClassifier::load(path, self.onnx_threads)
            .map_err(|e| PredictionError::artifact(path, format!("{:#}", e)))?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, path: &Path) -> Result<Box<dyn Classifier>, PredictionError> {
        Err(PredictionError::artifact(
            path,
            "ONNX support is not enabled (build with --features onnx)",
        ))
    }
}

impl ArtifactSource for ModelLoader {
    fn load_model(&self) -> Result<Box<dyn Classifier>, PredictionError> {
        let path = self.model_path.as_path();
        if !path.exists() {
            return Err(PredictionError::ModelNotFound(path.to_path_buf()));
        }

        let model: Box<dyn Classifier> = match ArtifactFormat::from_path(path) {
            ArtifactFormat::Json => {
                let file = ModelFile::from_json_slice(&Self::read(path)?)
                    .map_err(|e| PredictionError::artifact(path, e))?;
                Box::new(file.model)
            }
            ArtifactFormat::Onnx => self.load_onnx(path)?,
            ArtifactFormat::Pickle => {
                return Err(PredictionError::artifact(
                    path,
                    "pickle artifacts are not supported; export the model to JSON or ONNX",
                ))
            }
            ArtifactFormat::Unknown => {
                return Err(PredictionError::artifact(path, "unrecognized artifact format"))
            }
        };

        debug!(path = %path.display(), kind = model.kind(), "Model loaded");
        Ok(model)
    }

    fn load_scaler(&self) -> Result<Option<Box<dyn Transform>>, PredictionError> {
        let Some(path) = self.resolve_scaler_path() else {
            debug!(candidates = ?self.scaler_paths, "No scaler found, using raw features");
            return Ok(None);
        };

        match ArtifactFormat::from_path(path) {
            ArtifactFormat::Json => {
                let scaler = ScalerArtifact::from_json_slice(&Self::read(path)?)
                    .map_err(|e| PredictionError::artifact(path, e))?;
                info!(path = %path.display(), kind = scaler.kind(), "Scaler loaded");
                let scaler: Box<dyn Transform> = Box::new(scaler);
                Ok(Some(scaler))
            }
            ArtifactFormat::Pickle => Err(PredictionError::artifact(
                path,
                "pickle artifacts are not supported; export the scaler to JSON",
            )),
            ArtifactFormat::Onnx | ArtifactFormat::Unknown => Err(PredictionError::artifact(
                path,
                "unsupported scaler format",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureVector;
    use tempfile::TempDir;

    const LOGISTIC: &str = r#"{
        "kind": "logistic_regression",
        "coefficients": [0, 0.05, 0, 0, 0, 0, 0, 0],
        "intercept": -7.0
    }"#;

    const SCALER: &str = r#"{
        "kind": "min_max_scaler",
        "min": [0, 0, 0, 0, 0, 0, 0, 0],
        "scale": [1, 2, 1, 1, 1, 1, 1, 1]
    }"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ArtifactFormat::from_path(Path::new("m.json")), ArtifactFormat::Json);
        assert_eq!(ArtifactFormat::from_path(Path::new("m.ONNX")), ArtifactFormat::Onnx);
        assert_eq!(ArtifactFormat::from_path(Path::new("model.pkl")), ArtifactFormat::Pickle);
        assert_eq!(ArtifactFormat::from_path(Path::new("model")), ArtifactFormat::Unknown);
    }

    #[test]
    fn test_missing_model_is_model_not_found() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(dir.path().join("model.json"), vec![]);

        let err = loader.load_model().err().unwrap();
        assert!(matches!(err, PredictionError::ModelNotFound(_)));
    }

    #[test]
    fn test_load_json_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, LOGISTIC).unwrap();

        let model = ModelLoader::new(&path, vec![]).load_model().unwrap();
        assert_eq!(model.kind(), "logistic_regression");
        assert!(model.has_probabilities());
    }

    #[test]
    fn test_corrupt_model_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ModelLoader::new(&path, vec![]).load_model().err().unwrap();
        assert!(matches!(err, PredictionError::Artifact { .. }));
    }

    #[test]
    fn test_pickle_model_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.pkl");
        fs::write(&path, [0x80u8, 0x04]).unwrap();

        let err = ModelLoader::new(&path, vec![]).load_model().err().unwrap();
        assert!(err.to_string().contains("pickle"));
    }

    #[test]
    fn test_no_scaler_candidates_exist() {
        let dir = TempDir::new().unwrap();
        let loader = ModelLoader::new(
            dir.path().join("model.json"),
            vec![dir.path().join("scaler.json"), dir.path().join("preprocessor.json")],
        );

        assert!(loader.resolve_scaler_path().is_none());
        assert!(loader.load_scaler().unwrap().is_none());
    }

    #[test]
    fn test_first_existing_scaler_candidate_wins() {
        let dir = TempDir::new().unwrap();
        let second = dir.path().join("preprocessor.json");
        fs::write(&second, SCALER).unwrap();

        let loader = ModelLoader::new(
            dir.path().join("model.json"),
            vec![dir.path().join("scaler.json"), second.clone()],
        );

        assert_eq!(loader.resolve_scaler_path(), Some(second.as_path()));
        let scaler = loader.load_scaler().unwrap().unwrap();
        assert_eq!(scaler.kind(), "min_max_scaler");

        let scaled = scaler
            .apply(&FeatureVector::new([1.0, 150.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(scaled.glucose(), 300.0);
    }

    #[test]
    fn test_directory_scaler_candidate_is_skipped() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("scaler.json");
        fs::create_dir(&first).unwrap();
        let second = dir.path().join("preprocessor.json");
        fs::write(&second, SCALER).unwrap();

        let loader = ModelLoader::new(dir.path().join("model.json"), vec![first, second.clone()]);

        assert_eq!(loader.resolve_scaler_path(), Some(second.as_path()));
        assert!(loader.load_scaler().unwrap().is_some());
    }
}
