//! Request handlers tying inference, accounts and history together
//!
//! Each handler runs to completion before returning. Authenticated handlers
//! take the caller's [`Session`] explicitly.

use crate::analytics::{ChartData, HistorySummary};
use crate::auth::{AuthError, AuthService};
use crate::config::AppConfig;
use crate::feature_extractor::FEATURE_NAMES;
use crate::models::error::PredictionError;
use crate::models::inference::InferenceEngine;
use crate::models::loader::{ArtifactSource, ModelLoader};
use crate::session::Session;
use crate::store::{Store, StoreError};
use crate::types::patient::PatientMetrics;
use crate::types::prediction::{Prediction, PredictionRecord};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Prediction plus the history row it was saved as, if any
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub prediction: Prediction,
    pub record_id: Option<i64>,
    /// Why saving failed; the prediction itself is still valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

/// A user's prediction history, newest first, with summary counts
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub records: Vec<PredictionRecord>,
    pub summary: HistorySummary,
}

/// What the configured artifacts resolve to
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_path: PathBuf,
    pub model_kind: String,
    pub has_probabilities: bool,
    pub scaler_path: Option<PathBuf>,
    pub scaler_kind: Option<String>,
    pub feature_names: Vec<&'static str>,
}

pub struct App<S = ModelLoader> {
    engine: InferenceEngine<S>,
    store: Store,
    auth: AuthService,
}

impl App<ModelLoader> {
    pub fn from_config(config: &AppConfig) -> Self {
        let store = Store::new(&config.database.path);
        Self::new(
            InferenceEngine::from_config(config),
            AuthService::new(store.clone(), config.auth.clone()),
            store,
        )
    }

    /// Resolve and load the configured artifacts without predicting anything
    pub fn model_info(&self) -> Result<ModelInfo, AppError> {
        let loader = self.engine.source();
        let model = loader.load_model()?;
        let scaler = loader.load_scaler()?;

        Ok(ModelInfo {
            model_path: loader.model_path().to_path_buf(),
            model_kind: model.kind().to_string(),
            has_probabilities: model.has_probabilities(),
            scaler_path: loader.resolve_scaler_path().map(|p| p.to_path_buf()),
            scaler_kind: scaler.map(|s| s.kind().to_string()),
            feature_names: FEATURE_NAMES.to_vec(),
        })
    }
}

impl<S: ArtifactSource> App<S> {
    pub fn new(engine: InferenceEngine<S>, auth: AuthService, store: Store) -> Self {
        Self {
            engine,
            store,
            auth,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Create the database tables; safe to call on every startup
    pub fn init_db(&self) -> Result<(), AppError> {
        self.store.init_schema()?;
        Ok(())
    }

    pub fn signup(&self, username: &str, password: &str, confirm: &str) -> Result<(), AppError> {
        Ok(self.auth.signup(username, password, confirm)?)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Session, AppError> {
        Ok(self.auth.login(username, password)?)
    }

    pub fn logout(&self, session: Session) {
        self.auth.logout(session);
    }

    /// Run one prediction for the session's user. With `save` set, the result
    /// is appended to the user's history; a failed save is reported on the
    /// outcome and does not discard the prediction.
    pub fn predict(
        &self,
        session: &Session,
        raw: &[f64],
        save: bool,
    ) -> Result<PredictionOutcome, AppError> {
        let prediction = self.engine.predict(raw)?;
        Ok(self.record(session, prediction, save))
    }

    /// Same as [`App::predict`] for named patient metrics
    pub fn predict_metrics(
        &self,
        session: &Session,
        metrics: &PatientMetrics,
        save: bool,
    ) -> Result<PredictionOutcome, AppError> {
        let prediction = self.engine.predict_metrics(metrics)?;
        Ok(self.record(session, prediction, save))
    }

    fn record(&self, session: &Session, prediction: Prediction, save: bool) -> PredictionOutcome {
        for reason in &prediction.degradations {
            warn!(username = %session.username(), reason = %reason, "Prediction degraded");
        }

        let mut outcome = PredictionOutcome {
            prediction,
            record_id: None,
            save_error: None,
        };
        if !save {
            return outcome;
        }

        match self
            .store
            .insert_prediction(&outcome.prediction.to_record(session.username()))
        {
            Ok(id) => {
                info!(username = %session.username(), id = id, "Prediction saved to history");
                outcome.record_id = Some(id);
            }
            Err(e) => {
                warn!(username = %session.username(), error = %e, "Prediction not saved");
                outcome.save_error = Some(e.to_string());
            }
        }
        outcome
    }

    pub fn history(&self, session: &Session) -> Result<HistoryView, AppError> {
        let records = self.store.history(session.username())?;
        let summary = HistorySummary::from_records(&records);
        Ok(HistoryView { records, summary })
    }

    pub fn charts(&self, session: &Session) -> Result<ChartData, AppError> {
        let records = self.store.chart_series(session.username())?;
        Ok(ChartData::from_records(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::types::prediction::Diagnosis;
    use std::fs;
    use tempfile::TempDir;

    /// Positive above glucose 140 with leaf distributions 0.1 / 0.8
    const FOREST: &str = r#"{
        "kind": "random_forest",
        "feature_names": ["Pregnancies", "Glucose", "BloodPressure", "SkinThickness",
                          "Insulin", "BMI", "DiabetesPedigreeFunction", "Age"],
        "trees": [ { "nodes": [
            { "feature": 1, "threshold": 140.0, "left": 1, "right": 2 },
            { "value": [0.9, 0.1] },
            { "value": [0.2, 0.8] }
        ] } ]
    }"#;

    const HIGH: [f64; 8] = [2.0, 150.0, 80.0, 25.0, 100.0, 32.5, 0.6, 45.0];
    const LOW: [f64; 8] = [1.0, 95.0, 70.0, 20.0, 80.0, 24.0, 0.3, 28.0];

    fn app(dir: &TempDir) -> App {
        let model_path = dir.path().join("model").join("diabetes_model.json");
        fs::create_dir_all(model_path.parent().unwrap()).unwrap();
        fs::write(&model_path, FOREST).unwrap();

        let store = Store::new(dir.path().join("db").join("app.db"));
        let auth = AuthService::new(
            store.clone(),
            AuthConfig {
                bcrypt_cost: 4,
                min_password_len: 6,
            },
        );
        let loader = ModelLoader::new(model_path, vec![dir.path().join("model").join("scaler.json")]);
        let app = App::new(InferenceEngine::new(loader), auth, store);
        app.init_db().unwrap();
        app
    }

    fn logged_in(app: &App) -> Session {
        app.signup("alice", "secret1", "secret1").unwrap();
        app.login("alice", "secret1").unwrap()
    }

    #[test]
    fn test_predict_and_history() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let session = logged_in(&app);

        let first = app.predict(&session, &LOW, true).unwrap();
        let second = app.predict(&session, &HIGH, true).unwrap();

        assert_eq!(first.prediction.text, "No Diabetes");
        assert_eq!(second.prediction.label, 1);
        assert!((second.prediction.proba.unwrap() - 80.0).abs() < 1e-9);
        assert!(second.record_id.is_some());

        let history = app.history(&session).unwrap();
        assert_eq!(history.records.len(), 2);
        assert_eq!(history.records[0].diagnosis, Diagnosis::Diabetes);
        assert_eq!(history.summary.total, 2);
        assert_eq!(history.summary.high_risk, 1);
        assert_eq!(history.summary.low_risk, 1);

        app.logout(session);
    }

    #[test]
    fn test_unsaved_and_invalid_predictions_leave_no_history() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let session = logged_in(&app);

        let outcome = app.predict(&session, &HIGH, false).unwrap();
        assert!(outcome.record_id.is_none());

        let err = app.predict(&session, &HIGH[..5], true).unwrap_err();
        assert!(matches!(
            err,
            AppError::Prediction(PredictionError::InvalidInput { got: 5, .. })
        ));

        assert!(app.history(&session).unwrap().records.is_empty());
    }

    #[test]
    fn test_failed_save_keeps_prediction() {
        let dir = TempDir::new().unwrap();
        let accounts = app(&dir);
        accounts.signup("alice", "secret1", "secret1").unwrap();

        // History database whose tables were never created
        let unready = App::new(
            InferenceEngine::new(ModelLoader::new(
                dir.path().join("model").join("diabetes_model.json"),
                vec![],
            )),
            AuthService::new(
                accounts.store().clone(),
                AuthConfig {
                    bcrypt_cost: 4,
                    min_password_len: 6,
                },
            ),
            Store::new(dir.path().join("unready.db")),
        );
        let session = unready.login("alice", "secret1").unwrap();

        let outcome = unready.predict(&session, &HIGH, true).unwrap();

        assert_eq!(outcome.prediction.label, 1);
        assert!((outcome.prediction.proba.unwrap() - 80.0).abs() < 1e-9);
        assert!(outcome.record_id.is_none());
        assert!(outcome.save_error.unwrap().contains("no such table"));
    }

    #[test]
    fn test_predict_from_named_metrics() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let session = logged_in(&app);
        let metrics = PatientMetrics {
            pregnancies: 2.0,
            glucose: 150.0,
            blood_pressure: 80.0,
            bmi: 32.5,
            age: 45.0,
            ..Default::default()
        };

        let outcome = app.predict_metrics(&session, &metrics, true).unwrap();

        assert_eq!(outcome.prediction.text, "Diabetes");
        assert!(outcome.save_error.is_none());
        assert_eq!(app.history(&session).unwrap().records[0].features.glucose(), 150.0);
    }

    #[test]
    fn test_charts_follow_saved_predictions() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let session = logged_in(&app);

        app.predict(&session, &LOW, true).unwrap();
        app.predict(&session, &HIGH, true).unwrap();

        let charts = app.charts(&session).unwrap();
        assert_eq!(charts.probability_trend.len(), 2);
        assert_eq!(charts.glucose_vs_probability[0].value, 95.0);
        assert_eq!(charts.probability_histogram[1], 1);
        assert_eq!(charts.probability_histogram[8], 1);
    }

    #[test]
    fn test_missing_model_reported() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);
        let session = logged_in(&app);
        fs::remove_file(dir.path().join("model").join("diabetes_model.json")).unwrap();

        let err = app.predict(&session, &HIGH, true).unwrap_err();
        assert!(matches!(
            err,
            AppError::Prediction(PredictionError::ModelNotFound(_))
        ));
        assert!(app.model_info().is_err());
    }

    #[test]
    fn test_model_info() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let info = app.model_info().unwrap();
        assert_eq!(info.model_kind, "random_forest");
        assert!(info.has_probabilities);
        assert!(info.scaler_path.is_none());
        assert_eq!(info.feature_names.len(), 8);
    }

    #[test]
    fn test_auth_errors_surface_as_messages() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let err = app.login("nobody", "secret1").unwrap_err();
        assert_eq!(err.to_string(), "User not found");
    }
}
