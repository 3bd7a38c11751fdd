//! SQLite persistence for user accounts and prediction history.
//!
//! Every operation opens its own connection and closes it when done.

use crate::feature_extractor::FeatureVector;
use crate::types::prediction::{Diagnosis, PredictionRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database error: cannot create {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Database error: stored prediction label {0} is not 0 or 1")]
    CorruptLabel(i64),
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT UNIQUE NOT NULL,
        password TEXT NOT NULL,
        created_date TIMESTAMP NOT NULL
    );
    CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        pregnancies REAL NOT NULL,
        glucose REAL NOT NULL,
        blood_pressure REAL NOT NULL,
        skin_thickness REAL NOT NULL,
        insulin REAL NOT NULL,
        bmi REAL NOT NULL,
        dpf REAL NOT NULL,
        age REAL NOT NULL,
        prediction INTEGER NOT NULL,
        probability REAL,
        date TIMESTAMP NOT NULL,
        FOREIGN KEY (username) REFERENCES users (username)
    );
";

const PREDICTION_COLUMNS: &str = "id, username, pregnancies, glucose, blood_pressure, \
     skin_thickness, insulin, bmi, dpf, age, prediction, probability, date";

/// Stored account row
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Handle to the application database
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.path)?)
    }

    /// Create the database directory and tables if they do not exist yet
    pub fn init_schema(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %self.path.display(), "Database schema ready");
        Ok(())
    }

    /// Insert a new user. Returns `false` when the username is already taken.
    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (username, password, created_date) VALUES (?1, ?2, ?3)",
            params![username, password_hash, Utc::now()],
        )?;
        debug!(username = %username, inserted = inserted == 1, "User insert");
        Ok(inserted == 1)
    }

    /// Look up an account by username
    pub fn find_user(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let conn = self.connect()?;
        let user = conn
            .query_row(
                "SELECT id, username, password, created_date FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password_hash: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.find_user(username)?.is_some())
    }

    /// Persist one prediction; returns the new row id
    pub fn insert_prediction(&self, record: &PredictionRecord) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        let f = record.features.as_slice();
        conn.execute(
            "INSERT INTO predictions (username, pregnancies, glucose, blood_pressure, \
             skin_thickness, insulin, bmi, dpf, age, prediction, probability, date) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.username,
                f[0],
                f[1],
                f[2],
                f[3],
                f[4],
                f[5],
                f[6],
                f[7],
                record.diagnosis.label(),
                record.probability,
                record.created_at,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id = id, username = %record.username, "Prediction stored");
        Ok(id)
    }

    /// Predictions for a user, newest first
    pub fn history(&self, username: &str) -> Result<Vec<PredictionRecord>, StoreError> {
        self.query_predictions(username, "DESC")
    }

    /// Predictions for a user, oldest first
    pub fn chart_series(&self, username: &str) -> Result<Vec<PredictionRecord>, StoreError> {
        self.query_predictions(username, "ASC")
    }

    fn query_predictions(
        &self,
        username: &str,
        order: &str,
    ) -> Result<Vec<PredictionRecord>, StoreError> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {} FROM predictions WHERE username = ?1 ORDER BY date {}, id {}",
            PREDICTION_COLUMNS, order, order
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![username], read_prediction)?;

        let mut records = Vec::new();
        for row in rows {
            let (record, label) = row?;
            let diagnosis = Diagnosis::from_label(label).ok_or(StoreError::CorruptLabel(label))?;
            records.push(PredictionRecord {
                diagnosis,
                ..record
            });
        }
        Ok(records)
    }
}

/// Decode one prediction row. The label is returned separately so an invalid
/// value can be reported as a store error.
fn read_prediction(row: &Row<'_>) -> rusqlite::Result<(PredictionRecord, i64)> {
    let mut values = [0.0; 8];
    for (i, value) in values.iter_mut().enumerate() {
        *value = row.get(i + 2)?;
    }
    let label: i64 = row.get(10)?;
    let record = PredictionRecord {
        id: Some(row.get(0)?),
        username: row.get(1)?,
        features: FeatureVector::new(values),
        diagnosis: Diagnosis::NoDiabetes,
        probability: row.get(11)?,
        created_at: row.get(12)?,
    };
    Ok((record, label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Store {
        let store = Store::new(dir.path().join("db").join("app.db"));
        store.init_schema().unwrap();
        store
    }

    fn record(username: &str, glucose: f64, diagnosis: Diagnosis, minutes: i64) -> PredictionRecord {
        let mut record = PredictionRecord::new(
            username.to_string(),
            FeatureVector::new([2.0, glucose, 80.0, 25.0, 100.0, 32.5, 0.6, 45.0]),
            diagnosis,
            Some(glucose / 2.0),
        );
        record.created_at = record.created_at + Duration::minutes(minutes);
        record
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init_schema().unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_users_are_unique() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store.insert_user("alice", "hash-1").unwrap());
        assert!(!store.insert_user("alice", "hash-2").unwrap());

        let user = store.find_user("alice").unwrap().unwrap();
        assert_eq!(user.password_hash, "hash-1");
        assert!(store.user_exists("alice").unwrap());
        assert!(!store.user_exists("bob").unwrap());
    }

    #[test]
    fn test_history_order_and_isolation() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.insert_prediction(&record("alice", 120.0, Diagnosis::NoDiabetes, 0)).unwrap();
        store.insert_prediction(&record("alice", 160.0, Diagnosis::Diabetes, 5)).unwrap();
        store.insert_prediction(&record("bob", 100.0, Diagnosis::NoDiabetes, 1)).unwrap();

        let history = store.history("alice").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].features.glucose(), 160.0);
        assert_eq!(history[0].diagnosis, Diagnosis::Diabetes);
        assert_eq!(history[0].probability, Some(80.0));
        assert!(history[0].id.is_some());

        let series = store.chart_series("alice").unwrap();
        assert_eq!(series[0].features.glucose(), 120.0);
        assert_eq!(series[1].features.glucose(), 160.0);

        assert!(store.history("carol").unwrap().is_empty());
    }

    #[test]
    fn test_missing_probability_round_trips_as_null() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut rec = record("alice", 150.0, Diagnosis::Diabetes, 0);
        rec.probability = None;
        store.insert_prediction(&rec).unwrap();

        let history = store.history("alice").unwrap();
        assert_eq!(history[0].probability, None);
        assert_eq!(history[0].features, rec.features);
    }
}
