//! Configuration management for the diabetes predictor

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub models: ModelsConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Primary model artifact (.json or .onnx)
    pub model_path: String,
    /// Scaler candidates, tried in order; none existing means no scaling
    #[serde(default = "default_scaler_paths")]
    pub scaler_paths: Vec<String>,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_scaler_paths() -> Vec<String> {
    vec![
        "model/scaler.json".to_string(),
        "model/preprocessor.json".to_string(),
    ]
}

fn default_onnx_threads() -> usize {
    1
}

/// Prediction history database
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: String,
}

/// Account rules
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// bcrypt work factor (4..=31)
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// Minimum password length accepted at signup
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_min_password_len() -> usize {
    6
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
            min_password_len: default_min_password_len(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load from `path` when given, the default file when it exists, and
    /// built-in defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(),
            None => Ok(Self::default()),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig {
                model_path: "model/diabetes_model.json".to_string(),
                scaler_paths: default_scaler_paths(),
                onnx_threads: 1,
            },
            database: DatabaseConfig {
                path: "db/diabetes_app.db".to_string(),
            },
            auth: AuthConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.models.model_path, "model/diabetes_model.json");
        assert_eq!(config.models.scaler_paths.len(), 2);
        assert_eq!(config.database.path, "db/diabetes_app.db");
        assert_eq!(config.auth.min_password_len, 6);
        assert_eq!(config.auth.bcrypt_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn test_load_from_path_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[models]
model_path = "artifacts/forest.json"

[database]
path = "data/app.db"

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();

        assert_eq!(config.models.model_path, "artifacts/forest.json");
        assert_eq!(config.models.scaler_paths, default_scaler_paths());
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.database.path, "data/app.db");
        assert_eq!(config.auth.min_password_len, 6);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(AppConfig::load_from_path(dir.path().join("absent.toml")).is_err());
    }
}
