//! Service Configuration
//!
//! Layered with the `config` crate: struct defaults, then an optional TOML
//! file, then `RUL__`-prefixed environment variables using `__` between
//! sections (e.g. `RUL__MODEL__BACKEND=exclusive`).

use crate::ServiceError;
use config::{Config, Environment, File, FileFormat};
use fallback::FallbackConfig;
use health::HealthThresholds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Candidate artifact locations, tried in order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub model_paths: Vec<PathBuf>,
    pub scaler_paths: Vec<PathBuf>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            model_paths: vec![
                PathBuf::from("models/transformer_rul_model_FD002.json"),
                PathBuf::from("../models/transformer_rul_model_FD002.json"),
            ],
            scaler_paths: vec![
                PathBuf::from("models/transformer_scaler.json"),
                PathBuf::from("../models/transformer_scaler.json"),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Historical telemetry file; no index is built when unset
    pub path: Option<PathBuf>,
}

/// Where forward passes run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Concurrent passes on the blocking pool
    #[default]
    Cpu,
    /// One device worker behind a bounded queue
    Exclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub backend: BackendKind,
    /// Queue depth of the exclusive backend (default: 4)
    pub workers: usize,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::Cpu,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn or error (default: info)
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub artifacts: ArtifactsConfig,
    pub dataset: DatasetConfig,
    pub model: ModelSection,
    pub fallback: FallbackConfig,
    pub health: HealthThresholds,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load from `path` (required when given) or an optional `rul-service.toml`
    pub fn load(path: Option<&Path>) -> Result<Self, ServiceError> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name("rul-service").format(FileFormat::Toml).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("RUL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("artifacts.model_paths")
                    .with_list_parse_key("artifacts.scaler_paths"),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
