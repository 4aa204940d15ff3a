//! RUL Inference Engine
//!
//! Gated-convolution transformer regressor evaluated on CPU with ndarray,
//! pluggable forward backends, and the inference service that turns a unit
//! id or raw payload into a prediction with a health status.

mod backend;
mod backtest;
mod config;
mod executor;
mod layers;
mod params;
mod regressor;
mod service;

pub use backend::{CpuBackend, ForwardBackend};
pub use backtest::{BacktestPoint, BacktestReport};
pub use config::ModelConfig;
pub use executor::ExclusiveDeviceBackend;
pub use layers::positional_encoding;
pub use params::ModelParameters;
pub use regressor::SequenceRegressor;
pub use service::{
    DegradedFlags, InferenceService, ModelContext, PredictRequest, PredictionResult,
    ServiceInfo, UnitEstimate, MODEL_VERSION,
};

use data_validator::ValidationError;
use telemetry::TelemetryError;
use thiserror::Error;

/// Errors while loading model artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed model artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Parameter {name}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Malformed tensor {name}: {reason}")]
    Malformed { name: String, reason: String },

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("No data for unit {unit_id}: {reason}")]
    DataNotFound { unit_id: u32, reason: String },

    #[error("Invalid model input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Model weights not loaded")]
    ModelUnavailable,

    #[error("Scaler not loaded")]
    ScalerUnavailable,

    #[error("Inference failed at {stage}: {detail}")]
    InferenceFailed { stage: &'static str, detail: String },

    #[error("Inference timeout after {0}ms")]
    Timeout(u64),
}

impl InferenceError {
    /// Whether the caller caused the failure
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            InferenceError::DataNotFound { .. } | InferenceError::Validation(_)
        )
    }

    pub(crate) fn failed(stage: &'static str, detail: impl Into<String>) -> Self {
        InferenceError::InferenceFailed {
            stage,
            detail: detail.into(),
        }
    }
}

impl From<TelemetryError> for InferenceError {
    fn from(err: TelemetryError) -> Self {
        match err {
            TelemetryError::UnitNotFound(unit_id) => InferenceError::DataNotFound {
                unit_id,
                reason: "unit not in telemetry index".to_string(),
            },
            TelemetryError::NoFramesAsOf { unit_id, cycle } => InferenceError::DataNotFound {
                unit_id,
                reason: format!("no frames at or before cycle {cycle}"),
            },
            other => InferenceError::failed("telemetry", other.to_string()),
        }
    }
}
