//! RUL Service
//!
//! Configuration, logging and startup wiring around the inference engine.
//! Missing model or scaler artifacts degrade the service instead of failing
//! startup.

mod bootstrap;
mod config;

pub use bootstrap::{build_backend, build_service, load_index, load_model, load_scaler};
pub use config::{
    ArtifactsConfig, BackendKind, DatasetConfig, LoggingConfig, ModelSection, ServiceConfig,
};

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Errors while starting the service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Telemetry dataset error: {0}")]
    Telemetry(#[from] telemetry::TelemetryError),

    #[error("Scaler error: {0}")]
    Scaler(#[from] data_validator::ScalerError),

    #[error("Fallback error: {0}")]
    Fallback(#[from] fallback::FallbackError),

    #[error("Inference backend error: {0}")]
    Backend(#[from] inference_engine::InferenceError),
}

/// Install the global tracing subscriber, writing to stderr
pub fn init_logging(config: &LoggingConfig) -> Result<(), ServiceError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| ServiceError::Logging(format!("unknown level '{}'", config.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ServiceError::Logging(e.to_string()))
}
