//! Startup Wiring
//!
//! Resolves artifacts from the configured candidate lists and assembles an
//! [`InferenceService`]. The first candidate that exists and loads wins.

use crate::config::{BackendKind, ModelSection, ServiceConfig};
use crate::ServiceError;
use data_validator::{FeatureScaler, MinMaxScaler};
use fallback::FallbackEstimator;
use feature_engine::FEATURE_NAMES;
use inference_engine::{
    CpuBackend, ExclusiveDeviceBackend, ForwardBackend, InferenceService, ModelConfig,
    ModelContext, SequenceRegressor,
};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telemetry::TelemetryIndex;
use tracing::{debug, info, warn};

fn first_loadable<T, E: Display>(
    kind: &str,
    candidates: &[PathBuf],
    load: impl Fn(&Path) -> Result<T, E>,
) -> Option<T> {
    for path in candidates {
        if !path.exists() {
            debug!(kind, path = %path.display(), "Artifact candidate not present");
            continue;
        }
        match load(path) {
            Ok(artifact) => {
                info!(kind, path = %path.display(), "Loaded artifact");
                return Some(artifact);
            }
            Err(e) => warn!(kind, path = %path.display(), error = %e, "Artifact failed to load"),
        }
    }
    warn!(kind, candidates = candidates.len(), "No usable artifact found, running degraded");
    None
}

/// Load the first usable model artifact
pub fn load_model(candidates: &[PathBuf]) -> Option<SequenceRegressor> {
    first_loadable("model", candidates, |path| {
        SequenceRegressor::load(path, ModelConfig::default())
    })
}

/// Load the first usable scaler artifact whose feature layout matches
pub fn load_scaler(candidates: &[PathBuf]) -> Option<Arc<dyn FeatureScaler>> {
    first_loadable("scaler", candidates, |path| {
        let scaler = MinMaxScaler::load(path)?;
        scaler.check_features(&FEATURE_NAMES)?;
        Ok::<_, data_validator::ScalerError>(Arc::new(scaler) as Arc<dyn FeatureScaler>)
    })
}

/// Build the telemetry index when a dataset is configured
pub fn load_index(path: Option<&Path>) -> Result<Option<Arc<TelemetryIndex>>, ServiceError> {
    match path {
        Some(path) => {
            let index = TelemetryIndex::load(path)?;
            Ok(Some(Arc::new(index)))
        }
        None => {
            info!("No dataset configured, historical predictions use the request payload");
            Ok(None)
        }
    }
}

pub fn build_backend(section: &ModelSection) -> Result<Arc<dyn ForwardBackend>, ServiceError> {
    let backend: Arc<dyn ForwardBackend> = match section.backend {
        BackendKind::Cpu => Arc::new(CpuBackend),
        BackendKind::Exclusive => Arc::new(ExclusiveDeviceBackend::new(section.workers)?),
    };
    Ok(backend)
}

/// Assemble the inference service described by `config`
pub fn build_service(config: &ServiceConfig) -> Result<InferenceService, ServiceError> {
    let model = load_model(&config.artifacts.model_paths);
    let scaler = load_scaler(&config.artifacts.scaler_paths);
    let context = ModelContext::new(model, scaler)?;

    let backend = build_backend(&config.model)?;
    let fallback = FallbackEstimator::new(&config.fallback)?;

    let mut service = InferenceService::new(context, backend)
        .with_fallback(fallback)
        .with_thresholds(config.health.clone());
    if let Some(index) = load_index(config.dataset.path.as_deref())? {
        service = service.with_index(index);
    }
    Ok(service)
}
