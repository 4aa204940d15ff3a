//! Forward Pass Backends

use crate::regressor::SequenceRegressor;
use crate::InferenceError;
use async_trait::async_trait;
use ndarray::Array2;
use std::sync::Arc;
use tracing::debug;

/// Executes one regressor forward pass
#[async_trait]
pub trait ForwardBackend: Send + Sync {
    /// Backend name reported by service info
    fn name(&self) -> &'static str;

    async fn forward(
        &self,
        model: Arc<SequenceRegressor>,
        input: Array2<f32>,
    ) -> Result<f32, InferenceError>;
}

/// Runs each forward pass on the blocking thread pool, fully concurrent
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

#[async_trait]
impl ForwardBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn forward(
        &self,
        model: Arc<SequenceRegressor>,
        input: Array2<f32>,
    ) -> Result<f32, InferenceError> {
        debug!(rows = input.nrows(), "Dispatching forward pass to blocking pool");
        tokio::task::spawn_blocking(move || model.forward(input.view()))
            .await
            .map_err(|e| InferenceError::failed("cpu_backend", e.to_string()))?
    }
}
