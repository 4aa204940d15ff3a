//! Exclusive Device Executor
//!
//! Serializes forward passes onto one dedicated worker thread through a
//! bounded queue, for deployments where the numeric device cannot be shared.

use crate::backend::ForwardBackend;
use crate::regressor::SequenceRegressor;
use crate::InferenceError;
use async_trait::async_trait;
use ndarray::Array2;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

struct ForwardJob {
    model: Arc<SequenceRegressor>,
    input: Array2<f32>,
    reply: oneshot::Sender<Result<f32, InferenceError>>,
}

/// Single-worker backend with a queue of `depth` pending jobs
pub struct ExclusiveDeviceBackend {
    sender: mpsc::Sender<ForwardJob>,
    depth: usize,
}

impl ExclusiveDeviceBackend {
    /// Spawn the device worker
    pub fn new(depth: usize) -> Result<Self, InferenceError> {
        let depth = depth.max(1);
        let (sender, mut receiver) = mpsc::channel::<ForwardJob>(depth);

        std::thread::Builder::new()
            .name("rul-device".to_string())
            .spawn(move || {
                info!(depth, "Device worker started");
                while let Some(job) = receiver.blocking_recv() {
                    let result = job.model.forward(job.input.view());
                    if job.reply.send(result).is_err() {
                        debug!("Forward result dropped, caller went away");
                    }
                }
                info!("Device worker stopped");
            })
            .map_err(|e| InferenceError::failed("device_executor", e.to_string()))?;

        Ok(Self { sender, depth })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[async_trait]
impl ForwardBackend for ExclusiveDeviceBackend {
    fn name(&self) -> &'static str {
        "exclusive"
    }

    async fn forward(
        &self,
        model: Arc<SequenceRegressor>,
        input: Array2<f32>,
    ) -> Result<f32, InferenceError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ForwardJob { model, input, reply })
            .await
            .map_err(|_| InferenceError::failed("device_executor", "worker stopped"))?;

        response
            .await
            .map_err(|_| InferenceError::failed("device_executor", "worker dropped job"))?
    }
}
