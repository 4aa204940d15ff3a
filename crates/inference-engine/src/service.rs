//! Inference Service
//!
//! Turns a unit id or raw payload into a validated model input, runs the
//! regressor through the configured backend and derives status and
//! confidence. Missing model weights switch to the fallback estimator; a
//! missing scaler skips scaling. Both conditions are flagged on every result.

use crate::backend::ForwardBackend;
use crate::config::ModelConfig;
use crate::regressor::SequenceRegressor;
use crate::InferenceError;
use chrono::{DateTime, Utc};
use data_validator::{FeatureScaler, ScalerError, SequenceValidator, TensorReport};
use fallback::FallbackEstimator;
use feature_engine::{
    FeaturePipeline, RawPayload, Sequence, SequenceWindower, DROPPED_SENSORS, DROPPED_SETTINGS,
    FEATURE_DIMENSION, FEATURE_NAMES, SELECTED_SENSORS, SELECTED_SETTINGS, SEQUENCE_LENGTH,
};
use health::{HealthStatus, HealthThresholds};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::{TelemetryIndex, UnitSummary};
use tracing::{debug, info, warn};

/// Version tag stamped on every prediction
pub const MODEL_VERSION: &str = "transformer-gcu-fd002-v2.1";

/// Model and scaler state bound once at startup
#[derive(Debug, Clone, Default)]
pub struct ModelContext {
    model: Option<Arc<SequenceRegressor>>,
    pipeline: FeaturePipeline,
}

impl ModelContext {
    /// Bind loaded artifacts; either may be absent
    pub fn new(
        model: Option<SequenceRegressor>,
        scaler: Option<Arc<dyn FeatureScaler>>,
    ) -> Result<Self, ScalerError> {
        if model.is_none() {
            warn!("Model weights unavailable, predictions will use the fallback estimator");
        }
        let pipeline = match scaler {
            Some(scaler) => FeaturePipeline::with_scaler(scaler)?,
            None => {
                warn!("Scaler unavailable, features will not be scaled");
                FeaturePipeline::unscaled()
            }
        };
        Ok(Self {
            model: model.map(Arc::new),
            pipeline,
        })
    }

    pub fn model(&self) -> Option<&Arc<SequenceRegressor>> {
        self.model.as_ref()
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn require_model(&self) -> Result<&Arc<SequenceRegressor>, InferenceError> {
        self.model.as_ref().ok_or(InferenceError::ModelUnavailable)
    }

    pub fn require_scaler(&self) -> Result<(), InferenceError> {
        if self.pipeline.is_scaling() {
            Ok(())
        } else {
            Err(InferenceError::ScalerUnavailable)
        }
    }
}

fn default_use_real_data() -> bool {
    true
}

/// Prediction request as received from callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub unit_number: u32,
    /// Prefer the unit's recorded history over the payload
    #[serde(default = "default_use_real_data")]
    pub use_real_data: bool,
    #[serde(default)]
    pub sensor_data: RawPayload,
    /// Only use history recorded at or before this cycle
    #[serde(default)]
    pub as_of_cycle: Option<u32>,
}

impl PredictRequest {
    /// Predict from a unit's full recorded history
    pub fn historical(unit_number: u32) -> Self {
        Self {
            unit_number,
            use_real_data: true,
            sensor_data: RawPayload::default(),
            as_of_cycle: None,
        }
    }

    /// Predict from a unit's history truncated at `cycle`
    pub fn as_of(unit_number: u32, cycle: u32) -> Self {
        Self {
            as_of_cycle: Some(cycle),
            ..Self::historical(unit_number)
        }
    }

    /// Predict from a single raw reading
    pub fn payload(unit_number: u32, sensor_data: RawPayload) -> Self {
        Self {
            unit_number,
            use_real_data: false,
            sensor_data,
            as_of_cycle: None,
        }
    }
}

/// Which degradations affected a prediction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedFlags {
    /// RUL came from the fallback estimator
    pub model_fallback: bool,
    /// Features were not scaled
    pub unscaled: bool,
    /// Zero-filled payload fields
    pub defaulted_fields: usize,
}

impl DegradedFlags {
    pub fn is_degraded(&self) -> bool {
        self.model_fallback || self.unscaled || self.defaulted_fields > 0
    }
}

/// Prediction returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Cycles, clamped to `[0, 125]`, 2 decimals
    pub predicted_rul: f64,
    /// Heuristic in `[0.6, 0.95]`, 3 decimals
    pub confidence: f64,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub model_version: String,
    pub degraded: DegradedFlags,
    pub latency_ms: f64,
}

/// A listed unit with its latest estimate or the reason it has none
#[derive(Debug, Clone, Serialize)]
pub struct UnitEstimate {
    #[serde(flatten)]
    pub unit: UnitSummary,
    pub prediction: Option<PredictionResult>,
    pub error: Option<String>,
}

/// Loaded state and fixed contract of the service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub model_version: &'static str,
    pub model_loaded: bool,
    pub scaler_loaded: bool,
    pub index_loaded: bool,
    pub backend: &'static str,
    pub architecture: ModelConfig,
    pub parameter_count: Option<usize>,
    pub sequence_length: usize,
    pub feature_names: Vec<&'static str>,
    pub selected_sensors: Vec<usize>,
    pub selected_settings: Vec<usize>,
    pub dropped_sensors: Vec<usize>,
    pub dropped_settings: Vec<usize>,
    pub units_available: usize,
    pub fallback_range: (f64, f64),
    pub fallback_seeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SequenceSource {
    History,
    Payload,
}

impl SequenceSource {
    fn as_str(&self) -> &'static str {
        match self {
            SequenceSource::History => "history",
            SequenceSource::Payload => "payload",
        }
    }
}

/// Validated model input for one request
#[derive(Debug, Clone)]
pub(crate) struct PreparedSequence {
    pub(crate) unit_id: u32,
    pub(crate) sequence: Sequence,
    pub(crate) source: SequenceSource,
}

/// Feature extraction, windowing and validation state
#[derive(Debug, Clone)]
pub(crate) struct InputBuilder {
    pipeline: FeaturePipeline,
    index: Option<Arc<TelemetryIndex>>,
    windower: SequenceWindower,
    validator: SequenceValidator,
}

impl InputBuilder {
    pub(crate) fn prepare(&self, request: &PredictRequest) -> Result<PreparedSequence, InferenceError> {
        let unit_id = request.unit_number;
        let pipeline = &self.pipeline;

        let (sequence, source) = match (&self.index, request.use_real_data) {
            (Some(index), true) => {
                let frames = index.frames(unit_id, request.as_of_cycle)?;
                let history = pipeline.extract_history(frames);
                (self.windower.window(&history), SequenceSource::History)
            }
            (None, true) => {
                debug!(unit_id, "No telemetry index loaded, predicting from payload");
                let vector = pipeline.extract_payload(&request.sensor_data);
                (self.windower.replicate(&vector), SequenceSource::Payload)
            }
            (_, false) => {
                let vector = pipeline.extract_payload(&request.sensor_data);
                (self.windower.replicate(&vector), SequenceSource::Payload)
            }
        };

        self.validator.validate(sequence.view())?;

        Ok(PreparedSequence {
            unit_id,
            sequence,
            source,
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// RUL inference over a bound [`ModelContext`]
pub struct InferenceService {
    context: ModelContext,
    index: Option<Arc<TelemetryIndex>>,
    backend: Arc<dyn ForwardBackend>,
    fallback: FallbackEstimator,
    thresholds: HealthThresholds,
    windower: SequenceWindower,
    validator: SequenceValidator,
}

impl InferenceService {
    /// Create a service without a telemetry index
    pub fn new(context: ModelContext, backend: Arc<dyn ForwardBackend>) -> Self {
        info!(
            model_loaded = context.model.is_some(),
            scaler_loaded = context.pipeline.is_scaling(),
            backend = backend.name(),
            "Creating inference service"
        );
        Self {
            context,
            index: None,
            backend,
            fallback: FallbackEstimator::default(),
            thresholds: HealthThresholds::default(),
            windower: SequenceWindower::new(SEQUENCE_LENGTH),
            validator: SequenceValidator::new(SEQUENCE_LENGTH, FEATURE_DIMENSION),
        }
    }

    pub fn with_index(mut self, index: Arc<TelemetryIndex>) -> Self {
        info!(units = index.unit_count(), "Telemetry index attached");
        self.index = Some(index);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackEstimator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub fn index(&self) -> Option<&TelemetryIndex> {
        self.index.as_deref()
    }

    /// Predict RUL for a request
    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictionResult, InferenceError> {
        let start = Instant::now();
        let prepared = self.prepare(request)?;
        self.score(prepared, start).await
    }

    /// Predict, failing with `Timeout` once `deadline` elapses
    pub async fn predict_within(
        &self,
        request: &PredictRequest,
        deadline: Duration,
    ) -> Result<PredictionResult, InferenceError> {
        tokio::time::timeout(deadline, self.predict(request))
            .await
            .map_err(|_| InferenceError::Timeout(deadline.as_millis() as u64))?
    }

    /// Build and validate the model input for a request
    pub(crate) fn prepare(&self, request: &PredictRequest) -> Result<PreparedSequence, InferenceError> {
        self.input_builder().prepare(request)
    }

    /// Owned copy of the input assembly state, for use off the async runtime
    pub(crate) fn input_builder(&self) -> InputBuilder {
        InputBuilder {
            pipeline: self.context.pipeline.clone(),
            index: self.index.clone(),
            windower: self.windower,
            validator: self.validator,
        }
    }

    /// Run the forward pass (or fallback) and derive the result
    pub(crate) async fn score(
        &self,
        prepared: PreparedSequence,
        start: Instant,
    ) -> Result<PredictionResult, InferenceError> {
        let PreparedSequence {
            unit_id,
            sequence,
            source,
        } = prepared;

        let unscaled = match self.context.require_scaler() {
            Ok(()) => sequence.is_unscaled(),
            Err(e) => {
                debug!(unit_id, reason = %e, "Predicting on unscaled features");
                true
            }
        };

        let mut degraded = DegradedFlags {
            model_fallback: false,
            unscaled,
            defaulted_fields: sequence.defaulted_fields(),
        };

        let raw_rul = match self.context.require_model() {
            Ok(model) => {
                let rul = self
                    .backend
                    .forward(Arc::clone(model), sequence.into_array())
                    .await?;
                f64::from(rul)
            }
            Err(e) => {
                degraded.model_fallback = true;
                metrics::counter!("rul_fallback_predictions_total").increment(1);
                let rul = self.fallback.estimate();
                debug!(unit_id, reason = %e, rul, "Using fallback estimate");
                rul
            }
        };

        // Status and confidence use the clamped estimate; rounding is for the response only
        let assessment = self.thresholds.assess(raw_rul);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        metrics::counter!(
            "rul_predictions_total",
            "status" => assessment.status.as_str(),
            "source" => source.as_str()
        )
        .increment(1);
        metrics::histogram!("rul_inference_latency_ms").record(latency_ms);

        info!(
            unit_id,
            rul = assessment.rul,
            status = %assessment.status,
            source = source.as_str(),
            degraded = degraded.is_degraded(),
            latency_ms,
            "Prediction complete"
        );

        Ok(PredictionResult {
            predicted_rul: round_to(assessment.rul, 2),
            confidence: round_to(assessment.confidence, 3),
            status: assessment.status,
            timestamp: Utc::now(),
            model_version: MODEL_VERSION.to_string(),
            degraded,
            latency_ms,
        })
    }

    /// Known units, ascending by id
    pub fn list_units(&self) -> Vec<UnitSummary> {
        self.index
            .as_ref()
            .map(|index| index.list_units())
            .unwrap_or_default()
    }

    /// Known units with a prediction from each unit's latest window
    pub async fn estimate_units(&self) -> Vec<UnitEstimate> {
        let mut estimates = Vec::new();
        for unit in self.list_units() {
            let estimate = match self.predict(&PredictRequest::historical(unit.unit_id)).await {
                Ok(prediction) => UnitEstimate {
                    unit,
                    prediction: Some(prediction),
                    error: None,
                },
                Err(e) => {
                    warn!(unit_id = unit.unit_id, error = %e, "Unit estimate failed");
                    UnitEstimate {
                        unit,
                        prediction: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            estimates.push(estimate);
        }
        estimates
    }

    pub fn info(&self) -> ServiceInfo {
        let model = self.context.model();
        ServiceInfo {
            model_version: MODEL_VERSION,
            model_loaded: model.is_some(),
            scaler_loaded: self.context.pipeline.is_scaling(),
            index_loaded: self.index.is_some(),
            backend: self.backend.name(),
            architecture: model.map(|m| m.config().clone()).unwrap_or_default(),
            parameter_count: model.map(|m| m.parameter_count()),
            sequence_length: self.windower.length(),
            feature_names: FEATURE_NAMES.to_vec(),
            selected_sensors: SELECTED_SENSORS.to_vec(),
            selected_settings: SELECTED_SETTINGS.to_vec(),
            dropped_sensors: DROPPED_SENSORS.to_vec(),
            dropped_settings: DROPPED_SETTINGS.to_vec(),
            units_available: self.index.as_ref().map_or(0, |index| index.unit_count()),
            fallback_range: self.fallback.range(),
            fallback_seeded: self.fallback.is_seeded(),
        }
    }

    /// Diagnostic report of the window a unit would be predicted from
    pub fn inspect_unit(&self, unit_id: u32, as_of: Option<u32>) -> Result<TensorReport, InferenceError> {
        let index = self.require_index(unit_id)?;
        let frames = index.frames(unit_id, as_of)?;
        let history = self.context.pipeline.extract_history(frames);
        let sequence = self.windower.window(&history);
        Ok(TensorReport::inspect(sequence.view(), &self.validator))
    }

    pub(crate) fn require_index(&self, unit_id: u32) -> Result<&TelemetryIndex, InferenceError> {
        self.index
            .as_deref()
            .ok_or_else(|| InferenceError::DataNotFound {
                unit_id,
                reason: "no telemetry index loaded".to_string(),
            })
    }
}
