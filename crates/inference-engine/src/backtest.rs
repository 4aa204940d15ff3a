//! Point-in-Time Backtesting
//!
//! Replays a unit's recorded history cycle by cycle, predicting from only the
//! frames available at each cycle and comparing against the simulated label.

use crate::service::{InferenceService, PredictRequest};
use crate::InferenceError;
use health::HealthStatus;
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Prediction at one replayed cycle
#[derive(Debug, Clone, Serialize)]
pub struct BacktestPoint {
    pub cycle: u32,
    pub predicted_rul: f64,
    pub actual_rul: f64,
    /// `predicted - actual`
    pub error: f64,
    pub confidence: f64,
    pub status: HealthStatus,
    pub model_fallback: bool,
}

/// Replay summary for one unit
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub unit_id: u32,
    pub start_cycle: u32,
    pub points: Vec<BacktestPoint>,
    /// 0.0 when no cycles were replayed
    pub rmse: f64,
    pub mae: f64,
}

impl BacktestReport {
    fn new(unit_id: u32, start_cycle: u32, points: Vec<BacktestPoint>) -> Self {
        let n = points.len() as f64;
        let (rmse, mae) = if points.is_empty() {
            (0.0, 0.0)
        } else {
            let sq: f64 = points.iter().map(|p| p.error * p.error).sum();
            let abs: f64 = points.iter().map(|p| p.error.abs()).sum();
            ((sq / n).sqrt(), abs / n)
        };
        Self {
            unit_id,
            start_cycle,
            points,
            rmse,
            mae,
        }
    }
}

impl InferenceService {
    /// Replay cycles `start_cycle ..= start_cycle + max_cycles - 1` of a unit
    pub async fn backtest(
        &self,
        unit_id: u32,
        start_cycle: u32,
        max_cycles: u32,
    ) -> Result<BacktestReport, InferenceError> {
        let index = self.require_index(unit_id)?;
        let history = index.unit(unit_id).ok_or_else(|| InferenceError::DataNotFound {
            unit_id,
            reason: "unit not in telemetry index".to_string(),
        })?;

        let last_cycle = start_cycle.saturating_add(max_cycles.saturating_sub(1));
        let cycles: Vec<(u32, f64)> = history
            .frames()
            .iter()
            .zip(history.simulated_rul())
            .filter(|(f, _)| max_cycles > 0 && f.cycle >= start_cycle && f.cycle <= last_cycle)
            .map(|(f, &rul)| (f.cycle, rul))
            .collect();

        // Windows are independent; build them in parallel off the async workers
        let builder = self.input_builder();
        let requests: Vec<PredictRequest> = cycles
            .iter()
            .map(|&(cycle, _)| PredictRequest::as_of(unit_id, cycle))
            .collect();
        let prepared = tokio::task::spawn_blocking(move || {
            requests
                .par_iter()
                .map(|request| builder.prepare(request))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| InferenceError::failed("backtest", e.to_string()))??;

        let mut points = Vec::with_capacity(prepared.len());
        for (sequence, &(cycle, actual_rul)) in prepared.into_iter().zip(&cycles) {
            let result = self.score(sequence, Instant::now()).await?;
            points.push(BacktestPoint {
                cycle,
                predicted_rul: result.predicted_rul,
                actual_rul,
                error: result.predicted_rul - actual_rul,
                confidence: result.confidence,
                status: result.status,
                model_fallback: result.degraded.model_fallback,
            });
        }

        let report = BacktestReport::new(unit_id, start_cycle, points);
        info!(
            unit_id,
            start_cycle,
            cycles = report.points.len(),
            rmse = report.rmse,
            mae = report.mae,
            "Backtest complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CpuBackend, ModelConfig, ModelContext, ModelParameters, SequenceRegressor};
    use fallback::FallbackEstimator;
    use std::sync::Arc;
    use telemetry::{SensorFrame, TelemetryIndex};

    fn index(cycles: u32) -> Arc<TelemetryIndex> {
        let frames = (1..=cycles).map(|c| {
            let mut frame = SensorFrame::zeroed(4, c);
            frame.sensors.iter_mut().for_each(|s| *s = c as f64 / 10.0);
            frame
        });
        Arc::new(TelemetryIndex::build(frames))
    }

    fn zero_head_service(cycles: u32) -> InferenceService {
        let config = ModelConfig::default();
        let mut params = ModelParameters::seeded(&config, 8);
        for name in ["regression_linear.weight", "regression_linear.bias"] {
            params.get_mut(name).unwrap().fill(0.0);
        }
        let model = SequenceRegressor::from_parameters(config, &params).unwrap();
        let context = ModelContext::new(Some(model), None).unwrap();
        InferenceService::new(context, Arc::new(CpuBackend)).with_index(index(cycles))
    }

    #[tokio::test]
    async fn test_backtest_window_and_metrics() {
        // 200 cycles: labels min(200 - c, 125)
        let service = zero_head_service(200);
        let report = service.backtest(4, 1, 50).await.unwrap();

        assert_eq!(report.points.len(), 50);
        assert_eq!(report.points[0].cycle, 1);
        assert_eq!(report.points[49].cycle, 50);
        // every label is capped at 125 in this range; prediction is 62.5
        assert!(report.points.iter().all(|p| p.actual_rul == 125.0));
        assert!((report.rmse - 62.5).abs() < 1e-9);
        assert!((report.mae - 62.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_backtest_clips_to_recorded_cycles() {
        let service = zero_head_service(30);
        let report = service.backtest(4, 21, 50).await.unwrap();

        assert_eq!(report.points.len(), 10);
        assert_eq!(report.points.last().unwrap().cycle, 30);
        assert_eq!(report.points.last().unwrap().actual_rul, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_pool_windows_match_request_path() {
        let service = zero_head_service(60);
        let builder = service.input_builder();

        for cycle in [1, 25, 60] {
            let request = PredictRequest::as_of(4, cycle);
            let direct = service.prepare(&request).unwrap();
            let builder = builder.clone();
            let offloaded = tokio::task::spawn_blocking(move || builder.prepare(&request))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(offloaded.sequence, direct.sequence);
            assert_eq!(offloaded.source, direct.source);
        }

        let report = service.backtest(4, 55, 10).await.unwrap();
        let cycles: Vec<u32> = report.points.iter().map(|p| p.cycle).collect();
        assert_eq!(cycles, (55..=60).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_backtest_empty_range() {
        let service = zero_head_service(10);
        let report = service.backtest(4, 100, 5).await.unwrap();
        assert!(report.points.is_empty());
        assert_eq!(report.rmse, 0.0);
    }

    #[tokio::test]
    async fn test_backtest_unknown_unit() {
        let service = zero_head_service(10);
        let err = service.backtest(5, 1, 10).await.unwrap_err();
        assert!(matches!(err, InferenceError::DataNotFound { unit_id: 5, .. }));
    }

    #[tokio::test]
    async fn test_backtest_in_degraded_mode() {
        let service = InferenceService::new(ModelContext::default(), Arc::new(CpuBackend))
            .with_fallback(FallbackEstimator::seeded(3))
            .with_index(index(20));
        let report = service.backtest(4, 1, 20).await.unwrap();

        assert_eq!(report.points.len(), 20);
        assert!(report.points.iter().all(|p| p.model_fallback));
        assert!(report
            .points
            .iter()
            .all(|p| (20.0..=120.0).contains(&p.predicted_rul)));
    }
}
