//! Status Derivation and Confidence Heuristic

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lower bound of the confidence heuristic
pub const MIN_CONFIDENCE: f64 = 0.6;

/// Upper bound of the confidence heuristic
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Health status derived from a RUL estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status thresholds (cycles)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// RUL strictly below this is critical (default: 50)
    pub critical_below: f64,
    /// RUL strictly below this is a warning (default: 100)
    pub warning_below: f64,
    /// Cap on RUL estimates (default: 125)
    pub rul_max: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_below: 50.0,
            warning_below: 100.0,
            rul_max: 125.0,
        }
    }
}

/// Heuristic confidence for a RUL estimate
///
/// Peaks at `rul_max / 2` and decays linearly toward both extremes, bounded to
/// `[MIN_CONFIDENCE, MAX_CONFIDENCE]`. This is a proxy, not a calibrated
/// probability.
pub fn confidence(rul: f64, rul_max: f64) -> f64 {
    (1.0 - (rul - rul_max / 2.0).abs() / rul_max).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Result of assessing one estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthAssessment {
    /// Estimate clamped to `[0, rul_max]`
    pub rul: f64,
    pub status: HealthStatus,
    pub confidence: f64,
}

impl HealthThresholds {
    /// Status for a RUL estimate
    pub fn status(&self, rul: f64) -> HealthStatus {
        if rul < self.critical_below {
            HealthStatus::Critical
        } else if rul < self.warning_below {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }

    /// Clamp a raw estimate and derive status and confidence from it
    pub fn assess(&self, raw_rul: f64) -> HealthAssessment {
        let rul = if raw_rul.is_nan() {
            0.0
        } else {
            raw_rul.clamp(0.0, self.rul_max)
        };
        let assessment = HealthAssessment {
            rul,
            status: self.status(rul),
            confidence: confidence(rul, self.rul_max),
        };
        debug!(
            rul,
            status = %assessment.status,
            confidence = assessment.confidence,
            "Assessed RUL estimate"
        );
        assessment
    }
}
