//! Turbofan Telemetry
//!
//! Raw per-cycle sensor frames, the whitespace-delimited dataset parser and the
//! read-only per-unit index used for historical predictions and backtesting.

mod index;
mod parser;

pub use index::{DatasetSummary, TelemetryIndex, UnitHistory, UnitSummary};
pub use parser::{parse_frames, read_frames, COLUMN_COUNT};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of operational settings recorded per cycle
pub const SETTING_COUNT: usize = 3;

/// Number of sensor measurements recorded per cycle
pub const SENSOR_COUNT: usize = 21;

/// Cap applied to remaining-useful-life labels and predictions (cycles)
pub const RUL_MAX: f64 = 125.0;

/// One cycle's raw reading for a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub unit_id: u32,
    pub cycle: u32,
    /// Operational settings 1..=3
    pub settings: [f64; SETTING_COUNT],
    /// Sensor measurements 1..=21
    pub sensors: [f64; SENSOR_COUNT],
}

impl SensorFrame {
    /// Create a frame with all measurements set to zero
    pub fn zeroed(unit_id: u32, cycle: u32) -> Self {
        Self {
            unit_id,
            cycle,
            settings: [0.0; SETTING_COUNT],
            sensors: [0.0; SENSOR_COUNT],
        }
    }

    /// Sensor measurement by its 1-based index
    pub fn sensor(&self, index: usize) -> Option<f64> {
        index.checked_sub(1).and_then(|i| self.sensors.get(i)).copied()
    }

    /// Operational setting by its 1-based index
    pub fn setting(&self, index: usize) -> Option<f64> {
        index.checked_sub(1).and_then(|i| self.settings.get(i)).copied()
    }
}

/// Errors while loading or querying telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to read telemetry: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Unit {0} not found")]
    UnitNotFound(u32),

    #[error("Unit {unit_id} has no frames at or before cycle {cycle}")]
    NoFramesAsOf { unit_id: u32, cycle: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_based_accessors() {
        let mut frame = SensorFrame::zeroed(1, 1);
        frame.sensors[0] = 518.67;
        frame.sensors[20] = 23.419;
        frame.settings[2] = 100.0;

        assert_eq!(frame.sensor(1), Some(518.67));
        assert_eq!(frame.sensor(21), Some(23.419));
        assert_eq!(frame.setting(3), Some(100.0));
        assert_eq!(frame.sensor(0), None);
        assert_eq!(frame.sensor(22), None);
        assert_eq!(frame.setting(4), None);
    }
}
