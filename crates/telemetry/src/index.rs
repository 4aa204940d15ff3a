//! Per-Unit Telemetry Index
//!
//! Built once from a historical dataset and read-only afterwards, so lookups
//! hand out borrowed slices without locking.

use crate::parser::read_frames;
use crate::{SensorFrame, TelemetryError, RUL_MAX};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Sorted history of a single unit
#[derive(Debug, Clone)]
pub struct UnitHistory {
    /// Frames in ascending cycle order
    frames: Vec<SensorFrame>,
    /// `min(max_cycle - cycle, RUL_MAX)` per frame, evaluation only
    simulated_rul: Vec<f64>,
}

impl UnitHistory {
    fn new(mut frames: Vec<SensorFrame>) -> Self {
        frames.sort_by_key(|f| f.cycle);
        let max_cycle = frames.last().map(|f| f.cycle).unwrap_or(0);
        let simulated_rul = frames
            .iter()
            .map(|f| f64::from(max_cycle - f.cycle).min(RUL_MAX))
            .collect();
        Self {
            frames,
            simulated_rul,
        }
    }

    /// All frames, oldest first
    pub fn frames(&self) -> &[SensorFrame] {
        &self.frames
    }

    /// Frames recorded at or before `cycle`
    pub fn as_of(&self, cycle: u32) -> &[SensorFrame] {
        let end = self.frames.partition_point(|f| f.cycle <= cycle);
        &self.frames[..end]
    }

    /// Evaluation label for each frame, aligned with [`frames`](Self::frames)
    pub fn simulated_rul(&self) -> &[f64] {
        &self.simulated_rul
    }

    pub fn min_cycle(&self) -> u32 {
        self.frames.first().map(|f| f.cycle).unwrap_or(0)
    }

    pub fn max_cycle(&self) -> u32 {
        self.frames.last().map(|f| f.cycle).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Listing entry for a known unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSummary {
    pub unit_id: u32,
    pub min_cycle: u32,
    pub max_cycle: u32,
    /// Latest recorded cycle
    pub current_cycle: u32,
    pub record_count: usize,
}

/// Whole-dataset statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total_units: usize,
    pub total_records: usize,
    pub min_cycle: u32,
    pub max_cycle: u32,
    pub avg_cycles_per_unit: f64,
    pub first_unit: Option<u32>,
    pub last_unit: Option<u32>,
}

/// Immutable snapshot of historical telemetry grouped by unit
#[derive(Debug, Clone, Default)]
pub struct TelemetryIndex {
    units: BTreeMap<u32, UnitHistory>,
    total_records: usize,
}

impl TelemetryIndex {
    /// Group frames by unit and sort each unit by cycle
    pub fn build(frames: impl IntoIterator<Item = SensorFrame>) -> Self {
        let mut grouped: BTreeMap<u32, Vec<SensorFrame>> = BTreeMap::new();
        let mut total_records = 0;

        for frame in frames {
            total_records += 1;
            grouped.entry(frame.unit_id).or_default().push(frame);
        }

        let units: BTreeMap<u32, UnitHistory> = grouped
            .into_iter()
            .map(|(unit_id, frames)| (unit_id, UnitHistory::new(frames)))
            .collect();

        for (unit_id, history) in &units {
            let duplicated = history
                .frames
                .windows(2)
                .filter(|w| w[0].cycle == w[1].cycle)
                .count();
            if duplicated > 0 {
                warn!(unit_id, duplicated, "Unit has repeated cycle numbers");
            }
        }

        info!(
            units = units.len(),
            records = total_records,
            "Telemetry index built"
        );

        Self {
            units,
            total_records,
        }
    }

    /// Parse a dataset file and index it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        Ok(Self::build(read_frames(path)?))
    }

    /// Known unit ids, ascending
    pub fn unit_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.units.keys().copied()
    }

    pub fn contains(&self, unit_id: u32) -> bool {
        self.units.contains_key(&unit_id)
    }

    pub fn unit(&self, unit_id: u32) -> Option<&UnitHistory> {
        self.units.get(&unit_id)
    }

    /// Frames of a unit, optionally truncated to those recorded at or before `as_of`
    pub fn frames(&self, unit_id: u32, as_of: Option<u32>) -> Result<&[SensorFrame], TelemetryError> {
        let history = self
            .units
            .get(&unit_id)
            .ok_or(TelemetryError::UnitNotFound(unit_id))?;

        let frames = match as_of {
            Some(cycle) => history.as_of(cycle),
            None => history.frames(),
        };

        if frames.is_empty() {
            return Err(TelemetryError::NoFramesAsOf {
                unit_id,
                cycle: as_of.unwrap_or(0),
            });
        }

        Ok(frames)
    }

    /// The frame recorded at exactly `cycle`
    pub fn frame_at(&self, unit_id: u32, cycle: u32) -> Option<&SensorFrame> {
        let history = self.units.get(&unit_id)?;
        history
            .frames
            .binary_search_by_key(&cycle, |f| f.cycle)
            .ok()
            .map(|i| &history.frames[i])
    }

    /// Evaluation label of a recorded cycle
    pub fn simulated_rul(&self, unit_id: u32, cycle: u32) -> Option<f64> {
        let history = self.units.get(&unit_id)?;
        history
            .frames
            .binary_search_by_key(&cycle, |f| f.cycle)
            .ok()
            .map(|i| history.simulated_rul[i])
    }

    /// Summary of every unit, ascending by id
    pub fn list_units(&self) -> Vec<UnitSummary> {
        self.units
            .iter()
            .map(|(&unit_id, history)| UnitSummary {
                unit_id,
                min_cycle: history.min_cycle(),
                max_cycle: history.max_cycle(),
                current_cycle: history.max_cycle(),
                record_count: history.len(),
            })
            .collect()
    }

    pub fn summary(&self) -> DatasetSummary {
        let min_cycle = self.units.values().map(|h| h.min_cycle()).min().unwrap_or(0);
        let max_cycle = self.units.values().map(|h| h.max_cycle()).max().unwrap_or(0);
        let avg_cycles_per_unit = if self.units.is_empty() {
            0.0
        } else {
            self.units.values().map(|h| h.len() as f64).sum::<f64>() / self.units.len() as f64
        };

        DatasetSummary {
            total_units: self.units.len(),
            total_records: self.total_records,
            min_cycle,
            max_cycle,
            avg_cycles_per_unit,
            first_unit: self.units.keys().next().copied(),
            last_unit: self.units.keys().next_back().copied(),
        }
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
