//! Whitespace-Delimited Dataset Parser
//!
//! Rows are `unit cycle setting_1..3 sensor_1..21`; trailing columns beyond
//! the 26th are ignored.

use crate::{SensorFrame, TelemetryError, SENSOR_COUNT, SETTING_COUNT};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Number of meaningful columns per row
pub const COLUMN_COUNT: usize = 2 + SETTING_COUNT + SENSOR_COUNT;

/// Parse frames from any reader
pub fn parse_frames<R: Read>(reader: R) -> Result<Vec<SensorFrame>, TelemetryError> {
    let mut frames = Vec::new();

    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;

        if line.trim().is_empty() {
            continue;
        }

        frames.push(parse_row(&line, line_no)?);
    }

    debug!("Parsed {} telemetry rows", frames.len());
    Ok(frames)
}

/// Read and parse a dataset file
pub fn read_frames(path: impl AsRef<Path>) -> Result<Vec<SensorFrame>, TelemetryError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading telemetry dataset");
    parse_frames(File::open(path)?)
}

fn parse_row(line: &str, line_no: usize) -> Result<SensorFrame, TelemetryError> {
    let mut values = [0.0f64; COLUMN_COUNT];
    let mut count = 0;

    for token in line.split_whitespace().take(COLUMN_COUNT) {
        values[count] = token.parse::<f64>().map_err(|_| TelemetryError::Parse {
            line: line_no,
            reason: format!("non-numeric token '{}' in column {}", token, count + 1),
        })?;
        count += 1;
    }

    if count < COLUMN_COUNT {
        return Err(TelemetryError::Parse {
            line: line_no,
            reason: format!("expected {} columns, found {}", COLUMN_COUNT, count),
        });
    }

    let unit_id = as_index(values[0], "unit", line_no)?;
    let cycle = as_index(values[1], "cycle", line_no)?;

    let mut settings = [0.0; SETTING_COUNT];
    settings.copy_from_slice(&values[2..2 + SETTING_COUNT]);
    let mut sensors = [0.0; SENSOR_COUNT];
    sensors.copy_from_slice(&values[2 + SETTING_COUNT..]);

    Ok(SensorFrame {
        unit_id,
        cycle,
        settings,
        sensors,
    })
}

/// Unit and cycle columns are written as floats by some exporters ("1.0")
fn as_index(value: f64, column: &str, line_no: usize) -> Result<u32, TelemetryError> {
    if value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
        return Err(TelemetryError::Parse {
            line: line_no,
            reason: format!("{} must be a non-negative integer, got {}", column, value),
        });
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn row(unit: u32, cycle: u32) -> String {
        let mut cols = vec![unit.to_string(), cycle.to_string()];
        cols.extend(["-0.0007", "-0.0004", "100.0"].iter().map(|s| s.to_string()));
        cols.extend((1..=SENSOR_COUNT).map(|i| format!("{}.5", i)));
        cols.join(" ")
    }

    #[test]
    fn test_parse_rows() {
        let data = format!("{}\n\n{}\n", row(1, 1), row(1, 2));
        let frames = parse_frames(data.as_bytes()).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].cycle, 2);
        assert_eq!(frames[0].setting(3), Some(100.0));
        assert_eq!(frames[0].sensor(1), Some(1.5));
        assert_eq!(frames[0].sensor(21), Some(21.5));
    }

    #[test]
    fn test_trailing_columns_ignored() {
        let data = format!("{}  extra 99\n", row(3, 7));
        let frames = parse_frames(data.as_bytes()).unwrap();
        assert_eq!(frames[0].unit_id, 3);
        assert_eq!(frames[0].sensor(21), Some(21.5));
    }

    #[test]
    fn test_short_row_rejected() {
        let err = parse_frames("1 1 0.0 0.0\n".as_bytes()).unwrap_err();
        match err {
            TelemetryError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_rejected() {
        let data = format!("{}\n{}", row(1, 1), row(1, 2).replacen("1.5", "abc", 1));
        let err = parse_frames(data.as_bytes()).unwrap_err();
        assert!(matches!(err, TelemetryError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", row(2, 1)).unwrap();
        writeln!(file, "{}", row(2, 2)).unwrap();

        let frames = read_frames(file.path()).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.unit_id == 2));
    }
}
