use crate::error::{DataError, Result};
use chrono::{NaiveDateTime, Timelike};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

pub const TIMESTAMP_COLUMN: &str = "TimeStamp";
pub const HEADBAND_COLUMN: &str = "HeadBandOn";
pub const ELEMENTS_COLUMN: &str = "Elements";
pub const HEART_RATE_COLUMN: &str = "Heart_Rate";

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Keep only rows where the headband reports skin contact
    pub filter_headband: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            filter_headband: true,
        }
    }
}

/// In-memory sample table of one Mind Monitor recording.
///
/// Rows are sorted by timestamp and unique: rows sharing a timestamp are
/// merged by averaging every numeric column.
#[derive(Debug, Clone)]
pub struct SessionTable {
    pub timestamps: Vec<NaiveDateTime>,
    pub elements: Vec<String>,
    names: Vec<String>,
    columns: HashMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_secs: f64,
    pub rows: usize,
    pub columns: usize,
}

impl SessionInfo {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_secs / 60.0
    }
}

pub fn parse_timestamp(row: usize, value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| DataError::InvalidTimestamp {
            row,
            value: trimmed.to_string(),
        })
}

fn parse_number(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(f64::NAN)
}

impl SessionTable {
    /// Build a table from already-parsed columns, sorting and merging duplicate timestamps
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<(String, Vec<f64>)>,
        elements: Vec<String>,
    ) -> Self {
        let n = timestamps.len();
        let elements = if elements.len() == n {
            elements
        } else {
            vec![String::new(); n]
        };
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let columns: HashMap<String, Vec<f64>> = columns
            .into_iter()
            .map(|(name, mut values)| {
                values.resize(n, f64::NAN);
                (name, values)
            })
            .collect();

        let table = SessionTable {
            timestamps,
            elements,
            names,
            columns,
        };
        table.sorted_and_merged()
    }

    fn sorted_and_merged(self) -> Self {
        let mut order: Vec<usize> = (0..self.timestamps.len()).collect();
        order.sort_by_key(|&i| self.timestamps[i]);

        // Ranges into `order` sharing a timestamp
        let mut groups: Vec<(usize, usize)> = Vec::new();
        for (pos, &idx) in order.iter().enumerate() {
            match groups.last_mut() {
                Some((start, end)) if self.timestamps[order[*start]] == self.timestamps[idx] => *end = pos + 1,
                _ => groups.push((pos, pos + 1)),
            }
        }

        let merged_rows = self.timestamps.len() - groups.len();
        let timestamps = groups.iter().map(|&(start, _)| self.timestamps[order[start]]).collect();
        let elements = groups
            .iter()
            .map(|&(start, end)| {
                order[start..end]
                    .iter()
                    .map(|&i| self.elements[i].as_str())
                    .find(|e| !e.is_empty())
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();

        let columns = if merged_rows == 0 {
            self.columns
                .into_iter()
                .map(|(name, values)| {
                    let sorted = order.iter().map(|&i| values[i]).collect();
                    (name, sorted)
                })
                .collect()
        } else {
            debug!("Merged {} rows with duplicate timestamps", merged_rows);
            self.columns
                .into_iter()
                .map(|(name, values)| {
                    let merged = groups
                        .iter()
                        .map(|&(start, end)| {
                            let (sum, count) = order[start..end]
                                .iter()
                                .map(|&i| values[i])
                                .filter(|v| v.is_finite())
                                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
                            if count == 0 {
                                f64::NAN
                            } else {
                                sum / count as f64
                            }
                        })
                        .collect();
                    (name, merged)
                })
                .collect()
        };

        SessionTable {
            timestamps,
            elements,
            names: self.names,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names in file order
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Names of columns starting with `prefix`, in file order
    pub fn columns_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.names
            .iter()
            .filter(|n| n.starts_with(prefix))
            .map(|n| n.as_str())
            .collect()
    }

    /// Seconds since the first row
    pub fn elapsed_seconds(&self) -> Vec<f64> {
        let Some(&origin) = self.timestamps.first() else {
            return Vec::new();
        };
        self.timestamps
            .iter()
            .map(|t| (*t - origin).num_microseconds().unwrap_or(0) as f64 / 1e6)
            .collect()
    }

    /// Seconds from midnight of the recording day to the first row
    pub fn clock_offset_secs(&self) -> f64 {
        self.timestamps
            .first()
            .map(|t| t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9)
            .unwrap_or(0.0)
    }

    /// Keep the rows where `mask` is true
    pub fn filter_rows(&self, mask: &[bool]) -> SessionTable {
        let keep: Vec<usize> = (0..self.len()).filter(|&i| mask.get(i) == Some(&true)).collect();
        SessionTable {
            timestamps: keep.iter().map(|&i| self.timestamps[i]).collect(),
            elements: keep.iter().map(|&i| self.elements[i].clone()).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), keep.iter().map(|&i| values[i]).collect()))
                .collect(),
        }
    }

    pub fn info(&self) -> Option<SessionInfo> {
        let start = *self.timestamps.first()?;
        let end = *self.timestamps.last()?;
        Some(SessionInfo {
            start,
            end,
            duration_secs: (end - start).num_milliseconds() as f64 / 1000.0,
            rows: self.len(),
            columns: self.names.len() + 1,
        })
    }
}

/// Read a Mind Monitor CSV export into a [`SessionTable`]
pub fn load_session(path: &Path, options: &LoadOptions) -> Result<SessionTable> {
    if !path.exists() {
        return Err(DataError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true) // Mind Monitor rows with markers can be short
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let ts_idx = headers
        .iter()
        .position(|h| h.trim() == TIMESTAMP_COLUMN)
        .ok_or_else(|| DataError::MissingColumn(TIMESTAMP_COLUMN.to_string()))?;
    let elements_idx = headers.iter().position(|h| h.trim() == ELEMENTS_COLUMN);
    let numeric: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ts_idx && Some(*i) != elements_idx)
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();

    let mut timestamps = Vec::new();
    let mut elements = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); numeric.len()];
    let mut skipped = 0usize;

    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let ts = match parse_timestamp(row, record.get(ts_idx).unwrap_or_default()) {
            Ok(ts) => ts,
            Err(e) => {
                debug!("Skipping row: {}", e);
                skipped += 1;
                continue;
            }
        };
        timestamps.push(ts);
        elements.push(
            elements_idx
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .trim()
                .to_string(),
        );
        for (slot, (col_idx, _)) in values.iter_mut().zip(&numeric) {
            slot.push(record.get(*col_idx).map(parse_number).unwrap_or(f64::NAN));
        }
    }

    if skipped > 0 {
        warn!("Skipped {} rows with unparsable timestamps", skipped);
    }
    if timestamps.is_empty() {
        return Err(DataError::Empty(path.display().to_string()));
    }

    let columns = numeric
        .into_iter()
        .map(|(_, name)| name)
        .zip(values)
        .collect();
    let mut table = SessionTable::new(timestamps, columns, elements);

    if options.filter_headband {
        if let Some(headband) = table.column(HEADBAND_COLUMN) {
            let mask: Vec<bool> = headband.iter().map(|&v| v == 1.0).collect();
            let before = table.len();
            table = table.filter_rows(&mask);
            debug!(
                "Headband filter kept {} of {} rows",
                table.len(),
                before
            );
            if table.is_empty() {
                return Err(DataError::Empty(format!(
                    "{} (no rows with {} = 1)",
                    path.display(),
                    HEADBAND_COLUMN
                )));
            }
        }
    }

    Ok(table)
}

/// Timestamp spacing diagnostics, used to show why the nominal rate is preferred
#[derive(Debug, Clone, Serialize)]
pub struct TimestampDiagnostics {
    pub rows: usize,
    pub duration_secs: f64,
    pub median_positive_step_ms: Option<f64>,
    pub zero_steps: usize,
    pub effective_rate_hz: Option<f64>,
}

pub fn timestamp_diagnostics(raw_timestamps: &[NaiveDateTime]) -> TimestampDiagnostics {
    let steps: Vec<f64> = raw_timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_microseconds().unwrap_or(0) as f64 / 1000.0)
        .collect();
    let positive: Vec<f64> = steps.iter().copied().filter(|&s| s > 0.0).collect();
    let duration_secs = match (raw_timestamps.first(), raw_timestamps.last()) {
        (Some(a), Some(b)) => (*b - *a).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    TimestampDiagnostics {
        rows: raw_timestamps.len(),
        duration_secs,
        median_positive_step_ms: crate::stats::median(&positive),
        zero_steps: steps.iter().filter(|&&s| s == 0.0).count(),
        effective_rate_hz: (duration_secs > 0.0).then(|| raw_timestamps.len() as f64 / duration_secs),
    }
}
