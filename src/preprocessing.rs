use crate::data_loading::SessionTable;
use crate::error::{DataError, Result};
use crate::spectral::highpass;
use crate::stats;
use chrono::NaiveDateTime;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;

/// Muse electrode sites in headband order
pub const EEG_CHANNELS: [&str; 4] = ["TP9", "AF7", "AF8", "TP10"];
pub const DEFAULT_SFREQ: f64 = 256.0;

const RAW_PREFIX: &str = "RAW_";
const HSI_PREFIX: &str = "HSI_";

#[derive(Debug, Clone)]
pub struct QualityFilter {
    pub table: SessionTable,
    pub mask: Vec<bool>,
    pub kept: usize,
    pub total: usize,
    /// True when no row passed and the unfiltered table was returned
    pub fell_back: bool,
}

/// Keep rows whose horseshoe indicators are all good or medium (<= 2), or
/// all good (== 1) with `require_all_good`. Falls back to the unfiltered
/// table when nothing passes.
pub fn filter_eeg_quality(table: &SessionTable, require_all_good: bool) -> QualityFilter {
    let hsi_cols = table.columns_with_prefix(HSI_PREFIX);
    let total = table.len();
    if hsi_cols.is_empty() {
        debug!("No HSI columns, skipping quality filter");
        return QualityFilter {
            table: table.clone(),
            mask: vec![true; total],
            kept: total,
            total,
            fell_back: false,
        };
    }

    let columns: Vec<&[f64]> = hsi_cols.iter().filter_map(|c| table.column(c)).collect();
    let mask: Vec<bool> = (0..total)
        .map(|row| {
            columns.iter().all(|col| {
                let v = col[row];
                if require_all_good {
                    v == 1.0
                } else {
                    v <= 2.0
                }
            })
        })
        .collect();
    let kept = mask.iter().filter(|&&m| m).count();

    if kept == 0 {
        warn!("No rows passed the HSI quality filter, using unfiltered data");
        return QualityFilter {
            table: table.clone(),
            mask,
            kept: total,
            total,
            fell_back: true,
        };
    }

    debug!("HSI filter kept {}/{} rows", kept, total);
    QualityFilter {
        table: table.filter_rows(&mask),
        mask,
        kept,
        total,
        fell_back: false,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelQuality {
    pub channel: String,
    pub mean_hsi: f64,
    pub good_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HsiStatistics {
    pub channels: Vec<ChannelQuality>,
    pub overall_mean: f64,
    /// Fraction of rows where every electrode reports good contact
    pub overall_good_ratio: f64,
}

pub fn hsi_statistics(table: &SessionTable) -> Option<HsiStatistics> {
    let hsi_cols = table.columns_with_prefix(HSI_PREFIX);
    if hsi_cols.is_empty() || table.is_empty() {
        return None;
    }

    let mut channels = Vec::with_capacity(hsi_cols.len());
    let mut all_good = vec![true; table.len()];
    for name in &hsi_cols {
        let values = table.column(name)?;
        let valid = stats::finite(values);
        if valid.is_empty() {
            continue;
        }
        let good = valid.iter().filter(|&&v| v == 1.0).count();
        for (flag, &v) in all_good.iter_mut().zip(values) {
            *flag &= v == 1.0;
        }
        channels.push(ChannelQuality {
            channel: name.trim_start_matches(HSI_PREFIX).to_string(),
            mean_hsi: stats::mean(&valid)?,
            good_ratio: good as f64 / valid.len() as f64,
        });
    }
    if channels.is_empty() {
        return None;
    }

    let means: Vec<f64> = channels.iter().map(|c| c.mean_hsi).collect();
    Some(HsiStatistics {
        overall_mean: stats::mean(&means)?,
        overall_good_ratio: all_good.iter().filter(|&&g| g).count() as f64 / table.len() as f64,
        channels,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct EegOptions {
    /// Nominal hardware sampling rate; timestamps are not used for EEG timing
    pub sfreq: f64,
    pub highpass_hz: Option<f64>,
    pub filter_order: usize,
}

impl Default for EegOptions {
    fn default() -> Self {
        EegOptions {
            sfreq: DEFAULT_SFREQ,
            highpass_hz: Some(1.0),
            filter_order: 4,
        }
    }
}

/// Raw EEG as a channels x samples matrix at a fixed sampling rate
#[derive(Debug, Clone)]
pub struct EegRecording {
    pub channels: Vec<String>,
    pub data: Array2<f64>,
    pub sfreq: f64,
    pub start: Option<NaiveDateTime>,
}

impl EegRecording {
    pub fn new(channels: Vec<String>, data: Array2<f64>, sfreq: f64) -> Self {
        EegRecording {
            channels,
            data,
            sfreq,
            start: None,
        }
    }

    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    /// Accepts either the site name (`AF7`) or the CSV column name (`RAW_AF7`)
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        let site = name.trim_start_matches(RAW_PREFIX);
        self.channels.iter().position(|c| c == site)
    }

    pub fn channel(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.channel_index(name).map(|i| self.data.row(i))
    }

    /// Sample times in seconds from the start of the recording
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_samples()).map(|i| i as f64 / self.sfreq).collect()
    }

    /// Samples `[start, end)` of every channel
    pub fn slice(&self, start: usize, end: usize) -> EegRecording {
        let end = end.min(self.n_samples());
        let start = start.min(end);
        EegRecording {
            channels: self.channels.clone(),
            data: self.data.slice(ndarray::s![.., start..end]).to_owned(),
            sfreq: self.sfreq,
            start: self.start,
        }
    }
}

/// Build the EEG matrix from the `RAW_*` columns, interpolating gaps and
/// applying a zero-phase high-pass when configured.
pub fn prepare_eeg(table: &SessionTable, options: &EegOptions) -> Result<EegRecording> {
    let raw_cols = table.columns_with_prefix(RAW_PREFIX);
    if raw_cols.is_empty() {
        return Err(DataError::MissingColumn(format!("{}*", RAW_PREFIX)));
    }

    let mut names = Vec::new();
    let mut signals: Vec<Vec<f64>> = Vec::new();
    for col in raw_cols {
        let mut values = table.require(col)?.to_vec();
        if !values.iter().any(|v| v.is_finite()) {
            warn!("Column {} has no numeric samples, skipping", col);
            continue;
        }
        stats::interpolate_gaps(&mut values);

        if let Some(cutoff) = options.highpass_hz {
            match highpass(&values, cutoff, options.sfreq, options.filter_order) {
                Some(filtered) => values = filtered,
                None => debug!("High-pass skipped for {} ({} samples)", col, values.len()),
            }
        }
        names.push(col.trim_start_matches(RAW_PREFIX).to_string());
        signals.push(values);
    }

    let n_samples = signals.first().map(|s| s.len()).unwrap_or(0);
    if signals.is_empty() || n_samples < 2 {
        return Err(DataError::InsufficientData(format!(
            "{} EEG samples across {} channels",
            n_samples,
            signals.len()
        )));
    }

    let mut data = Array2::<f64>::zeros((signals.len(), n_samples));
    for (mut row, signal) in data.rows_mut().into_iter().zip(signals) {
        row.assign(&Array1::from(signal));
    }

    debug!(
        "EEG matrix: {} channels x {} samples at {} Hz nominal",
        names.len(),
        n_samples,
        options.sfreq
    );

    Ok(EegRecording {
        channels: names,
        data,
        sfreq: options.sfreq,
        start: table.timestamps.first().copied(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn table_with(columns: Vec<(&str, Vec<f64>)>) -> SessionTable {
        let n = columns[0].1.len();
        let origin = crate::data_loading::parse_timestamp(0, "2025-01-01 00:00:00").unwrap();
        let timestamps = (0..n)
            .map(|i| origin + Duration::milliseconds(i as i64 * 4))
            .collect();
        SessionTable::new(
            timestamps,
            columns
                .into_iter()
                .map(|(name, values)| (name.to_string(), values))
                .collect(),
            Vec::new(),
        )
    }

    #[test]
    fn test_quality_filter_modes() {
        let table = table_with(vec![
            ("HSI_TP9", vec![1.0, 2.0, 4.0, 1.0]),
            ("HSI_AF7", vec![1.0, 1.0, 1.0, 2.0]),
        ]);
        let medium = filter_eeg_quality(&table, false);
        assert_eq!(medium.kept, 3);
        assert_eq!(medium.mask, vec![true, true, false, true]);

        let strict = filter_eeg_quality(&table, true);
        assert_eq!(strict.kept, 1);
        assert_eq!(strict.table.len(), 1);
    }

    #[test]
    fn test_quality_filter_falls_back_when_nothing_passes() {
        let table = table_with(vec![("HSI_TP9", vec![4.0, 4.0, 4.0])]);
        let result = filter_eeg_quality(&table, false);
        assert!(result.fell_back);
        assert_eq!(result.table.len(), 3);
    }

    #[test]
    fn test_hsi_statistics() {
        let table = table_with(vec![
            ("HSI_TP9", vec![1.0, 1.0, 2.0, 4.0]),
            ("HSI_AF7", vec![1.0, 1.0, 1.0, 1.0]),
        ]);
        let stats = hsi_statistics(&table).unwrap();
        assert_eq!(stats.channels[0].channel, "TP9");
        assert!((stats.channels[0].mean_hsi - 2.0).abs() < 1e-12);
        assert!((stats.channels[0].good_ratio - 0.5).abs() < 1e-12);
        assert!((stats.overall_mean - 1.5).abs() < 1e-12);
        assert!((stats.overall_good_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_prepare_eeg_interpolates_and_names_channels() {
        let table = table_with(vec![
            ("RAW_TP9", vec![1.0, f64::NAN, 3.0, 4.0]),
            ("RAW_AF7", vec![0.0, 0.0, 0.0, 0.0]),
            ("Alpha_TP9", vec![0.5; 4]),
        ]);
        let options = EegOptions {
            highpass_hz: None,
            ..EegOptions::default()
        };
        let eeg = prepare_eeg(&table, &options).unwrap();
        assert_eq!(eeg.channels, vec!["TP9", "AF7"]);
        assert_eq!(eeg.n_samples(), 4);
        assert_eq!(eeg.channel("RAW_TP9").unwrap()[1], 2.0);
        assert_eq!(eeg.sfreq, DEFAULT_SFREQ);
    }

    #[test]
    fn test_prepare_eeg_without_raw_columns() {
        let table = table_with(vec![("Alpha_TP9", vec![0.5; 4])]);
        assert!(matches!(
            prepare_eeg(&table, &EegOptions::default()),
            Err(DataError::MissingColumn(_))
        ));
    }
}
