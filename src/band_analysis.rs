use crate::data_loading::SessionTable;
use crate::preprocessing::EEG_CHANNELS;
use crate::spectral::FREQ_BANDS;
use crate::stats::{self, Aggregate, Summary};
use log::{debug, warn};
use serde::Serialize;

/// Mind Monitor band-power statistics for one band, per electrode or pooled
#[derive(Debug, Clone, Serialize)]
pub struct BandStat {
    pub band: &'static str,
    /// `None` for the row pooling every electrode
    pub electrode: Option<String>,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub valid_ratio: f64,
}

fn band_stat(band: &'static str, electrode: Option<String>, values: &[f64]) -> Option<BandStat> {
    // Mind Monitor writes exact zeros while a band is not computed
    let cleaned: Vec<f64> = values
        .iter()
        .map(|&v| if v == 0.0 { f64::NAN } else { v })
        .collect();
    let summary = Summary::of(&cleaned)?;
    Some(BandStat {
        band,
        electrode,
        mean: summary.mean,
        median: summary.median,
        std: summary.std,
        valid_ratio: summary.count as f64 / values.len().max(1) as f64,
    })
}

/// Per band x electrode statistics of the `<Band>_<Electrode>` columns, plus
/// one pooled row per band. Bands without columns are skipped.
pub fn band_statistics(table: &SessionTable) -> Vec<BandStat> {
    let mut rows = Vec::new();
    for band in FREQ_BANDS.iter().map(|b| b.name) {
        let columns = table.columns_with_prefix(&format!("{}_", band));
        if columns.is_empty() {
            warn!("No {} band-power columns, skipping", band);
            continue;
        }

        let mut pooled = Vec::new();
        for col in &columns {
            let Some(values) = table.column(col) else {
                continue;
            };
            pooled.extend_from_slice(values);
            let electrode = col.trim_start_matches(band).trim_start_matches('_');
            if let Some(stat) = band_stat(band, Some(electrode.to_string()), values) {
                rows.push(stat);
            }
        }
        if let Some(stat) = band_stat(band, None, &pooled) {
            rows.push(stat);
        }
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RatioKind {
    /// alpha / beta
    Relaxation,
    /// beta / theta
    Concentration,
    /// theta / alpha
    MeditationDepth,
}

impl RatioKind {
    pub const ALL: [RatioKind; 3] = [
        RatioKind::Relaxation,
        RatioKind::Concentration,
        RatioKind::MeditationDepth,
    ];

    pub fn bands(&self) -> (&'static str, &'static str) {
        match self {
            RatioKind::Relaxation => ("Alpha", "Beta"),
            RatioKind::Concentration => ("Beta", "Theta"),
            RatioKind::MeditationDepth => ("Theta", "Alpha"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RatioKind::Relaxation => "Alpha/Beta",
            RatioKind::Concentration => "Beta/Theta",
            RatioKind::MeditationDepth => "Theta/Alpha",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RatioKind::Relaxation => "relaxation",
            RatioKind::Concentration => "concentration",
            RatioKind::MeditationDepth => "meditation depth",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RatioOptions {
    pub resample_secs: f64,
    pub smoothing_bins: usize,
    pub z_threshold: f64,
    /// θ/α level above which a bin counts as deep meditation
    pub deep_meditation_threshold: f64,
}

impl Default for RatioOptions {
    fn default() -> Self {
        RatioOptions {
            resample_secs: 10.0,
            smoothing_bins: 6,
            z_threshold: 3.0,
            deep_meditation_threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RatioStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub iqr: f64,
    pub outliers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpikeAnalysis {
    pub outliers: usize,
    pub outlier_ratio_percent: f64,
    pub cv_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatioSeries {
    pub kind: RatioKind,
    /// Bin start offsets in seconds
    pub times: Vec<f64>,
    pub resampled: Vec<f64>,
    pub smoothed: Vec<f64>,
    pub stats: Option<RatioStats>,
    pub spikes: Option<SpikeAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BandRatios {
    pub series: Vec<RatioSeries>,
    /// Fraction of resampled bins where θ/α exceeds the deep-meditation threshold
    pub deep_meditation_fraction: Option<f64>,
}

impl BandRatios {
    pub fn get(&self, kind: RatioKind) -> Option<&RatioSeries> {
        self.series.iter().find(|s| s.kind == kind)
    }
}

/// Row-wise |numerator| / |denominator| averaged over electrodes.
/// A zero denominator yields NaN for that electrode.
pub fn ratio_per_row(table: &SessionTable, numerator: &str, denominator: &str) -> Option<Vec<f64>> {
    let pairs: Vec<(&[f64], &[f64])> = EEG_CHANNELS
        .iter()
        .filter_map(|e| {
            let num = table.column(&format!("{}_{}", numerator, e))?;
            let den = table.column(&format!("{}_{}", denominator, e))?;
            Some((num, den))
        })
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let per_row = (0..table.len())
        .map(|row| {
            let values: Vec<f64> = pairs
                .iter()
                .map(|(num, den)| {
                    let d = den[row].abs();
                    if d == 0.0 {
                        f64::NAN
                    } else {
                        num[row].abs() / d
                    }
                })
                .collect();
            stats::mean(&values).unwrap_or(f64::NAN)
        })
        .collect();
    Some(per_row)
}

fn ratio_stats(values: &[f64], z_threshold: f64) -> Option<RatioStats> {
    let (kept, outliers) = stats::zscore_filter(values, z_threshold);
    let summary = Summary::of(&kept)?;
    Some(RatioStats {
        mean: summary.mean,
        median: summary.median,
        std: summary.std,
        min: summary.min,
        max: summary.max,
        iqr: stats::quantile(&kept, 0.75)? - stats::quantile(&kept, 0.25)?,
        outliers,
    })
}

fn spike_analysis(resampled: &[f64], z_threshold: f64) -> Option<SpikeAnalysis> {
    let valid = stats::finite(resampled);
    if valid.is_empty() {
        return None;
    }
    let outliers = stats::zscore_outliers(&valid, z_threshold);
    let cv_percent = match (stats::std_dev(&valid, 1), stats::mean(&valid)) {
        (Some(s), Some(m)) if m != 0.0 => s / m * 100.0,
        _ => f64::NAN,
    };
    Some(SpikeAnalysis {
        outliers,
        outlier_ratio_percent: outliers as f64 / valid.len() as f64 * 100.0,
        cv_percent,
    })
}

/// Ratio series are binned on wall-clock multiples of `resample_secs`; bin
/// times are reported relative to the first row, so the first may be negative.
pub fn band_ratios(table: &SessionTable, options: &RatioOptions) -> Option<BandRatios> {
    let offset = table.clock_offset_secs();
    let clock: Vec<f64> = table.elapsed_seconds().iter().map(|t| t + offset).collect();
    let mut series = Vec::new();
    for kind in RatioKind::ALL {
        let (num, den) = kind.bands();
        let Some(per_row) = ratio_per_row(table, num, den) else {
            warn!("Missing {} or {} columns, skipping {} ratio", num, den, kind.label());
            continue;
        };
        let (bin_times, resampled) =
            stats::resample(&clock, &per_row, options.resample_secs, Aggregate::Mean);
        let bin_times: Vec<f64> = bin_times.iter().map(|t| t - offset).collect();
        debug!("{}: {} rows into {} bins", kind.label(), per_row.len(), resampled.len());
        series.push(RatioSeries {
            kind,
            smoothed: stats::rolling_mean(&resampled, options.smoothing_bins, true),
            stats: ratio_stats(&per_row, options.z_threshold),
            spikes: spike_analysis(&resampled, options.z_threshold),
            times: bin_times,
            resampled,
        });
    }
    if series.is_empty() {
        return None;
    }

    let deep_meditation_fraction = series
        .iter()
        .find(|s| s.kind == RatioKind::MeditationDepth)
        .and_then(|s| {
            let valid = stats::finite(&s.resampled);
            (!valid.is_empty()).then(|| {
                valid
                    .iter()
                    .filter(|&&v| v > options.deep_meditation_threshold)
                    .count() as f64
                    / valid.len() as f64
            })
        });

    Some(BandRatios {
        series,
        deep_meditation_fraction,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct BandAsymmetry {
    pub band: String,
    pub times: Vec<f64>,
    /// ln(right) - ln(left) per row
    pub values: Vec<f64>,
    pub summary: Summary,
}

/// Hemispheric asymmetry from the Mind Monitor band powers (AF8 vs AF7).
/// Band powers are Bels, so ln(R) - ln(L) = ln(10) * (R - L).
pub fn band_power_asymmetry(table: &SessionTable, band: &str) -> Option<BandAsymmetry> {
    let left = table.column(&format!("{}_AF7", band))?;
    let right = table.column(&format!("{}_AF8", band))?;
    let values: Vec<f64> = left
        .iter()
        .zip(right)
        .map(|(&l, &r)| {
            if l.is_finite() && r.is_finite() && l != 0.0 && r != 0.0 {
                std::f64::consts::LN_10 * (r - l)
            } else {
                f64::NAN
            }
        })
        .collect();
    Some(BandAsymmetry {
        band: band.to_string(),
        times: table.elapsed_seconds(),
        summary: Summary::of(&values)?,
        values,
    })
}
