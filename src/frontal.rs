//! Frontal EEG indices computed from the raw AF7/AF8 signals: frontal alpha
//! asymmetry and the frontal midline theta proxy.

use crate::preprocessing::EegRecording;
use crate::spectral::{bandpass, hilbert_envelope, ALPHA_RANGE};
use crate::stats::{self, Aggregate};
use log::{debug, warn};
use serde::Serialize;

/// Resample/smoothing chain applied to envelope power before reporting
#[derive(Debug, Clone, Copy)]
pub struct SmoothingOptions {
    /// Median resampling bin width
    pub resample_secs: f64,
    /// Trailing rolling mean
    pub smoothing_secs: f64,
    /// Trailing rolling median applied after the mean
    pub rolling_secs: f64,
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        SmoothingOptions {
            resample_secs: 2.0,
            smoothing_secs: 6.0,
            rolling_secs: 8.0,
        }
    }
}

impl SmoothingOptions {
    fn bins(&self, secs: f64) -> usize {
        ((secs / self.resample_secs).floor() as usize).max(1)
    }

    /// Returns bin start times and the smoothed values
    pub fn apply(&self, times: &[f64], values: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let (bin_times, resampled) = stats::resample(times, values, self.resample_secs, Aggregate::Median);
        let mean = stats::rolling_mean(&resampled, self.bins(self.smoothing_secs), false);
        let median = stats::rolling_median(&mean, self.bins(self.rolling_secs), false);
        (bin_times, median)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub first_half_mean: f64,
    pub second_half_mean: f64,
    /// Second half relative to the first, in percent
    pub change_percent: f64,
}

impl SeriesStats {
    pub fn of(values: &[f64]) -> Option<Self> {
        let summary = stats::Summary::of(values)?;
        let valid = stats::finite(values);
        let (first_half_mean, second_half_mean, change_percent) = stats::half_comparison(&valid);
        Some(SeriesStats {
            mean: summary.mean,
            median: summary.median,
            std: summary.std,
            first_half_mean,
            second_half_mean,
            change_percent,
        })
    }
}

/// Squared Hilbert envelope of a band-passed channel, in µV²
pub fn band_envelope_power(
    recording: &EegRecording,
    channel: &str,
    band: (f64, f64),
    order: usize,
) -> Option<Vec<f64>> {
    let signal = recording.channel(channel)?.to_vec();
    let filtered = bandpass(&signal, band.0, band.1, recording.sfreq, order)?;
    Some(hilbert_envelope(&filtered).iter().map(|e| e * e).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Interpretation {
    LeftDominant,
    RightDominant,
    Balanced,
}

impl Interpretation {
    pub fn from_faa(mean: f64, threshold: f64) -> Self {
        if mean > threshold {
            Interpretation::LeftDominant
        } else if mean < -threshold {
            Interpretation::RightDominant
        } else {
            Interpretation::Balanced
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Interpretation::LeftDominant => "left-hemisphere dominant (approach motivation)",
            Interpretation::RightDominant => "right-hemisphere dominant (withdrawal motivation)",
            Interpretation::Balanced => "balanced",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaaOptions {
    pub left: String,
    pub right: String,
    pub band: (f64, f64),
    pub smoothing: SmoothingOptions,
    pub threshold: f64,
    pub filter_order: usize,
}

impl Default for FaaOptions {
    fn default() -> Self {
        FaaOptions {
            left: "AF7".to_string(),
            right: "AF8".to_string(),
            band: ALPHA_RANGE,
            smoothing: SmoothingOptions::default(),
            threshold: 0.05,
            filter_order: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FaaResult {
    pub times: Vec<f64>,
    /// ln(right alpha power) - ln(left alpha power)
    pub values: Vec<f64>,
    pub stats: SeriesStats,
    pub interpretation: Interpretation,
}

const LOG_EPSILON: f64 = 1e-6;

pub fn frontal_alpha_asymmetry(recording: &EegRecording, options: &FaaOptions) -> Option<FaaResult> {
    let left = band_envelope_power(recording, &options.left, options.band, options.filter_order);
    let right = band_envelope_power(recording, &options.right, options.band, options.filter_order);
    let (Some(left), Some(right)) = (left, right) else {
        warn!(
            "FAA needs {} and {} with enough samples, skipping",
            options.left, options.right
        );
        return None;
    };

    let times = recording.times();
    let (bin_times, left) = options.smoothing.apply(&times, &left);
    let (_, right) = options.smoothing.apply(&times, &right);

    let values: Vec<f64> = left
        .iter()
        .zip(&right)
        .map(|(&l, &r)| {
            if l.is_nan() || r.is_nan() {
                f64::NAN
            } else {
                r.max(LOG_EPSILON).ln() - l.max(LOG_EPSILON).ln()
            }
        })
        .collect();

    let stats = SeriesStats::of(&values)?;
    debug!("FAA over {} bins, mean {:.4}", values.len(), stats.mean);
    Some(FaaResult {
        times: bin_times,
        interpretation: Interpretation::from_faa(stats.mean, options.threshold),
        values,
        stats,
    })
}

/// Theta sub-band used as the frontal midline theta proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum FmThetaBand {
    /// 6-7 Hz
    Narrow,
    /// 5-7 Hz
    Medium,
    /// 4-8 Hz
    Wide,
}

impl FmThetaBand {
    pub fn range(&self) -> (f64, f64) {
        match self {
            FmThetaBand::Narrow => (6.0, 7.0),
            FmThetaBand::Medium => (5.0, 7.0),
            FmThetaBand::Wide => (4.0, 8.0),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            FmThetaBand::Narrow => "narrow",
            FmThetaBand::Medium => "medium",
            FmThetaBand::Wide => "wide",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FmThetaOptions {
    pub channels: Vec<String>,
    pub band: FmThetaBand,
    /// Upper clip applied to the channel-averaged power
    pub clip_quantile: f64,
    pub smoothing: SmoothingOptions,
    pub filter_order: usize,
}

impl Default for FmThetaOptions {
    fn default() -> Self {
        FmThetaOptions {
            channels: vec!["AF7".to_string(), "AF8".to_string()],
            band: FmThetaBand::Narrow,
            clip_quantile: 0.9,
            smoothing: SmoothingOptions::default(),
            filter_order: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FmThetaResult {
    pub band: FmThetaBand,
    pub range: (f64, f64),
    pub channels: Vec<String>,
    pub times: Vec<f64>,
    /// Smoothed theta power in µV²
    pub values: Vec<f64>,
    pub stats: SeriesStats,
}

pub fn frontal_midline_theta(recording: &EegRecording, options: &FmThetaOptions) -> Option<FmThetaResult> {
    let range = options.band.range();
    let mut used = Vec::new();
    let mut powers = Vec::new();
    for channel in &options.channels {
        match band_envelope_power(recording, channel, range, options.filter_order) {
            Some(power) => {
                used.push(channel.clone());
                powers.push(power);
            }
            None => warn!("Fm theta: channel {} unavailable", channel),
        }
    }
    if powers.is_empty() {
        return None;
    }

    let n = recording.n_samples();
    let mut power: Vec<f64> = (0..n)
        .map(|i| powers.iter().map(|p| p[i]).sum::<f64>() / powers.len() as f64)
        .collect();
    let upper = stats::quantile(&power, options.clip_quantile)?;
    power.iter_mut().for_each(|p| *p = p.clamp(0.0, upper));

    let (times, values) = options.smoothing.apply(&recording.times(), &power);
    let stats = SeriesStats::of(&values)?;
    debug!(
        "Fm theta ({}): mean {:.2} uV^2, change {:.1}%",
        options.band.key(),
        stats.mean,
        stats.change_percent
    );
    Some(FmThetaResult {
        band: options.band,
        range,
        channels: used,
        times,
        values,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn recording(channels: &[(&str, Vec<f64>)]) -> EegRecording {
        let n = channels[0].1.len();
        let data = Array2::from_shape_fn((channels.len(), n), |(c, i)| channels[c].1[i]);
        EegRecording::new(
            channels.iter().map(|(name, _)| name.to_string()).collect(),
            data,
            256.0,
        )
    }

    fn tone(freq: f64, amplitude: impl Fn(f64) -> f64, secs: f64) -> Vec<f64> {
        (0..(256.0 * secs) as usize)
            .map(|i| {
                let t = i as f64 / 256.0;
                amplitude(t) * (2.0 * PI * freq * t).sin() + 0.1 * (2.0 * PI * 23.0 * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_faa_is_antisymmetric() {
        let left = tone(10.0, |_| 4.0, 40.0);
        let right = tone(10.0, |t| 6.0 + (t / 10.0).sin(), 40.0);
        let options = FaaOptions::default();

        let forward = frontal_alpha_asymmetry(
            &recording(&[("AF7", left.clone()), ("AF8", right.clone())]),
            &options,
        )
        .unwrap();
        let swapped =
            frontal_alpha_asymmetry(&recording(&[("AF7", right), ("AF8", left)]), &options).unwrap();

        assert_eq!(forward.values.len(), swapped.values.len());
        for (a, b) in forward.values.iter().zip(&swapped.values) {
            assert!((a + b).abs() < 1e-9);
        }
        assert!(forward.stats.mean > 0.05);
        assert_eq!(forward.interpretation, Interpretation::LeftDominant);
        assert_eq!(swapped.interpretation, Interpretation::RightDominant);
    }

    #[test]
    fn test_faa_requires_both_channels() {
        let eeg = recording(&[("TP9", tone(10.0, |_| 1.0, 10.0))]);
        assert!(frontal_alpha_asymmetry(&eeg, &FaaOptions::default()).is_none());
    }

    #[test]
    fn test_interpretation_thresholds() {
        assert_eq!(Interpretation::from_faa(0.06, 0.05), Interpretation::LeftDominant);
        assert_eq!(Interpretation::from_faa(-0.06, 0.05), Interpretation::RightDominant);
        assert_eq!(Interpretation::from_faa(0.05, 0.05), Interpretation::Balanced);
    }

    #[test]
    fn test_fmtheta_tracks_rising_theta() {
        let amplitude = |t: f64| if t < 30.0 { 5.0 } else { 10.0 };
        let eeg = recording(&[
            ("AF7", tone(6.5, amplitude, 60.0)),
            ("AF8", tone(6.5, amplitude, 60.0)),
        ]);
        let result = frontal_midline_theta(&eeg, &FmThetaOptions::default()).unwrap();
        assert_eq!(result.range, (6.0, 7.0));
        assert_eq!(result.channels, vec!["AF7", "AF8"]);
        assert_eq!(result.values.len(), 30);
        assert!(result.stats.change_percent > 100.0, "{}", result.stats.change_percent);
        assert!(result.values.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_smoothing_chain_lengths() {
        let times: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        let values = vec![1.0; 100];
        let (bins, smoothed) = SmoothingOptions::default().apply(&times, &values);
        assert_eq!(bins.len(), 5);
        assert!(smoothed.iter().all(|&v| (v - 1.0).abs() < 1e-12));
    }
}
