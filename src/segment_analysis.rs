use crate::frontal::FmThetaResult;
use crate::preprocessing::EegRecording;
use crate::spectral::{welch_psd, PafTimeEvolution, PsdOptions};
use crate::stats::{self, Summary};
use chrono::Duration;
use log::{debug, warn};
use serde::Serialize;

/// Weights of the normalised indicators in the meditation score
pub const SCORE_WEIGHTS: ScoreWeights = ScoreWeights {
    fmtheta: 0.3125,
    spectral_entropy: 0.25,
    theta_alpha: 0.1875,
    alpha_beta: 0.125,
    iaf_stability: 0.125,
};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreWeights {
    pub fmtheta: f64,
    pub spectral_entropy: f64,
    pub theta_alpha: f64,
    pub alpha_beta: f64,
    pub iaf_stability: f64,
}

/// Raw indicator values; `None` (or NaN) counts as neutral
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreInputs {
    /// Frontal midline theta power, µV²
    pub fmtheta: Option<f64>,
    /// Normalised spectral entropy, 0-1
    pub spectral_entropy: Option<f64>,
    /// log10(theta / alpha), Bels
    pub theta_alpha: Option<f64>,
    /// alpha / beta, linear
    pub alpha_beta: Option<f64>,
    /// Coefficient of variation of the alpha peak frequency, 0-1
    pub iaf_cv: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScoreLevel {
    Excellent,
    Good,
    Fair,
    NeedsWork,
}

impl ScoreLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ScoreLevel::Excellent
        } else if score >= 65.0 {
            ScoreLevel::Good
        } else if score >= 50.0 {
            ScoreLevel::Fair
        } else {
            ScoreLevel::NeedsWork
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreLevel::Excellent => "Excellent",
            ScoreLevel::Good => "Good",
            ScoreLevel::Fair => "Fair",
            ScoreLevel::NeedsWork => "Needs work",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreComponents {
    pub fmtheta: f64,
    pub spectral_entropy: f64,
    pub theta_alpha: f64,
    pub alpha_beta: f64,
    pub iaf_stability: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MeditationScore {
    /// 0-100
    pub total: f64,
    pub level: ScoreLevel,
    pub components: ScoreComponents,
}

/// Clip to `[min, max]` and rescale to 0-1; missing values map to 0.5
fn normalize_indicator(value: Option<f64>, min: f64, max: f64, reverse: bool) -> f64 {
    let Some(v) = value.filter(|v| v.is_finite()) else {
        return 0.5;
    };
    let normalized = (v.clamp(min, max) - min) / (max - min);
    if reverse {
        1.0 - normalized
    } else {
        normalized
    }
}

pub fn meditation_score(inputs: &ScoreInputs) -> MeditationScore {
    let components = ScoreComponents {
        fmtheta: normalize_indicator(inputs.fmtheta, 50.0, 200.0, false),
        spectral_entropy: normalize_indicator(inputs.spectral_entropy, 0.7, 1.0, true),
        theta_alpha: normalize_indicator(inputs.theta_alpha, -1.0, 1.0, false),
        alpha_beta: normalize_indicator(inputs.alpha_beta, 1.0, 10.0, false),
        iaf_stability: normalize_indicator(inputs.iaf_cv, 0.0, 0.05, true),
    };
    let w = SCORE_WEIGHTS;
    let total = 100.0
        * (components.fmtheta * w.fmtheta
            + components.spectral_entropy * w.spectral_entropy
            + components.theta_alpha * w.theta_alpha
            + components.alpha_beta * w.alpha_beta
            + components.iaf_stability * w.iaf_stability);
    MeditationScore {
        total,
        level: ScoreLevel::from_score(total),
        components,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentOptions {
    pub segment_minutes: f64,
    pub warmup_minutes: f64,
    /// Trailing partial segments shorter than this fraction are dropped
    pub min_partial_fraction: f64,
    pub psd: PsdOptions,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        SegmentOptions {
            segment_minutes: 5.0,
            warmup_minutes: 1.0,
            min_partial_fraction: 0.5,
            psd: PsdOptions {
                fmin: 1.0,
                ..PsdOptions::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    /// 1-based
    pub index: usize,
    pub start_secs: f64,
    pub end_secs: f64,
    pub label: String,
    /// Band powers in Bels, log10(µV²/Hz)
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    /// log10(theta / alpha)
    pub theta_alpha: f64,
    pub alpha_beta: f64,
    pub fmtheta: f64,
    pub iaf: f64,
    pub iaf_cv: f64,
    pub score: f64,
    pub comment: String,
}

/// Per-metric min-max normalisation across segments
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedSegment {
    pub index: usize,
    pub fmtheta: f64,
    pub iaf: f64,
    pub alpha: f64,
    pub beta: f64,
    pub theta_alpha: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentAnalysis {
    pub segment_minutes: f64,
    pub warmup_minutes: f64,
    pub segments: Vec<Segment>,
    pub normalized: Vec<NormalizedSegment>,
    pub peak_index: Option<usize>,
}

impl SegmentAnalysis {
    pub fn peak(&self) -> Option<&Segment> {
        let idx = self.peak_index?;
        self.segments.iter().find(|s| s.index == idx)
    }
}

fn values_in(times: &[f64], values: &[f64], start: f64, end: f64) -> Vec<f64> {
    times
        .iter()
        .zip(values)
        .filter(|(&t, v)| t >= start && t < end && v.is_finite())
        .map(|(_, &v)| v)
        .collect()
}

fn robust_mean(values: &[f64]) -> f64 {
    if values.len() > 3 {
        let (kept, _) = stats::zscore_filter(values, 3.0);
        if let Some(m) = stats::mean(&kept) {
            return m;
        }
    }
    stats::mean(values).unwrap_or(f64::NAN)
}

fn segment_label(recording: &EegRecording, start_secs: f64, end_secs: f64) -> String {
    match recording.start {
        Some(origin) => {
            let at = |secs: f64| origin + Duration::milliseconds((secs * 1000.0) as i64);
            format!("{} - {}", at(start_secs).format("%H:%M"), at(end_secs).format("%H:%M"))
        }
        None => format!("{:.0}-{:.0} min", start_secs / 60.0, end_secs / 60.0),
    }
}

/// Split the session after the warm-up into fixed-length segments and compute
/// band powers, Fmθ, IAF and a per-segment score for each.
pub fn segment_analysis(
    recording: &EegRecording,
    fmtheta: Option<&FmThetaResult>,
    paf: Option<&PafTimeEvolution>,
    options: &SegmentOptions,
) -> Option<SegmentAnalysis> {
    let sfreq = recording.sfreq;
    let segment_len = (options.segment_minutes * 60.0 * sfreq) as usize;
    let warmup = (options.warmup_minutes * 60.0 * sfreq) as usize;
    let total = recording.n_samples();
    if segment_len == 0 || warmup >= total {
        warn!(
            "Warm-up of {} min exceeds the recording, skipping segment analysis",
            options.warmup_minutes
        );
        return None;
    }

    let mut bounds = Vec::new();
    let mut start = warmup;
    while start < total {
        let end = (start + segment_len).min(total);
        let fraction = (end - start) as f64 / segment_len as f64;
        if fraction >= options.min_partial_fraction || bounds.is_empty() {
            bounds.push((start, end));
        }
        start += segment_len;
    }

    let mut segments = Vec::with_capacity(bounds.len());
    for (i, &(start, end)) in bounds.iter().enumerate() {
        let start_secs = start as f64 / sfreq;
        let end_secs = end as f64 / sfreq;
        let mut comments = Vec::new();

        let (theta, alpha, beta) = match welch_psd(&recording.slice(start, end), &options.psd) {
            Some(psd) => {
                let bels = |lo: f64, hi: f64| {
                    stats::mean(&psd.band_power(lo, hi))
                        .filter(|p| *p > 0.0)
                        .map(f64::log10)
                        .unwrap_or(f64::NAN)
                };
                (bels(4.0, 8.0), bels(8.0, 13.0), bels(13.0, 30.0))
            }
            None => {
                comments.push("insufficient data");
                (f64::NAN, f64::NAN, f64::NAN)
            }
        };

        let fm_values = fmtheta
            .map(|f| values_in(&f.times, &f.values, start_secs, end_secs))
            .unwrap_or_default();
        if fm_values.is_empty() {
            comments.push("no Fm theta data");
        }
        let fm_mean = if fm_values.is_empty() {
            f64::NAN
        } else {
            robust_mean(&fm_values)
        };

        let iaf_values = paf
            .map(|p| values_in(&p.times, &p.paf, start_secs, end_secs))
            .unwrap_or_default();
        let iaf = stats::mean(&iaf_values).unwrap_or(f64::NAN);
        let iaf_cv = match stats::std_dev(&iaf_values, 1) {
            Some(s) if iaf.is_finite() && iaf != 0.0 => s / iaf,
            _ => f64::NAN,
        };

        let theta_alpha = theta - alpha;
        let alpha_beta = 10f64.powf(alpha - beta);
        let score = meditation_score(&ScoreInputs {
            fmtheta: Some(fm_mean),
            spectral_entropy: None,
            theta_alpha: Some(theta_alpha),
            alpha_beta: Some(alpha_beta),
            iaf_cv: Some(iaf_cv),
        });

        segments.push(Segment {
            index: i + 1,
            start_secs,
            end_secs,
            label: segment_label(recording, start_secs, end_secs),
            theta,
            alpha,
            beta,
            theta_alpha,
            alpha_beta,
            fmtheta: fm_mean,
            iaf,
            iaf_cv,
            score: score.total,
            comment: comments.join(" / "),
        });
    }

    let column = |f: fn(&Segment) -> f64| -> Vec<f64> {
        stats::min_max_normalize(&segments.iter().map(f).collect::<Vec<_>>())
    };
    let (fm_n, iaf_n, alpha_n, beta_n, ta_n) = (
        column(|s| s.fmtheta),
        column(|s| s.iaf),
        column(|s| s.alpha),
        column(|s| s.beta),
        column(|s| s.theta_alpha),
    );
    let normalized = segments
        .iter()
        .enumerate()
        .map(|(i, s)| NormalizedSegment {
            index: s.index,
            fmtheta: fm_n[i],
            iaf: iaf_n[i],
            alpha: alpha_n[i],
            beta: beta_n[i],
            theta_alpha: ta_n[i],
        })
        .collect();

    let scores: Vec<f64> = segments.iter().map(|s| s.score).collect();
    let peak_index = stats::argmax(&scores).map(|i| segments[i].index);
    debug!("{} segments, peak {:?}", segments.len(), peak_index);

    Some(SegmentAnalysis {
        segment_minutes: options.segment_minutes,
        warmup_minutes: options.warmup_minutes,
        segments,
        normalized,
        peak_index,
    })
}

/// Session-wide score inputs summary used by the report
pub fn summarize_inputs(inputs: &ScoreInputs) -> Vec<(&'static str, Option<f64>)> {
    vec![
        ("Fm theta (uV^2)", inputs.fmtheta),
        ("Spectral entropy", inputs.spectral_entropy),
        ("Theta/Alpha (Bels)", inputs.theta_alpha),
        ("Alpha/Beta", inputs.alpha_beta),
        ("IAF CV", inputs.iaf_cv),
    ]
}

/// Summary of per-segment scores
pub fn score_summary(analysis: &SegmentAnalysis) -> Option<Summary> {
    let scores: Vec<f64> = analysis.segments.iter().map(|s| s.score).collect();
    Summary::of(&scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::f64::consts::PI;

    #[test]
    fn test_missing_indicators_are_neutral() {
        let score = meditation_score(&ScoreInputs::default());
        assert!((score.total - 50.0).abs() < 1e-9);
        assert_eq!(score.level, ScoreLevel::Fair);
    }

    #[test]
    fn test_score_bounds_and_levels() {
        let best = meditation_score(&ScoreInputs {
            fmtheta: Some(250.0),
            spectral_entropy: Some(0.6),
            theta_alpha: Some(2.0),
            alpha_beta: Some(12.0),
            iaf_cv: Some(0.0),
        });
        assert!((best.total - 100.0).abs() < 1e-9);
        assert_eq!(best.level, ScoreLevel::Excellent);

        let worst = meditation_score(&ScoreInputs {
            fmtheta: Some(10.0),
            spectral_entropy: Some(1.0),
            theta_alpha: Some(-3.0),
            alpha_beta: Some(0.5),
            iaf_cv: Some(0.2),
        });
        assert!(worst.total.abs() < 1e-9);
        assert_eq!(worst.level, ScoreLevel::NeedsWork);
        assert_eq!(ScoreLevel::from_score(65.0), ScoreLevel::Good);
    }

    #[test]
    fn test_segments_find_theta_dominant_peak() {
        let sfreq = 128.0;
        let n = (11.0 * 60.0 * sfreq) as usize;
        let signal: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / sfreq;
                let (alpha_amp, theta_amp) = if t < 360.0 { (10.0, 2.0) } else { (2.0, 10.0) };
                alpha_amp * (2.0 * PI * 10.0 * t).sin()
                    + theta_amp * (2.0 * PI * 6.0 * t).sin()
                    + (2.0 * PI * 20.0 * t).sin()
            })
            .collect();
        let data = Array2::from_shape_vec((1, n), signal).unwrap();
        let eeg = EegRecording::new(vec!["AF7".to_string()], data, sfreq);

        let analysis = segment_analysis(&eeg, None, None, &SegmentOptions::default()).unwrap();
        assert_eq!(analysis.segments.len(), 2);
        let (first, second) = (&analysis.segments[0], &analysis.segments[1]);
        assert_eq!(first.start_secs, 60.0);
        assert_eq!(second.end_secs, 660.0);
        assert!(first.theta_alpha < 0.0);
        assert!(second.theta_alpha > 0.0);
        assert_eq!(analysis.peak_index, Some(2));
        assert_eq!(analysis.normalized[1].theta_alpha, 1.0);
        assert!(first.comment.contains("Fm theta"));
    }

    #[test]
    fn test_warmup_longer_than_recording() {
        let eeg = EegRecording::new(vec!["AF7".to_string()], Array2::zeros((1, 256)), 256.0);
        assert!(segment_analysis(&eeg, None, None, &SegmentOptions::default()).is_none());
    }
}
