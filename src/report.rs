//! Markdown report assembled from a [`SessionAnalysis`].
//!
//! Every section is optional: a result that could not be computed leaves
//! its section out instead of printing placeholders.

use crate::band_analysis::RatioKind;
use crate::pipeline::SessionAnalysis;
use crate::plots::{Figure, Figures};
use crate::segment_analysis::{self, SCORE_WEIGHTS};
use std::fmt::{self, Write};
use std::path::Path;

/// Format a value, or "n/a" when missing or not finite
fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{:.*}", decimals, v),
        None => "n/a".to_string(),
    }
}

fn fmt_secs(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

fn image(out: &mut String, figures: &Figures, figure: Figure, alt: &str) -> fmt::Result {
    if let Some(path) = figures.path(figure) {
        writeln!(out, "\n![{}]({})\n", alt, path)?;
    }
    Ok(())
}

fn header(out: &mut String, analysis: &SessionAnalysis, data_path: &Path) -> fmt::Result {
    let info = &analysis.info;
    writeln!(out, "# Muse EEG Session Report\n")?;
    writeln!(out, "- **File**: `{}`", data_path.display())?;
    writeln!(
        out,
        "- **Recorded**: {} to {}",
        info.start.format("%Y-%m-%d %H:%M:%S"),
        info.end.format("%H:%M:%S")
    )?;
    writeln!(out, "- **Duration**: {:.1} min", info.duration_minutes())?;
    writeln!(out, "- **Rows**: {} ({} columns)", info.rows, info.columns)?;
    if !analysis.eeg_channels.is_empty() {
        writeln!(
            out,
            "- **EEG**: {} at {} Hz",
            analysis.eeg_channels.join(", "),
            analysis.sfreq
        )?;
    }
    out.push('\n');
    Ok(())
}

fn signal_quality(out: &mut String, analysis: &SessionAnalysis) -> fmt::Result {
    writeln!(out, "## Signal Quality\n")?;
    let q = &analysis.quality;
    let criterion = if q.strict { "all HSI == 1" } else { "all HSI <= 2" };
    writeln!(
        out,
        "Quality filter ({}): kept {} of {} rows ({:.1}%).",
        criterion,
        q.rows_kept,
        q.rows_total,
        100.0 * q.rows_kept as f64 / q.rows_total.max(1) as f64
    )?;
    if q.fell_back {
        writeln!(out, "\n> No row passed the filter; the unfiltered data was analysed.")?;
    }

    if let Some(hsi) = &analysis.hsi {
        writeln!(out, "\n| Channel | Mean HSI | Good contact |")?;
        writeln!(out, "|---|---|---|")?;
        for ch in &hsi.channels {
            writeln!(
                out,
                "| {} | {:.2} | {:.1}% |",
                ch.channel,
                ch.mean_hsi,
                ch.good_ratio * 100.0
            )?;
        }
        writeln!(
            out,
            "| **All** | {:.2} | {:.1}% |",
            hsi.overall_mean,
            hsi.overall_good_ratio * 100.0
        )?;
    }
    out.push('\n');
    Ok(())
}

fn summary(out: &mut String, analysis: &SessionAnalysis) -> fmt::Result {
    let Some(score) = analysis.score else {
        return Ok(());
    };
    writeln!(out, "## Summary\n")?;
    writeln!(
        out,
        "**Meditation score: {:.1} / 100 ({})**\n",
        score.total,
        score.level.label()
    )?;
    let c = score.components;
    let w = SCORE_WEIGHTS;
    let rows = [
        (w.fmtheta, c.fmtheta),
        (w.spectral_entropy, c.spectral_entropy),
        (w.theta_alpha, c.theta_alpha),
        (w.alpha_beta, c.alpha_beta),
        (w.iaf_stability, c.iaf_stability),
    ];
    writeln!(out, "| Indicator | Value | Normalised | Weight |")?;
    writeln!(out, "|---|---|---|---|")?;
    for ((name, value), (weight, normalized)) in segment_analysis::summarize_inputs(&analysis.score_inputs)
        .into_iter()
        .zip(rows)
    {
        writeln!(
            out,
            "| {} | {} | {:.2} | {:.1}% |",
            name,
            fmt_opt(value, 3),
            normalized,
            weight * 100.0
        )?;
    }
    writeln!(out, "\nMissing indicators count as neutral (0.5).\n")?;
    Ok(())
}

fn frequency_bands(out: &mut String, analysis: &SessionAnalysis, figures: &Figures) -> fmt::Result {
    if analysis.band_stats.is_empty() && analysis.psd.is_none() {
        return Ok(());
    }
    writeln!(out, "## Frequency Bands\n")?;

    let pooled: Vec<_> = analysis.band_stats.iter().filter(|s| s.electrode.is_none()).collect();
    if !pooled.is_empty() {
        writeln!(out, "Mind Monitor band powers (Bels, all electrodes):\n")?;
        writeln!(out, "| Band | Mean | Median | Std | Valid |")?;
        writeln!(out, "|---|---|---|---|---|")?;
        for s in pooled {
            writeln!(
                out,
                "| {} | {:.3} | {:.3} | {:.3} | {:.1}% |",
                s.band,
                s.mean,
                s.median,
                s.std,
                s.valid_ratio * 100.0
            )?;
        }
        out.push('\n');
    }

    if !analysis.band_peaks.is_empty() {
        writeln!(out, "Spectral peaks (channel-mean Welch PSD):\n")?;
        writeln!(out, "| Band | Peak (Hz) | Power (uV^2/Hz) |")?;
        writeln!(out, "|---|---|---|")?;
        for p in &analysis.band_peaks {
            writeln!(out, "| {} | {:.2} | {:.3} |", p.band, p.frequency, p.power)?;
        }
        out.push('\n');
    }

    image(out, figures, Figure::Psd, "Power spectral density")?;
    image(out, figures, Figure::Spectrogram, "Spectrogram")?;
    Ok(())
}

fn characteristic_indices(out: &mut String, analysis: &SessionAnalysis, figures: &Figures) -> fmt::Result {
    let any = analysis.fmtheta.is_some()
        || analysis.paf.is_some()
        || analysis.faa.is_some()
        || analysis.entropy.is_some()
        || analysis.ratios.is_some()
        || analysis.alpha_asymmetry.is_some();
    if !any {
        return Ok(());
    }
    writeln!(out, "## Characteristic Indices\n")?;

    if let Some(fm) = &analysis.fmtheta {
        writeln!(out, "### Frontal Midline Theta\n")?;
        writeln!(
            out,
            "Band {:.0}-{:.0} Hz on {}.\n",
            fm.range.0,
            fm.range.1,
            fm.channels.join(", ")
        )?;
        let s = &fm.stats;
        writeln!(out, "- Mean: {:.2} uV^2 (median {:.2}, std {:.2})", s.mean, s.median, s.std)?;
        writeln!(
            out,
            "- First half {:.2}, second half {:.2} ({:+.1}%)",
            s.first_half_mean, s.second_half_mean, s.change_percent
        )?;
        image(out, figures, Figure::FmTheta, "Frontal midline theta")?;
    }

    if let Some(paf) = &analysis.paf {
        writeln!(out, "### Peak Alpha Frequency\n")?;
        writeln!(
            out,
            "IAF: **{:.2} Hz** (std {:.2} Hz across channels, range {:.0}-{:.0} Hz)\n",
            paf.iaf, paf.iaf_std, paf.alpha_range.0, paf.alpha_range.1
        )?;
        writeln!(out, "| Channel | PAF (Hz) | Power (uV^2/Hz) |")?;
        writeln!(out, "|---|---|---|")?;
        for ch in &paf.channels {
            writeln!(out, "| {} | {:.2} | {:.3} |", ch.channel, ch.frequency, ch.power)?;
        }
        if let Some(evo) = &analysis.paf_evolution {
            writeln!(
                out,
                "\nOver time: mean {:.2} Hz, std {:.2} Hz, CV {:.2}%.",
                evo.summary.mean, evo.summary.std, evo.cv_percent
            )?;
        }
        image(out, figures, Figure::PafEvolution, "Peak alpha frequency over time")?;
    }

    if let Some(faa) = &analysis.faa {
        writeln!(out, "### Frontal Alpha Asymmetry\n")?;
        let s = &faa.stats;
        writeln!(out, "- Mean FAA: {:.3} ({})", s.mean, faa.interpretation.description())?;
        writeln!(
            out,
            "- First half {:.3}, second half {:.3}",
            s.first_half_mean, s.second_half_mean
        )?;
        image(out, figures, Figure::Faa, "Frontal alpha asymmetry")?;
    }

    let asymmetries = [&analysis.alpha_asymmetry, &analysis.beta_asymmetry];
    if asymmetries.iter().any(|a| a.is_some()) {
        writeln!(out, "### Band Power Asymmetry (AF8 vs AF7)\n")?;
        writeln!(out, "| Band | Mean ln(R/L) | Median | Std |")?;
        writeln!(out, "|---|---|---|---|")?;
        for a in asymmetries.into_iter().flatten() {
            let s = &a.summary;
            writeln!(out, "| {} | {:.3} | {:.3} | {:.3} |", a.band, s.mean, s.median, s.std)?;
        }
        out.push('\n');
    }

    if let Some(entropy) = &analysis.entropy {
        writeln!(out, "### Spectral Entropy\n")?;
        writeln!(
            out,
            "Normalised entropy over {:.0}-{:.0} Hz: mean {:.3} (median {:.3}, std {:.3}).\n",
            entropy.freq_range.0, entropy.freq_range.1, entropy.mean, entropy.median, entropy.std
        )?;
        for (channel, value) in &entropy.by_channel {
            writeln!(out, "- {}: {:.3}", channel, value)?;
        }
        if let Some(series) = &analysis.entropy_series {
            writeln!(
                out,
                "\nFirst half {:.3}, second half {:.3} ({:+.1}%).",
                series.first_half_mean, series.second_half_mean, series.change_percent
            )?;
        }
        image(out, figures, Figure::Entropy, "Spectral entropy over time")?;
    }

    if let Some(ratios) = &analysis.ratios {
        writeln!(out, "### Band Ratios\n")?;
        writeln!(out, "| Ratio | Meaning | Mean | Median | IQR | Outliers | CV |")?;
        writeln!(out, "|---|---|---|---|---|---|---|")?;
        for kind in RatioKind::ALL {
            let Some(series) = ratios.get(kind) else {
                continue;
            };
            let Some(stats) = &series.stats else {
                continue;
            };
            let cv = series.spikes.as_ref().map(|s| s.cv_percent);
            let outliers = series
                .spikes
                .as_ref()
                .map(|s| format!("{} ({:.1}%)", s.outliers, s.outlier_ratio_percent))
                .unwrap_or_else(|| stats.outliers.to_string());
            writeln!(
                out,
                "| {} | {} | {:.3} | {:.3} | {:.3} | {} | {}% |",
                kind.label(),
                kind.description(),
                stats.mean,
                stats.median,
                stats.iqr,
                outliers,
                fmt_opt(cv, 1)
            )?;
        }
        if let Some(deep) = ratios.deep_meditation_fraction {
            writeln!(out, "\nTime with Theta/Alpha above threshold: {:.1}%.", deep * 100.0)?;
        }
        image(out, figures, Figure::BandRatios, "Band power ratios")?;
    }
    Ok(())
}

fn fnirs(out: &mut String, analysis: &SessionAnalysis, figures: &Figures) -> fmt::Result {
    let Some(fnirs) = &analysis.fnirs else {
        return Ok(());
    };
    writeln!(out, "## fNIRS\n")?;
    writeln!(out, "| Hemisphere | HbO mean | HbO std | HbR mean | HbR std |")?;
    writeln!(out, "|---|---|---|---|---|")?;
    for (name, hb) in [("Left", &fnirs.left), ("Right", &fnirs.right)] {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            name,
            fmt_opt(hb.hbo_stats.map(|s| s.mean), 3),
            fmt_opt(hb.hbo_stats.map(|s| s.std), 3),
            fmt_opt(hb.hbr_stats.map(|s| s.mean), 3),
            fmt_opt(hb.hbr_stats.map(|s| s.std), 3),
        )?;
    }
    image(out, figures, Figure::Fnirs, "fNIRS hemoglobin")?;
    out.push('\n');
    Ok(())
}

fn respiratory(out: &mut String, analysis: &SessionAnalysis, figures: &Figures) -> fmt::Result {
    let Some(resp) = &analysis.respiratory else {
        return Ok(());
    };
    writeln!(out, "## Respiratory Rate\n")?;
    writeln!(out, "Estimated from respiratory sinus arrhythmia in the heart rate.\n")?;
    writeln!(out, "- Mean heart rate: {:.1} bpm", resp.mean_heart_rate)?;
    writeln!(out, "- Welch: {} breaths/min", fmt_opt(resp.welch_bpm, 1))?;
    writeln!(out, "- FFT: {} breaths/min", fmt_opt(resp.fft_bpm, 1))?;
    if let Some(d) = resp.disagreement {
        writeln!(out, "- Method disagreement: {:.1} breaths/min", d)?;
    }
    if let Some(sliding) = &resp.sliding {
        writeln!(
            out,
            "- Sliding window: {:.1} +/- {:.1} breaths/min over {} windows",
            sliding.mean,
            sliding.std,
            sliding.rates.len()
        )?;
    }
    image(out, figures, Figure::Respiratory, "Respiratory rate")?;
    out.push('\n');
    Ok(())
}

fn time_segments(out: &mut String, analysis: &SessionAnalysis, figures: &Figures) -> fmt::Result {
    let Some(segments) = &analysis.segments else {
        return Ok(());
    };
    writeln!(out, "## Time Segments\n")?;
    writeln!(
        out,
        "{:.0} min segments after a {:.0} min warm-up. Band powers in Bels.\n",
        segments.segment_minutes, segments.warmup_minutes
    )?;
    writeln!(out, "| # | Time | Theta | Alpha | Beta | Theta/Alpha | Alpha/Beta | Fm theta | IAF | Score | Comment |")?;
    writeln!(out, "|---|---|---|---|---|---|---|---|---|---|---|")?;
    for s in &segments.segments {
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {:.1} | {} |",
            s.index,
            s.label,
            fmt_opt(Some(s.theta), 3),
            fmt_opt(Some(s.alpha), 3),
            fmt_opt(Some(s.beta), 3),
            fmt_opt(Some(s.theta_alpha), 3),
            fmt_opt(Some(s.alpha_beta), 2),
            fmt_opt(Some(s.fmtheta), 2),
            fmt_opt(Some(s.iaf), 2),
            s.score,
            s.comment
        )?;
    }
    if let Some(peak) = segments.peak() {
        writeln!(out, "\nPeak segment: **#{} ({})**, score {:.1}.", peak.index, peak.label, peak.score)?;
    }
    if let Some(summary) = segment_analysis::score_summary(segments) {
        writeln!(
            out,
            "Segment scores: mean {:.1}, min {:.1}, max {:.1}.",
            summary.mean, summary.min, summary.max
        )?;
    }
    image(out, figures, Figure::Segments, "Key metrics by segment")?;
    Ok(())
}

fn markers(out: &mut String, analysis: &SessionAnalysis) -> fmt::Result {
    if analysis.markers.is_empty() {
        return Ok(());
    }
    writeln!(out, "## Markers\n")?;
    for m in &analysis.markers {
        writeln!(out, "- {} {}", fmt_secs(m.elapsed_secs), m.label)?;
    }
    out.push('\n');
    Ok(())
}

pub fn render_report(analysis: &SessionAnalysis, data_path: &Path, figures: &Figures) -> Result<String, fmt::Error> {
    let mut out = String::new();
    header(&mut out, analysis, data_path)?;
    signal_quality(&mut out, analysis)?;
    summary(&mut out, analysis)?;
    frequency_bands(&mut out, analysis, figures)?;
    characteristic_indices(&mut out, analysis, figures)?;
    fnirs(&mut out, analysis, figures)?;
    respiratory(&mut out, analysis, figures)?;
    time_segments(&mut out, analysis, figures)?;
    markers(&mut out, analysis)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loading::SessionInfo;
    use crate::pipeline::{Marker, QualitySummary};
    use crate::segment_analysis::{meditation_score, ScoreInputs};
    use chrono::NaiveDate;

    fn minimal_analysis() -> SessionAnalysis {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap();
        SessionAnalysis {
            info: SessionInfo {
                start,
                end: start + chrono::Duration::minutes(20),
                duration_secs: 1200.0,
                rows: 1000,
                columns: 12,
            },
            sfreq: 256.0,
            quality: QualitySummary {
                rows_kept: 900,
                rows_total: 1000,
                fell_back: false,
                strict: false,
            },
            hsi: None,
            markers: vec![Marker {
                elapsed_secs: 65.0,
                label: "/muse/elements/blink".to_string(),
            }],
            band_stats: Vec::new(),
            ratios: None,
            alpha_asymmetry: None,
            beta_asymmetry: None,
            eeg_channels: Vec::new(),
            psd: None,
            spectrogram: None,
            paf: None,
            paf_evolution: None,
            band_peaks: Vec::new(),
            entropy: None,
            entropy_series: None,
            faa: None,
            fmtheta: None,
            fnirs: None,
            respiratory: None,
            segments: None,
            score_inputs: ScoreInputs::default(),
            score: None,
        }
    }

    #[test]
    fn test_missing_results_omit_sections() {
        let report = render_report(&minimal_analysis(), Path::new("session.csv"), &Figures::default()).unwrap();
        assert!(report.starts_with("# Muse EEG Session Report"));
        assert!(report.contains("`session.csv`"));
        assert!(report.contains("20.0 min"));
        assert!(report.contains("kept 900 of 1000 rows (90.0%)"));
        assert!(report.contains("## Markers"));
        assert!(report.contains("00:01:05 /muse/elements/blink"));
        for absent in [
            "## Summary",
            "## Frequency Bands",
            "## Characteristic Indices",
            "## fNIRS",
            "## Respiratory Rate",
            "## Time Segments",
            "![",
        ] {
            assert!(!report.contains(absent), "unexpected {}", absent);
        }
    }

    #[test]
    fn test_summary_lists_score_and_neutral_inputs() {
        let mut analysis = minimal_analysis();
        analysis.score = Some(meditation_score(&analysis.score_inputs));
        let report = render_report(&analysis, Path::new("s.csv"), &Figures::default()).unwrap();
        assert!(report.contains("## Summary"));
        assert!(report.contains("50.0 / 100 (Fair)"));
        assert!(report.contains("| Spectral entropy | n/a | 0.50 | 25.0% |"));
    }

    #[test]
    fn test_fmt_handles_missing_and_nan() {
        assert_eq!(fmt_opt(None, 2), "n/a");
        assert_eq!(fmt_opt(Some(f64::NAN), 2), "n/a");
        assert_eq!(fmt_opt(Some(1.23456), 2), "1.23");
        assert_eq!(fmt_secs(3725.0), "01:02:05");
    }
}
