use crate::band_analysis::RatioKind;
use crate::pipeline::SessionAnalysis;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// One-row session summary written to summary.csv
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub file: String,
    pub start: String,
    pub end: String,
    pub duration_min: f64,
    pub rows: usize,
    pub hsi_good_ratio: Option<f64>,
    pub iaf_hz: Option<f64>,
    pub iaf_std_hz: Option<f64>,
    pub spectral_entropy: Option<f64>,
    pub faa_mean: Option<f64>,
    pub fmtheta_mean: Option<f64>,
    pub fmtheta_change_pct: Option<f64>,
    pub alpha_beta_mean: Option<f64>,
    pub beta_theta_mean: Option<f64>,
    pub theta_alpha_mean: Option<f64>,
    pub deep_meditation_pct: Option<f64>,
    pub hbo_left_mean: Option<f64>,
    pub hbo_right_mean: Option<f64>,
    pub hbr_left_mean: Option<f64>,
    pub hbr_right_mean: Option<f64>,
    pub resp_welch_bpm: Option<f64>,
    pub resp_fft_bpm: Option<f64>,
    pub peak_segment: Option<String>,
    pub meditation_score: Option<f64>,
    pub score_level: Option<String>,
}

/// Drop NaN so the CSV field stays empty
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl SessionSummary {
    pub fn from_analysis(analysis: &SessionAnalysis, data_path: &Path) -> Self {
        let ratio_mean = |kind: RatioKind| {
            analysis
                .ratios
                .as_ref()
                .and_then(|r| r.get(kind))
                .and_then(|s| s.stats.as_ref())
                .map(|s| s.mean)
        };
        let fnirs = analysis.fnirs.as_ref();
        SessionSummary {
            file: data_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            start: analysis.info.start.format("%Y-%m-%d %H:%M:%S").to_string(),
            end: analysis.info.end.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration_min: analysis.info.duration_minutes(),
            rows: analysis.info.rows,
            hsi_good_ratio: analysis.hsi.as_ref().map(|h| h.overall_good_ratio),
            iaf_hz: finite(analysis.paf.as_ref().map(|p| p.iaf)),
            iaf_std_hz: finite(analysis.paf.as_ref().map(|p| p.iaf_std)),
            spectral_entropy: finite(analysis.entropy.as_ref().map(|e| e.mean)),
            faa_mean: finite(analysis.faa.as_ref().map(|f| f.stats.mean)),
            fmtheta_mean: finite(analysis.fmtheta.as_ref().map(|f| f.stats.mean)),
            fmtheta_change_pct: finite(analysis.fmtheta.as_ref().map(|f| f.stats.change_percent)),
            alpha_beta_mean: finite(ratio_mean(RatioKind::Relaxation)),
            beta_theta_mean: finite(ratio_mean(RatioKind::Concentration)),
            theta_alpha_mean: finite(ratio_mean(RatioKind::MeditationDepth)),
            deep_meditation_pct: analysis
                .ratios
                .as_ref()
                .and_then(|r| r.deep_meditation_fraction)
                .map(|f| f * 100.0),
            hbo_left_mean: fnirs.and_then(|f| f.left.hbo_stats).map(|s| s.mean),
            hbo_right_mean: fnirs.and_then(|f| f.right.hbo_stats).map(|s| s.mean),
            hbr_left_mean: fnirs.and_then(|f| f.left.hbr_stats).map(|s| s.mean),
            hbr_right_mean: fnirs.and_then(|f| f.right.hbr_stats).map(|s| s.mean),
            resp_welch_bpm: analysis.respiratory.as_ref().and_then(|r| r.welch_bpm),
            resp_fft_bpm: analysis.respiratory.as_ref().and_then(|r| r.fft_bpm),
            peak_segment: analysis
                .segments
                .as_ref()
                .and_then(|s| s.peak())
                .map(|p| p.label.clone()),
            meditation_score: analysis.score.map(|s| s.total),
            score_level: analysis.score.map(|s| s.level.label().to_string()),
        }
    }
}

pub fn write_summary_csv(path: &Path, summary: &SessionSummary) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    println!("Writing summary to {}", path.display());
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.serialize(summary)?;
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    println!("Writing analysis to {}", path.display());
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_csv_has_header_and_empty_optionals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");
        let summary = SessionSummary {
            file: "session.csv".to_string(),
            start: "2025-01-01 10:00:00".to_string(),
            end: "2025-01-01 10:30:00".to_string(),
            duration_min: 30.0,
            rows: 460800,
            hsi_good_ratio: Some(0.9),
            iaf_hz: Some(10.0),
            iaf_std_hz: None,
            spectral_entropy: None,
            faa_mean: None,
            fmtheta_mean: None,
            fmtheta_change_pct: None,
            alpha_beta_mean: None,
            beta_theta_mean: None,
            theta_alpha_mean: None,
            deep_meditation_pct: None,
            hbo_left_mean: None,
            hbo_right_mean: None,
            hbr_left_mean: None,
            hbr_right_mean: None,
            resp_welch_bpm: Some(12.0),
            resp_fft_bpm: None,
            peak_segment: None,
            meditation_score: Some(61.5),
            score_level: Some("Fair".to_string()),
        };
        write_summary_csv(&path, &summary).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "file");
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), headers.len());
        let iaf = headers.iter().position(|h| h == "iaf_hz").unwrap();
        let faa = headers.iter().position(|h| h == "faa_mean").unwrap();
        assert_eq!(&record[iaf], "10.0");
        assert_eq!(&record[faa], "");
    }
}
