use crate::band_analysis::{self, BandAsymmetry, BandRatios, BandStat};
use crate::config::AnalysisConfig;
use crate::data_loading::{self, SessionInfo, SessionTable};
use crate::fnirs::{self, FnirsResult};
use crate::frontal::{self, FaaResult, FmThetaResult};
use crate::heart_analysis::{self, RespiratoryResult};
use crate::preprocessing::{self, EegRecording, HsiStatistics};
use crate::segment_analysis::{self, MeditationScore, ScoreInputs, SegmentAnalysis};
use crate::spectral::{
    self, BandPeak, EntropySeries, PafResult, PafTimeEvolution, Psd, SpectralEntropy, Spectrogram,
    ALPHA_RANGE, ENTROPY_RANGE,
};
use crate::{output, plots, report};
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
    pub rows_kept: usize,
    pub rows_total: usize,
    pub fell_back: bool,
    pub strict: bool,
}

/// Event marker from the `Elements` column
#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub elapsed_secs: f64,
    pub label: String,
}

/// Everything computed for one session; absent sections are `None`
#[derive(Debug, Clone, Serialize)]
pub struct SessionAnalysis {
    pub info: SessionInfo,
    pub sfreq: f64,
    pub quality: QualitySummary,
    pub hsi: Option<HsiStatistics>,
    pub markers: Vec<Marker>,
    pub band_stats: Vec<BandStat>,
    pub ratios: Option<BandRatios>,
    pub alpha_asymmetry: Option<BandAsymmetry>,
    pub beta_asymmetry: Option<BandAsymmetry>,
    pub eeg_channels: Vec<String>,
    #[serde(skip)]
    pub psd: Option<Psd>,
    #[serde(skip)]
    pub spectrogram: Option<Spectrogram>,
    pub paf: Option<PafResult>,
    pub paf_evolution: Option<PafTimeEvolution>,
    pub band_peaks: Vec<BandPeak>,
    pub entropy: Option<SpectralEntropy>,
    pub entropy_series: Option<EntropySeries>,
    pub faa: Option<FaaResult>,
    pub fmtheta: Option<FmThetaResult>,
    pub fnirs: Option<FnirsResult>,
    pub respiratory: Option<RespiratoryResult>,
    pub segments: Option<SegmentAnalysis>,
    pub score_inputs: ScoreInputs,
    pub score: Option<MeditationScore>,
}

impl SessionAnalysis {
    /// Channel-averaged PSD band power, in µV²/Hz
    pub fn psd_band_power(&self, low: f64, high: f64) -> Option<f64> {
        let psd = self.psd.as_ref()?;
        crate::stats::mean(&psd.band_power(low, high)).filter(|p| *p > 0.0)
    }
}

fn markers(table: &SessionTable) -> Vec<Marker> {
    table
        .elapsed_seconds()
        .into_iter()
        .zip(&table.elements)
        .filter(|(_, e)| !e.is_empty())
        .map(|(t, e)| Marker {
            elapsed_secs: t,
            label: e.clone(),
        })
        .collect()
}

fn session_score_inputs(analysis: &SessionAnalysis) -> ScoreInputs {
    let theta = analysis.psd_band_power(4.0, 8.0);
    let alpha = analysis.psd_band_power(8.0, 13.0);
    let beta = analysis.psd_band_power(13.0, 30.0);
    ScoreInputs {
        fmtheta: analysis.fmtheta.as_ref().map(|f| f.stats.mean),
        spectral_entropy: analysis.entropy.as_ref().map(|e| e.mean),
        theta_alpha: theta.zip(alpha).map(|(t, a)| (t / a).log10()),
        alpha_beta: alpha.zip(beta).map(|(a, b)| a / b),
        iaf_cv: analysis.paf_evolution.as_ref().map(|p| p.cv_percent / 100.0),
    }
}

/// Run every analysis stage on a loaded table
pub fn analyze(table: &SessionTable, config: &AnalysisConfig) -> Result<SessionAnalysis> {
    let info = table
        .info()
        .context("Session table has no rows")?;

    let quality = preprocessing::filter_eeg_quality(table, config.strict_quality);
    println!(
        "Quality filter kept {}/{} rows{}",
        quality.kept,
        quality.total,
        if quality.fell_back { " (fallback to unfiltered)" } else { "" }
    );
    let clean = &quality.table;

    let eeg: Option<EegRecording> = match preprocessing::prepare_eeg(clean, &config.eeg) {
        Ok(eeg) => {
            println!(
                "EEG: {} channels, {:.1} s at {} Hz",
                eeg.n_channels(),
                eeg.duration_secs(),
                eeg.sfreq
            );
            Some(eeg)
        }
        Err(e) => {
            warn!("Skipping raw EEG analysis: {}", e);
            None
        }
    };

    let psd = eeg.as_ref().and_then(|e| spectral::welch_psd(e, &config.psd));
    let spectrogram = eeg
        .as_ref()
        .and_then(|e| spectral::mean_spectrogram(e, &config.spectrogram));
    let paf = psd
        .as_ref()
        .and_then(|p| spectral::peak_alpha_frequency(p, ALPHA_RANGE));
    let paf_evolution = spectrogram
        .as_ref()
        .and_then(|s| spectral::paf_time_evolution(s, ALPHA_RANGE, config.paf_smoothing_frames));
    let fmtheta = eeg
        .as_ref()
        .and_then(|e| frontal::frontal_midline_theta(e, &config.fmtheta));
    let segments = eeg.as_ref().and_then(|e| {
        segment_analysis::segment_analysis(
            e,
            fmtheta.as_ref(),
            paf_evolution.as_ref(),
            &config.segments,
        )
    });

    let mut analysis = SessionAnalysis {
        sfreq: config.eeg.sfreq,
        quality: QualitySummary {
            rows_kept: quality.kept,
            rows_total: quality.total,
            fell_back: quality.fell_back,
            strict: config.strict_quality,
        },
        hsi: preprocessing::hsi_statistics(table),
        markers: markers(table),
        band_stats: band_analysis::band_statistics(clean),
        ratios: band_analysis::band_ratios(clean, &config.ratios),
        alpha_asymmetry: band_analysis::band_power_asymmetry(clean, "Alpha"),
        beta_asymmetry: band_analysis::band_power_asymmetry(clean, "Beta"),
        eeg_channels: eeg.as_ref().map(|e| e.channels.clone()).unwrap_or_default(),
        band_peaks: psd.as_ref().map(spectral::band_peak_frequencies).unwrap_or_default(),
        entropy: psd
            .as_ref()
            .and_then(|p| spectral::spectral_entropy(p, ENTROPY_RANGE)),
        entropy_series: spectrogram
            .as_ref()
            .and_then(|s| spectral::spectral_entropy_series(s, ENTROPY_RANGE)),
        faa: eeg
            .as_ref()
            .and_then(|e| frontal::frontal_alpha_asymmetry(e, &config.faa)),
        fnirs: fnirs::analyze_fnirs(table, &config.fnirs),
        respiratory: heart_analysis::estimate_respiratory_rate(table, &config.respiratory),
        info,
        psd,
        spectrogram,
        paf,
        paf_evolution,
        fmtheta,
        segments,
        score_inputs: ScoreInputs::default(),
        score: None,
    };

    analysis.score_inputs = session_score_inputs(&analysis);
    if eeg.is_some() {
        analysis.score = Some(segment_analysis::meditation_score(&analysis.score_inputs));
    }
    debug!("Score inputs: {:?}", analysis.score_inputs);
    Ok(analysis)
}

/// Files written by [`run`]
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: PathBuf,
    pub summary: PathBuf,
    pub json: Option<PathBuf>,
    pub analysis: SessionAnalysis,
}

/// Load, analyse and write the report, plots and summary into `output_dir`
pub fn run(data_path: &Path, output_dir: &Path, config: &AnalysisConfig, write_json: bool) -> Result<RunOutput> {
    println!("Loading file: {}", data_path.display());
    let table = data_loading::load_session(data_path, &config.load)
        .with_context(|| format!("Failed to load {}", data_path.display()))?;
    println!("Loaded {} rows", table.len());

    let analysis = analyze(&table, config)?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let figures = plots::render_figures(&analysis, output_dir)?;

    let markdown = report::render_report(&analysis, data_path, &figures)?;
    let report_path = output_dir.join("REPORT.md");
    std::fs::write(&report_path, markdown)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    println!("Writing report to {}", report_path.display());

    let summary_path = output_dir.join("summary.csv");
    output::write_summary_csv(&summary_path, &output::SessionSummary::from_analysis(&analysis, data_path))?;

    let json = if write_json {
        let path = output_dir.join("analysis.json");
        output::write_json(&path, &analysis)?;
        Some(path)
    } else {
        None
    };

    Ok(RunOutput {
        report: report_path,
        summary: summary_path,
        json,
        analysis,
    })
}
