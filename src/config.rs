use crate::band_analysis::RatioOptions;
use crate::data_loading::LoadOptions;
use crate::fnirs::{BaselineMode, FnirsOptions};
use crate::frontal::{FaaOptions, FmThetaBand, FmThetaOptions};
use crate::heart_analysis::RespiratoryOptions;
use crate::preprocessing::{EegOptions, DEFAULT_SFREQ};
use crate::segment_analysis::SegmentOptions;
use crate::spectral::{PsdOptions, SpectrogramOptions};
use clap::Parser;
use std::path::PathBuf;

/// Analyse a Mind Monitor CSV session and write a Markdown report
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the Mind Monitor CSV export
    #[arg(long, env = "MUSE_REPORT_DATA")]
    pub data: PathBuf,

    /// Directory for REPORT.md, summary.csv and img/
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    /// Nominal EEG sampling rate in Hz (timestamps are not used for EEG timing)
    #[arg(long, default_value_t = DEFAULT_SFREQ)]
    pub sfreq: f64,

    /// FFT length for the Welch PSD
    #[arg(long, default_value = "512")]
    pub n_fft: usize,

    /// Lower PSD frequency bound in Hz
    #[arg(long, default_value = "0.5")]
    pub fmin: f64,

    /// Upper PSD frequency bound in Hz (clipped below Nyquist)
    #[arg(long, default_value = "50.0")]
    pub fmax: f64,

    /// Keep rows recorded while the headband reported no contact
    #[arg(long)]
    pub no_headband_filter: bool,

    /// Require every HSI channel to be good (1) instead of good or medium (<= 2)
    #[arg(long)]
    pub strict_quality: bool,

    /// Theta sub-band for frontal midline theta
    #[arg(long, value_enum, default_value = "narrow")]
    pub fmtheta_band: FmThetaBand,

    /// Reference intensity for fNIRS optical density
    #[arg(long, value_enum, default_value = "initial")]
    pub fnirs_baseline: BaselineMode,

    /// Lower edge of the respiratory band in Hz
    #[arg(long, default_value = "0.1")]
    pub resp_band_min: f64,

    /// Upper edge of the respiratory band in Hz
    #[arg(long, default_value = "0.5")]
    pub resp_band_max: f64,

    /// Segment length for the time segment analysis, in minutes
    #[arg(long, default_value = "5.0")]
    pub segment_minutes: f64,

    /// Minutes excluded at the start of the segment analysis
    #[arg(long, default_value = "1.0")]
    pub warmup_minutes: f64,

    /// Also write the full analysis as analysis.json
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Every tunable of the analysis, independent of the command line
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub load: LoadOptions,
    pub strict_quality: bool,
    pub eeg: EegOptions,
    pub psd: PsdOptions,
    pub spectrogram: SpectrogramOptions,
    pub paf_smoothing_frames: usize,
    pub ratios: RatioOptions,
    pub faa: FaaOptions,
    pub fmtheta: FmThetaOptions,
    pub fnirs: FnirsOptions,
    pub respiratory: RespiratoryOptions,
    pub segments: SegmentOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            load: LoadOptions::default(),
            strict_quality: false,
            eeg: EegOptions::default(),
            psd: PsdOptions::default(),
            spectrogram: SpectrogramOptions::default(),
            paf_smoothing_frames: 30,
            ratios: RatioOptions::default(),
            faa: FaaOptions::default(),
            fmtheta: FmThetaOptions::default(),
            fnirs: FnirsOptions::default(),
            respiratory: RespiratoryOptions::default(),
            segments: SegmentOptions::default(),
        }
    }
}

impl Args {
    pub fn analysis_config(&self) -> AnalysisConfig {
        let defaults = AnalysisConfig::default();
        AnalysisConfig {
            load: LoadOptions {
                filter_headband: !self.no_headband_filter,
            },
            strict_quality: self.strict_quality,
            eeg: EegOptions {
                sfreq: self.sfreq,
                ..defaults.eeg
            },
            psd: PsdOptions {
                n_fft: self.n_fft,
                fmin: self.fmin,
                fmax: self.fmax,
                ..defaults.psd
            },
            fmtheta: FmThetaOptions {
                band: self.fmtheta_band,
                ..defaults.fmtheta
            },
            fnirs: FnirsOptions {
                baseline: self.fnirs_baseline,
                ..defaults.fnirs
            },
            respiratory: RespiratoryOptions {
                band: (self.resp_band_min, self.resp_band_max),
                ..defaults.respiratory
            },
            segments: SegmentOptions {
                segment_minutes: self.segment_minutes,
                warmup_minutes: self.warmup_minutes,
                ..defaults.segments
            },
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_onto_options() {
        let args = Args::parse_from([
            "muse-report",
            "--data",
            "session.csv",
            "--sfreq",
            "128",
            "--fmtheta-band",
            "wide",
            "--no-headband-filter",
            "--fnirs-baseline",
            "session-mean",
            "-vv",
        ]);
        assert_eq!(args.output, PathBuf::from("."));
        assert_eq!(args.verbose, 2);

        let config = args.analysis_config();
        assert_eq!(config.eeg.sfreq, 128.0);
        assert_eq!(config.fmtheta.band, FmThetaBand::Wide);
        assert!(!config.load.filter_headband);
        assert_eq!(config.fnirs.baseline, BaselineMode::SessionMean);
        assert_eq!(config.respiratory.band, (0.1, 0.5));
        assert_eq!(config.segments.segment_minutes, 5.0);
        assert_eq!(config.psd.n_fft, 512);
    }
}
