use crate::preprocessing::EegRecording;
use crate::stats::{self, Summary};
use log::{debug, trace};
use ndarray::{Array2, Axis};
use rustfft::{num_complex::Complex, FftPlanner};
use sci_rs::signal::filter::design::{
    butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, Sos,
};
use sci_rs::signal::filter::sosfiltfilt_dyn;
use serde::Serialize;
use std::f64::consts::PI;

/// Canonical EEG band with inclusive frequency limits in Hz
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Band {
    pub name: &'static str,
    pub low: f64,
    pub high: f64,
}

pub const FREQ_BANDS: [Band; 5] = [
    Band { name: "Delta", low: 0.5, high: 4.0 },
    Band { name: "Theta", low: 4.0, high: 8.0 },
    Band { name: "Alpha", low: 8.0, high: 13.0 },
    Band { name: "Beta", low: 13.0, high: 30.0 },
    Band { name: "Gamma", low: 30.0, high: 50.0 },
];

pub const ALPHA_RANGE: (f64, f64) = (8.0, 13.0);
pub const ENTROPY_RANGE: (f64, f64) = (1.0, 40.0);

/// Periodic Hann window of the specified size
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

fn design_sos(order: usize, cutoffs: Vec<f64>, band: FilterBandType, sfreq: f64) -> Option<Vec<Sos<f64>>> {
    let nyquist = sfreq / 2.0;
    if cutoffs.iter().any(|&c| c <= 0.0 || c >= nyquist) {
        return None;
    }
    match butter_dyn(
        order,
        cutoffs,
        Some(band),
        Some(false),
        Some(FilterOutputType::Sos),
        Some(sfreq),
    ) {
        DigitalFilter::Sos(filter) => Some(filter.sos),
        _ => None,
    }
}

fn filtfilt(signal: &[f64], sos: &[Sos<f64>]) -> Option<Vec<f64>> {
    // sosfiltfilt pads by 3 * (2 * sections + 1) samples on each side
    let padlen = 3 * (2 * sos.len() + 1);
    if signal.len() <= padlen {
        return None;
    }
    Some(sosfiltfilt_dyn(signal.iter(), sos))
}

/// Zero-phase Butterworth high-pass. `None` when the cutoff is out of range
/// or the signal is too short to pad.
pub fn highpass(signal: &[f64], cutoff: f64, sfreq: f64, order: usize) -> Option<Vec<f64>> {
    let sos = design_sos(order, vec![cutoff], FilterBandType::Highpass, sfreq)?;
    filtfilt(signal, &sos)
}

/// Zero-phase Butterworth band-pass between `low` and `high` Hz
pub fn bandpass(signal: &[f64], low: f64, high: f64, sfreq: f64, order: usize) -> Option<Vec<f64>> {
    if low >= high {
        return None;
    }
    let sos = design_sos(order, vec![low, high], FilterBandType::Bandpass, sfreq)?;
    filtfilt(signal, &sos)
}

/// Amplitude envelope from the analytic signal (FFT-based Hilbert transform)
pub fn hilbert_envelope(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    // Zero negative frequencies, double positive ones
    for (i, c) in buffer.iter_mut().enumerate() {
        let gain = if i == 0 || (n % 2 == 0 && i == n / 2) {
            1.0
        } else if i < n.div_ceil(2) {
            2.0
        } else {
            0.0
        };
        *c *= gain;
    }

    planner.plan_fft_inverse(n).process(&mut buffer);
    buffer.iter().map(|c| c.norm() / n as f64).collect()
}

/// Welch power spectral density (Hann window, mean-detrended segments,
/// one-sided density scaling). Returns frequencies and power.
pub fn welch(signal: &[f64], sfreq: f64, nperseg: usize, noverlap: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = signal.len();
    let nperseg = nperseg.min(n);
    if nperseg < 2 || sfreq <= 0.0 {
        return None;
    }
    let noverlap = noverlap.min(nperseg - 1);
    let step = nperseg - noverlap;
    let num_segments = (n - nperseg) / step + 1;

    let window = hann_window(nperseg);
    let window_energy: f64 = window.iter().map(|w| w * w).sum();
    let n_bins = nperseg / 2 + 1;
    let mut psd = vec![0.0; n_bins];

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(nperseg);
    let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];

    for i in 0..num_segments {
        let segment = &signal[i * step..i * step + nperseg];
        let mean = segment.iter().sum::<f64>() / nperseg as f64;
        for (slot, (&x, &w)) in buffer.iter_mut().zip(segment.iter().zip(&window)) {
            *slot = Complex::new((x - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (p, c) in psd.iter_mut().zip(&buffer) {
            *p += c.norm_sqr();
        }
    }

    let scale = 1.0 / (sfreq * window_energy * num_segments as f64);
    for (i, p) in psd.iter_mut().enumerate() {
        *p *= scale;
        let nyquist_bin = nperseg % 2 == 0 && i == nperseg / 2;
        if i != 0 && !nyquist_bin {
            *p *= 2.0;
        }
    }

    trace!("Welch: {} segments of {} samples", num_segments, nperseg);
    let freqs = (0..n_bins).map(|i| i as f64 * sfreq / nperseg as f64).collect();
    Some((freqs, psd))
}

fn indices_in_range(freqs: &[f64], low: f64, high: f64) -> Vec<usize> {
    freqs
        .iter()
        .enumerate()
        .filter(|(_, &f)| f >= low && f <= high)
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct PsdOptions {
    pub n_fft: usize,
    /// Defaults to half of `n_fft`
    pub n_overlap: Option<usize>,
    pub fmin: f64,
    pub fmax: f64,
}

impl Default for PsdOptions {
    fn default() -> Self {
        PsdOptions {
            n_fft: 512,
            n_overlap: None,
            fmin: 0.5,
            fmax: 50.0,
        }
    }
}

/// Power spectral density per channel, in µV²/Hz
#[derive(Debug, Clone)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub channels: Vec<String>,
    /// channels x freqs
    pub power: Array2<f64>,
}

impl Psd {
    /// Channel-averaged spectrum
    pub fn mean_spectrum(&self) -> Vec<f64> {
        self.power
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default()
    }

    /// Mean density inside `[low, high)` per channel; NaN when no bin falls in range
    pub fn band_power(&self, low: f64, high: f64) -> Vec<f64> {
        let idx: Vec<usize> = (0..self.freqs.len())
            .filter(|&i| self.freqs[i] >= low && self.freqs[i] < high)
            .collect();
        self.power
            .rows()
            .into_iter()
            .map(|row| {
                let values: Vec<f64> = idx.iter().map(|&i| row[i]).collect();
                stats::mean(&values).unwrap_or(f64::NAN)
            })
            .collect()
    }
}

pub fn welch_psd(recording: &EegRecording, options: &PsdOptions) -> Option<Psd> {
    let n_fft = options.n_fft.min(recording.n_samples());
    let n_overlap = options.n_overlap.unwrap_or(n_fft / 2);
    let nyquist = recording.sfreq / 2.0;
    let fmax = if options.fmax >= nyquist {
        nyquist * 0.95
    } else {
        options.fmax
    };

    let mut freqs = Vec::new();
    let mut rows = Vec::with_capacity(recording.n_channels());
    for channel in recording.data.rows() {
        let signal = channel.to_vec();
        let (f, p) = welch(&signal, recording.sfreq, n_fft, n_overlap)?;
        freqs = f;
        rows.push(p);
    }

    let keep = indices_in_range(&freqs, options.fmin, fmax);
    if keep.is_empty() {
        return None;
    }
    let mut power = Array2::<f64>::zeros((rows.len(), keep.len()));
    for (mut out, row) in power.rows_mut().into_iter().zip(&rows) {
        for (slot, &i) in out.iter_mut().zip(&keep) {
            *slot = row[i];
        }
    }

    debug!(
        "PSD: {} channels, {} bins ({:.1}-{:.1} Hz), n_fft {}",
        rows.len(),
        keep.len(),
        options.fmin,
        fmax,
        n_fft
    );
    Some(Psd {
        freqs: keep.iter().map(|&i| freqs[i]).collect(),
        channels: recording.channels.clone(),
        power,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct SpectrogramOptions {
    pub window_secs: f64,
    pub hop_secs: f64,
    pub fmin: f64,
    pub fmax: f64,
}

impl Default for SpectrogramOptions {
    fn default() -> Self {
        SpectrogramOptions {
            window_secs: 2.0,
            hop_secs: 1.0,
            fmin: 1.0,
            fmax: 50.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Frame centres in seconds
    pub times: Vec<f64>,
    pub freqs: Vec<f64>,
    /// freqs x frames, µV²
    pub power: Array2<f64>,
}

/// Short-time Fourier transform power of one channel
pub fn spectrogram(signal: &[f64], sfreq: f64, options: &SpectrogramOptions) -> Option<Spectrogram> {
    let win = (options.window_secs * sfreq).round() as usize;
    let hop = ((options.hop_secs * sfreq).round() as usize).max(1);
    if win < 2 || signal.len() < win {
        return None;
    }
    let n_frames = (signal.len() - win) / hop + 1;
    let all_freqs: Vec<f64> = (0..=win / 2).map(|i| i as f64 * sfreq / win as f64).collect();
    let keep = indices_in_range(&all_freqs, options.fmin, options.fmax.min(sfreq / 2.0));
    if keep.is_empty() {
        return None;
    }

    let window = hann_window(win);
    let window_sum: f64 = window.iter().sum();
    let scale = 1.0 / (window_sum * window_sum);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(win);
    let mut buffer = vec![Complex::new(0.0, 0.0); win];
    let mut power = Array2::<f64>::zeros((keep.len(), n_frames));

    for frame in 0..n_frames {
        let segment = &signal[frame * hop..frame * hop + win];
        let mean = segment.iter().sum::<f64>() / win as f64;
        for (slot, (&x, &w)) in buffer.iter_mut().zip(segment.iter().zip(&window)) {
            *slot = Complex::new((x - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (row, &bin) in keep.iter().enumerate() {
            let one_sided = if bin == 0 || (win % 2 == 0 && bin == win / 2) {
                1.0
            } else {
                2.0
            };
            power[[row, frame]] = buffer[bin].norm_sqr() * scale * one_sided;
        }
    }

    let times = (0..n_frames)
        .map(|f| (f * hop) as f64 / sfreq + options.window_secs / 2.0)
        .collect();
    Some(Spectrogram {
        times,
        freqs: keep.iter().map(|&i| all_freqs[i]).collect(),
        power,
    })
}

/// Spectrogram averaged over every channel of the recording
pub fn mean_spectrogram(recording: &EegRecording, options: &SpectrogramOptions) -> Option<Spectrogram> {
    let mut result: Option<Spectrogram> = None;
    for channel in recording.data.rows() {
        let spec = spectrogram(&channel.to_vec(), recording.sfreq, options)?;
        match result.as_mut() {
            Some(acc) => acc.power += &spec.power,
            None => result = Some(spec),
        }
    }
    result.map(|mut spec| {
        spec.power /= recording.n_channels() as f64;
        spec
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelPaf {
    pub channel: String,
    pub frequency: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PafResult {
    pub channels: Vec<ChannelPaf>,
    /// Individual alpha frequency: mean PAF across channels
    pub iaf: f64,
    pub iaf_std: f64,
    pub alpha_range: (f64, f64),
}

/// Per-channel frequency of maximum power inside the alpha range
pub fn peak_alpha_frequency(psd: &Psd, alpha_range: (f64, f64)) -> Option<PafResult> {
    let idx = indices_in_range(&psd.freqs, alpha_range.0, alpha_range.1);
    if idx.is_empty() {
        return None;
    }

    let channels: Vec<ChannelPaf> = psd
        .power
        .rows()
        .into_iter()
        .zip(&psd.channels)
        .filter_map(|(row, name)| {
            let band: Vec<f64> = idx.iter().map(|&i| row[i]).collect();
            let peak = stats::argmax(&band)?;
            Some(ChannelPaf {
                channel: name.clone(),
                frequency: psd.freqs[idx[peak]],
                power: band[peak],
            })
        })
        .collect();

    let pafs: Vec<f64> = channels.iter().map(|c| c.frequency).collect();
    Some(PafResult {
        iaf: stats::mean(&pafs)?,
        iaf_std: stats::std_dev(&pafs, 0)?,
        channels,
        alpha_range,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct PafTimeEvolution {
    pub times: Vec<f64>,
    pub paf: Vec<f64>,
    pub smoothed: Vec<f64>,
    pub summary: Summary,
    pub cv_percent: f64,
}

/// Alpha peak frequency of every spectrogram frame, smoothed with a centred rolling mean
pub fn paf_time_evolution(
    spec: &Spectrogram,
    alpha_range: (f64, f64),
    smoothing_frames: usize,
) -> Option<PafTimeEvolution> {
    let idx = indices_in_range(&spec.freqs, alpha_range.0, alpha_range.1);
    if idx.is_empty() {
        return None;
    }
    let paf: Vec<f64> = spec
        .power
        .columns()
        .into_iter()
        .map(|frame| {
            let band: Vec<f64> = idx.iter().map(|&i| frame[i]).collect();
            stats::argmax(&band)
                .map(|peak| spec.freqs[idx[peak]])
                .unwrap_or(f64::NAN)
        })
        .collect();

    let summary = Summary::of(&paf)?;
    let cv_percent = stats::std_dev(&paf, 0)? / summary.mean * 100.0;
    Some(PafTimeEvolution {
        times: spec.times.clone(),
        smoothed: stats::rolling_mean(&paf, smoothing_frames, true),
        paf,
        summary,
        cv_percent,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct BandPeak {
    pub band: &'static str,
    pub frequency: f64,
    pub power: f64,
}

/// Peak frequency of the channel-averaged spectrum in each canonical band
pub fn band_peak_frequencies(psd: &Psd) -> Vec<BandPeak> {
    let spectrum = psd.mean_spectrum();
    FREQ_BANDS
        .iter()
        .filter_map(|band| {
            let idx = indices_in_range(&psd.freqs, band.low, band.high);
            let values: Vec<f64> = idx.iter().map(|&i| spectrum[i]).collect();
            let peak = stats::argmax(&values)?;
            Some(BandPeak {
                band: band.name,
                frequency: psd.freqs[idx[peak]],
                power: values[peak],
            })
        })
        .collect()
}

/// Shannon entropy of a power distribution normalised by log2 of its length
pub fn shannon_entropy(power: &[f64]) -> f64 {
    let clipped: Vec<f64> = power.iter().map(|&p| p.max(f64::EPSILON)).collect();
    let total: f64 = clipped.iter().sum();
    let entropy: f64 = clipped
        .iter()
        .map(|&p| {
            let q = p / total;
            -q * q.log2()
        })
        .sum();
    let max_entropy = (clipped.len() as f64).log2();
    if max_entropy > 0.0 {
        entropy / max_entropy
    } else {
        entropy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpectralEntropy {
    pub by_channel: Vec<(String, f64)>,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub freq_range: (f64, f64),
}

pub fn spectral_entropy(psd: &Psd, freq_range: (f64, f64)) -> Option<SpectralEntropy> {
    let idx = indices_in_range(&psd.freqs, freq_range.0, freq_range.1);
    if idx.is_empty() {
        return None;
    }
    let by_channel: Vec<(String, f64)> = psd
        .power
        .rows()
        .into_iter()
        .zip(&psd.channels)
        .map(|(row, name)| {
            let band: Vec<f64> = idx.iter().map(|&i| row[i]).collect();
            (name.clone(), shannon_entropy(&band))
        })
        .collect();
    let values: Vec<f64> = by_channel.iter().map(|(_, v)| *v).collect();
    Some(SpectralEntropy {
        mean: stats::mean(&values)?,
        median: stats::median(&values)?,
        std: stats::std_dev(&values, 0)?,
        by_channel,
        freq_range,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct EntropySeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    pub summary: Summary,
    pub first_half_mean: f64,
    pub second_half_mean: f64,
    pub change_percent: f64,
}

/// Spectral entropy of every spectrogram frame
pub fn spectral_entropy_series(spec: &Spectrogram, freq_range: (f64, f64)) -> Option<EntropySeries> {
    let idx = indices_in_range(&spec.freqs, freq_range.0, freq_range.1);
    if idx.is_empty() {
        return None;
    }
    let values: Vec<f64> = spec
        .power
        .columns()
        .into_iter()
        .map(|frame| {
            let band: Vec<f64> = idx.iter().map(|&i| frame[i]).collect();
            shannon_entropy(&band)
        })
        .collect();
    let (first_half_mean, second_half_mean, change_percent) = stats::half_comparison(&values);
    Some(EntropySeries {
        times: spec.times.clone(),
        summary: Summary::of(&values)?,
        values,
        first_half_mean,
        second_half_mean,
        change_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, sfreq: f64, secs: f64) -> Vec<f64> {
        let n = (sfreq * secs) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sfreq).sin())
            .collect()
    }

    fn recording(signals: Vec<Vec<f64>>, sfreq: f64) -> EegRecording {
        let n = signals[0].len();
        let names = ["TP9", "AF7", "AF8", "TP10"];
        let mut data = Array2::<f64>::zeros((signals.len(), n));
        for (mut row, s) in data.rows_mut().into_iter().zip(&signals) {
            row.assign(&ndarray::Array1::from(s.clone()));
        }
        EegRecording::new(
            names.iter().take(signals.len()).map(|s| s.to_string()).collect(),
            data,
            sfreq,
        )
    }

    #[test]
    fn test_flat_channel_peaks_at_lower_alpha_edge() {
        let freqs: Vec<f64> = (0..=40).map(|i| i as f64 * 0.5).collect();
        let mut power = Array2::<f64>::zeros((2, freqs.len()));
        // 10 Hz peak on the first channel, second channel dead
        power[[0, 20]] = 1.0;
        let psd = Psd {
            freqs,
            channels: vec!["AF7".to_string(), "AF8".to_string()],
            power,
        };
        let paf = peak_alpha_frequency(&psd, ALPHA_RANGE).unwrap();
        assert_eq!(paf.channels[0].frequency, 10.0);
        assert_eq!(paf.channels[1].frequency, 8.0);
        assert!((paf.iaf - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_paf_of_10hz_sinusoid() {
        let signal = sine(10.0, 1.0, 256.0, 60.0);
        let eeg = recording(vec![signal; 4], 256.0);
        let psd = welch_psd(&eeg, &PsdOptions::default()).unwrap();
        let resolution = 256.0 / 512.0;
        let paf = peak_alpha_frequency(&psd, ALPHA_RANGE).unwrap();
        assert_eq!(paf.channels.len(), 4);
        for ch in &paf.channels {
            assert!((ch.frequency - 10.0).abs() <= resolution, "{}", ch.frequency);
            assert!(ch.frequency >= ALPHA_RANGE.0 && ch.frequency <= ALPHA_RANGE.1);
        }
        assert!((paf.iaf - 10.0).abs() <= resolution);
        assert!(paf.iaf_std < 1e-9);
    }

    #[test]
    fn test_psd_respects_frequency_limits() {
        let eeg = recording(vec![sine(20.0, 1.0, 256.0, 10.0)], 256.0);
        let options = PsdOptions {
            fmax: 500.0,
            ..PsdOptions::default()
        };
        let psd = welch_psd(&eeg, &options).unwrap();
        assert!(psd.freqs[0] >= 0.5);
        assert!(*psd.freqs.last().unwrap() < 128.0);
        assert_eq!(psd.power.ncols(), psd.freqs.len());
    }

    #[test]
    fn test_welch_density_matches_sine_power() {
        // A unit sine has variance 0.5; integrating the density recovers it
        let signal = sine(16.0, 1.0, 256.0, 30.0);
        let (freqs, psd) = welch(&signal, 256.0, 512, 256).unwrap();
        let df = freqs[1] - freqs[0];
        let total: f64 = psd.iter().sum::<f64>() * df;
        assert!((total - 0.5).abs() < 0.01, "{}", total);
    }

    #[test]
    fn test_hilbert_envelope_of_sine() {
        let signal = sine(8.0, 2.0, 256.0, 4.0);
        let envelope = hilbert_envelope(&signal);
        assert_eq!(envelope.len(), signal.len());
        assert!(envelope.iter().all(|&e| (e - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_bandpass_rejects_out_of_band() {
        let alpha = sine(10.0, 1.0, 256.0, 20.0);
        let gamma = sine(40.0, 1.0, 256.0, 20.0);
        let mixed: Vec<f64> = alpha.iter().zip(&gamma).map(|(a, g)| a + g).collect();
        let filtered = bandpass(&mixed, 8.0, 13.0, 256.0, 4).unwrap();
        let middle = &filtered[1024..4096];
        let rms = (middle.iter().map(|x| x * x).sum::<f64>() / middle.len() as f64).sqrt();
        assert!((rms - 0.5f64.sqrt()).abs() < 0.05, "{}", rms);
    }

    #[test]
    fn test_filters_reject_invalid_input() {
        assert!(bandpass(&[0.0; 10], 8.0, 13.0, 256.0, 4).is_none());
        assert!(highpass(&[0.0; 1000], 200.0, 256.0, 4).is_none());
        assert!(bandpass(&[0.0; 1000], 13.0, 8.0, 256.0, 4).is_none());
    }

    #[test]
    fn test_spectrogram_tracks_peak() {
        let signal = sine(10.0, 1.0, 256.0, 20.0);
        let spec = spectrogram(&signal, 256.0, &SpectrogramOptions::default()).unwrap();
        assert_eq!(spec.power.nrows(), spec.freqs.len());
        assert_eq!(spec.power.ncols(), spec.times.len());
        let evolution = paf_time_evolution(&spec, ALPHA_RANGE, 5).unwrap();
        assert!(evolution.paf.iter().all(|&f| (f - 10.0).abs() < 0.5 + 1e-9));
        assert!(evolution.cv_percent < 1e-6);
    }

    #[test]
    fn test_spectral_entropy_bounds() {
        let flat = Psd {
            freqs: (1..=40).map(|f| f as f64).collect(),
            channels: vec!["TP9".to_string(), "AF7".to_string()],
            power: Array2::from_shape_fn((2, 40), |(ch, f)| {
                if ch == 0 {
                    1.0
                } else if f == 9 {
                    100.0
                } else {
                    0.0
                }
            }),
        };
        let result = spectral_entropy(&flat, ENTROPY_RANGE).unwrap();
        assert!((result.by_channel[0].1 - 1.0).abs() < 1e-9);
        assert!(result.by_channel[1].1 < 0.1);
        assert!(result.by_channel.iter().all(|(_, v)| (0.0..=1.0 + 1e-12).contains(v)));
    }

    #[test]
    fn test_band_peaks_cover_canonical_bands() {
        let alpha = sine(10.0, 1.0, 256.0, 30.0);
        let beta = sine(20.0, 0.5, 256.0, 30.0);
        let mixed: Vec<f64> = alpha.iter().zip(&beta).map(|(a, b)| a + b).collect();
        let psd = welch_psd(&recording(vec![mixed], 256.0), &PsdOptions::default()).unwrap();
        let peaks = band_peak_frequencies(&psd);
        assert_eq!(peaks.len(), 5);
        let alpha_peak = peaks.iter().find(|p| p.band == "Alpha").unwrap();
        let beta_peak = peaks.iter().find(|p| p.band == "Beta").unwrap();
        assert!((alpha_peak.frequency - 10.0).abs() < 1e-9);
        assert!((beta_peak.frequency - 20.0).abs() < 1e-9);
    }
}
