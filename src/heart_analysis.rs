use crate::data_loading::{SessionTable, HEART_RATE_COLUMN};
use crate::spectral::welch;
use crate::stats;
use log::{debug, trace, warn};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct RespiratoryOptions {
    /// Uniform resampling rate of the RR series
    pub sample_rate: f64,
    /// Respiratory sinus arrhythmia band in Hz
    pub band: (f64, f64),
    pub window_secs: f64,
    pub window_overlap: f64,
}

impl Default for RespiratoryOptions {
    fn default() -> Self {
        RespiratoryOptions {
            sample_rate: 4.0,
            band: (0.1, 0.5),
            window_secs: 60.0,
            window_overlap: 0.5,
        }
    }
}

/// Breathing rate over time from sliding FFT windows
#[derive(Debug, Clone, Serialize)]
pub struct SlidingRate {
    /// Window centres in seconds
    pub times: Vec<f64>,
    pub rates: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RespiratoryResult {
    /// Breaths per minute from the Welch spectrum
    pub welch_bpm: Option<f64>,
    /// Breaths per minute from the zero-padded FFT
    pub fft_bpm: Option<f64>,
    /// |welch - fft|, reported as-is
    pub disagreement: Option<f64>,
    pub sliding: Option<SlidingRate>,
    pub rr_times: Vec<f64>,
    pub rr_ms: Vec<f64>,
    pub mean_heart_rate: f64,
}

/// RR intervals (ms) at the rows with a positive heart rate
pub fn rr_intervals(table: &SessionTable) -> Option<(Vec<f64>, Vec<f64>)> {
    let hr = table.column(HEART_RATE_COLUMN)?;
    let elapsed = table.elapsed_seconds();
    let (times, rr): (Vec<f64>, Vec<f64>) = elapsed
        .iter()
        .zip(hr)
        .filter(|(_, &bpm)| bpm.is_finite() && bpm > 0.0)
        .map(|(&t, &bpm)| (t, 60000.0 / bpm))
        .unzip();
    Some((times, rr))
}

/// Linear interpolation of `(times, values)` onto a uniform grid starting at `times[0]`
pub fn interpolate_uniform(times: &[f64], values: &[f64], sample_rate: f64) -> Vec<f64> {
    let (Some(&start), Some(&end)) = (times.first(), times.last()) else {
        return Vec::new();
    };
    let num_samples = ((end - start) * sample_rate).floor() as usize + 1;
    let mut out = Vec::with_capacity(num_samples);
    let mut j = 0;
    for i in 0..num_samples {
        let t = start + i as f64 / sample_rate;
        while j < times.len() - 1 && times[j + 1] < t {
            j += 1;
        }
        if j >= times.len() - 1 {
            out.push(values[times.len() - 1]);
            continue;
        }
        let (t1, t2) = (times[j], times[j + 1]);
        let alpha = if t2 > t1 { (t - t1) / (t2 - t1) } else { 0.0 };
        out.push(values[j] + alpha * (values[j + 1] - values[j]));
    }
    out
}

fn peak_in_band(freqs: &[f64], power: &[f64], band: (f64, f64)) -> Option<f64> {
    let mut max_power = 0.0;
    let mut peak_freq = None;
    for (&f, &p) in freqs.iter().zip(power) {
        if f >= band.0 && f <= band.1 && p > max_power {
            max_power = p;
            peak_freq = Some(f);
        }
    }
    peak_freq
}

/// Calculate breathing rate using Welch's method
pub fn calc_breathing_welch(signal: &[f64], sample_rate: f64, band: (f64, f64)) -> Option<f64> {
    let nperseg = signal.len().min(256);
    if nperseg < 4 {
        return None;
    }
    let (freqs, psd) = welch(signal, sample_rate, nperseg, nperseg / 2)?;
    peak_in_band(&freqs, &psd, band).map(|f| f * 60.0)
}

/// Calculate breathing rate using a zero-padded FFT
pub fn calc_breathing_fft(signal: &[f64], sample_rate: f64, band: (f64, f64)) -> Option<f64> {
    if signal.len() < 4 {
        return None;
    }

    // Pad signal to power of 2
    let n = signal.len().next_power_of_two();
    let mut padded = vec![Complex::new(0.0, 0.0); n];
    for (slot, &x) in padded.iter_mut().zip(signal) {
        *slot = Complex::new(x, 0.0);
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut padded);

    let psd: Vec<f64> = padded[..=n / 2].iter().map(|c| c.norm_sqr()).collect();
    let freq_resolution = sample_rate / n as f64;
    let freqs: Vec<f64> = (0..psd.len()).map(|i| i as f64 * freq_resolution).collect();
    trace!("FFT breathing: n={}, resolution {:.4} Hz", n, freq_resolution);
    peak_in_band(&freqs, &psd, band).map(|f| f * 60.0)
}

fn demean(values: &mut [f64]) {
    if let Some(mean) = stats::mean(values) {
        values.iter_mut().for_each(|x| *x -= mean);
    }
}

/// Breathing rate over sliding windows of the uniformly resampled RR series
pub fn sliding_breathing_rate(signal: &[f64], options: &RespiratoryOptions) -> Option<SlidingRate> {
    let window = (options.window_secs * options.sample_rate) as usize;
    let step = ((window as f64 * (1.0 - options.window_overlap)) as usize).max(1);
    if window < 4 || signal.len() < window {
        return None;
    }

    let mut times = Vec::new();
    let mut rates = Vec::new();
    let mut start = 0;
    while start + window <= signal.len() {
        let mut segment = signal[start..start + window].to_vec();
        demean(&mut segment);
        if let Some(rate) = calc_breathing_fft(&segment, options.sample_rate, options.band) {
            times.push((start as f64 + window as f64 / 2.0) / options.sample_rate);
            rates.push(rate);
        }
        start += step;
    }

    Some(SlidingRate {
        mean: stats::mean(&rates)?,
        std: stats::std_dev(&rates, 0)?,
        times,
        rates,
    })
}

/// Respiratory rate from an RR interval series sampled at `times` (seconds)
pub fn respiratory_from_rr(times: &[f64], rr_ms: &[f64], options: &RespiratoryOptions) -> Option<RespiratoryResult> {
    if rr_ms.len() < 4 {
        debug!("Only {} valid RR samples, skipping respiratory estimate", rr_ms.len());
        return None;
    }

    let mut interpolated = interpolate_uniform(times, rr_ms, options.sample_rate);
    demean(&mut interpolated);

    let welch_bpm = calc_breathing_welch(&interpolated, options.sample_rate, options.band);
    let fft_bpm = calc_breathing_fft(&interpolated, options.sample_rate, options.band);
    let disagreement = match (welch_bpm, fft_bpm) {
        (Some(w), Some(f)) => Some((w - f).abs()),
        _ => None,
    };
    let mean_rr = stats::mean(rr_ms)?;

    Some(RespiratoryResult {
        welch_bpm,
        fft_bpm,
        disagreement,
        sliding: sliding_breathing_rate(&interpolated, options),
        rr_times: times.to_vec(),
        rr_ms: rr_ms.to_vec(),
        mean_heart_rate: 60000.0 / mean_rr,
    })
}

pub fn estimate_respiratory_rate(table: &SessionTable, options: &RespiratoryOptions) -> Option<RespiratoryResult> {
    let Some((times, rr)) = rr_intervals(table) else {
        warn!("No {} column, skipping respiratory estimate", HEART_RATE_COLUMN);
        return None;
    };
    let result = respiratory_from_rr(&times, &rr, options)?;
    debug!(
        "Respiratory rate: welch {:?}, fft {:?} breaths/min",
        result.welch_bpm, result.fft_bpm
    );
    Some(result)
}
