//! Small NaN-aware descriptive statistics and series helpers shared by the
//! analysis modules. Missing values are represented as `f64::NAN` throughout.

use serde::Serialize;

/// Copy of the finite values of a slice
pub fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let data = finite(values);
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Standard deviation with `ddof` delta degrees of freedom (0 = population, 1 = sample)
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    let data = finite(values);
    if data.len() <= ddof {
        return None;
    }
    let m = data.iter().sum::<f64>() / data.len() as f64;
    let var = data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (data.len() - ddof) as f64;
    Some(var.sqrt())
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted = finite(values);
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Quantile with linear interpolation between closest ranks
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let sorted = sorted_finite(values);
    quantile_sorted(&sorted, q)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

pub fn min(values: &[f64]) -> Option<f64> {
    finite(values).into_iter().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    finite(values).into_iter().reduce(f64::max)
}

/// Index of the largest finite value; ties resolve to the first occurrence
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|(i, a), (j, b)| a.total_cmp(b).then(j.cmp(i)))
        .map(|(i, _)| i)
}

/// Descriptive summary used across report tables
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    /// Summary over finite values; `None` when there are none.
    /// `std` is the sample standard deviation (NaN for a single value).
    pub fn of(values: &[f64]) -> Option<Self> {
        let sorted = sorted_finite(values);
        if sorted.is_empty() {
            return None;
        }
        Some(Summary {
            count: sorted.len(),
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: quantile_sorted(&sorted, 0.5)?,
            std: std_dev(&sorted, 1).unwrap_or(f64::NAN),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Drop values whose absolute z-score (population std) is not below `threshold`.
/// Returns the kept values and the number removed. A constant series is kept whole.
pub fn zscore_filter(values: &[f64], threshold: f64) -> (Vec<f64>, usize) {
    let data = finite(values);
    let (Some(m), Some(s)) = (mean(&data), std_dev(&data, 0)) else {
        return (Vec::new(), 0);
    };
    if s == 0.0 {
        return (data, 0);
    }
    let kept: Vec<f64> = data
        .iter()
        .copied()
        .filter(|&x| ((x - m) / s).abs() < threshold)
        .collect();
    let removed = data.len() - kept.len();
    (kept, removed)
}

/// Count values with absolute z-score above `threshold`
pub fn zscore_outliers(values: &[f64], threshold: f64) -> usize {
    let data = finite(values);
    match (mean(&data), std_dev(&data, 0)) {
        (Some(m), Some(s)) if s > 0.0 => data
            .iter()
            .filter(|&&x| ((x - m) / s).abs() > threshold)
            .count(),
        _ => 0,
    }
}

fn window_bounds(i: usize, len: usize, window: usize, centered: bool) -> (usize, usize) {
    let window = window.max(1);
    if centered {
        let before = window / 2;
        let after = window - 1 - before;
        (i.saturating_sub(before), (i + after + 1).min(len))
    } else {
        ((i + 1).saturating_sub(window), i + 1)
    }
}

/// Rolling mean over `window` samples, ignoring NaN (min_periods = 1)
pub fn rolling_mean(values: &[f64], window: usize, centered: bool) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let (start, end) = window_bounds(i, values.len(), window, centered);
            mean(&values[start..end]).unwrap_or(f64::NAN)
        })
        .collect()
}

/// Rolling median over `window` samples, ignoring NaN (min_periods = 1)
pub fn rolling_median(values: &[f64], window: usize, centered: bool) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            let (start, end) = window_bounds(i, values.len(), window, centered);
            median(&values[start..end]).unwrap_or(f64::NAN)
        })
        .collect()
}

/// Fill NaN gaps by linear interpolation, then forward/back fill the edges
pub fn interpolate_gaps(values: &mut [f64]) {
    let known: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
    let (Some(&first), Some(&last)) = (known.first(), known.last()) else {
        return;
    };

    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a > 1 {
            let (va, vb) = (values[a], values[b]);
            for j in a + 1..b {
                let alpha = (j - a) as f64 / (b - a) as f64;
                values[j] = va + alpha * (vb - va);
            }
        }
    }
    let head = values[first];
    values[..first].iter_mut().for_each(|v| *v = head);
    let tail = values[last];
    values[last + 1..].iter_mut().for_each(|v| *v = tail);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Median,
}

/// Group samples into fixed-width time bins aligned to multiples of `bin_secs`.
///
/// Returns the bin start times on the same axis as `times` and the
/// aggregated value per bin; empty bins hold NaN. `times` must be sorted.
pub fn resample(times: &[f64], values: &[f64], bin_secs: f64, agg: Aggregate) -> (Vec<f64>, Vec<f64>) {
    if times.is_empty() || bin_secs <= 0.0 {
        return (Vec::new(), Vec::new());
    }
    let origin = (times[0] / bin_secs).floor() * bin_secs;
    let n_bins = ((times[times.len() - 1] - origin) / bin_secs).floor() as usize + 1;
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
    for (&t, &v) in times.iter().zip(values) {
        let idx = (((t - origin) / bin_secs).floor() as usize).min(n_bins - 1);
        if v.is_finite() {
            buckets[idx].push(v);
        }
    }
    let starts = (0..n_bins).map(|i| origin + i as f64 * bin_secs).collect();
    let aggregated = buckets
        .iter()
        .map(|b| match agg {
            Aggregate::Mean => mean(b),
            Aggregate::Median => median(b),
        }
        .unwrap_or(f64::NAN))
        .collect();
    (starts, aggregated)
}

/// Min-max normalisation to 0..1; a constant series maps to 0.5, NaN stays NaN
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let (Some(lo), Some(hi)) = (min(values), max(values)) else {
        return vec![f64::NAN; values.len()];
    };
    if (hi - lo).abs() < 1e-12 {
        return values
            .iter()
            .map(|v| if v.is_finite() { 0.5 } else { f64::NAN })
            .collect();
    }
    values.iter().map(|v| (v - lo) / (hi - lo)).collect()
}

/// Mean of the first and second half of a series plus the relative change in percent
pub fn half_comparison(values: &[f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN, f64::NAN);
    }
    let mid = values.len().div_ceil(2);
    let first = mean(&values[..mid]).unwrap_or(f64::NAN);
    let second = mean(&values[mid..]).unwrap_or(f64::NAN);
    let change = if first.is_finite() && first != 0.0 && second.is_finite() {
        (second - first) / first * 100.0
    } else {
        f64::NAN
    };
    (first, second, change)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_prefers_first_of_equal_maxima() {
        assert_eq!(argmax(&[1.0, 3.0, f64::NAN, 3.0]), Some(1));
        assert_eq!(argmax(&[0.0; 5]), Some(0));
        assert_eq!(argmax(&[f64::NAN]), None);
    }

    #[test]
    fn test_nan_aware_summary() {
        let values = [1.0, f64::NAN, 3.0, 2.0, 4.0];
        let summary = Summary::of(&values).unwrap();
        assert_eq!(summary.count, 4);
        assert!((summary.mean - 2.5).abs() < 1e-12);
        assert!((summary.median - 2.5).abs() < 1e-12);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert!(Summary::of(&[f64::NAN]).is_none());
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&values, 0.25).unwrap() - 1.75).abs() < 1e-12);
        assert!((quantile(&values, 0.75).unwrap() - 3.25).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_filter_removes_spike() {
        let mut values = vec![1.0; 50];
        values.extend([1.1, 0.9, 1.05, 0.95]);
        values.push(100.0);
        let (kept, removed) = zscore_filter(&values, 3.0);
        assert_eq!(removed, 1);
        assert!(kept.iter().all(|&v| v < 2.0));
    }

    #[test]
    fn test_interpolate_gaps() {
        let mut values = [f64::NAN, 1.0, f64::NAN, f64::NAN, 4.0, f64::NAN];
        interpolate_gaps(&mut values);
        assert_eq!(values, [1.0, 1.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn test_resample_bins() {
        let times = [0.0, 0.5, 1.0, 1.5, 3.2];
        let values = [1.0, 3.0, 5.0, 7.0, 9.0];
        let (starts, means) = resample(&times, &values, 1.0, Aggregate::Mean);
        assert_eq!(starts, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(means[0], 2.0);
        assert_eq!(means[1], 6.0);
        assert!(means[2].is_nan());
        assert_eq!(means[3], 9.0);
    }

    #[test]
    fn test_resample_aligns_to_bin_multiples() {
        let times = [12.0, 15.0, 20.0, 29.5, 31.0];
        let values = [1.0, 3.0, 5.0, 7.0, 9.0];
        let (starts, means) = resample(&times, &values, 10.0, Aggregate::Mean);
        assert_eq!(starts, vec![10.0, 20.0, 30.0]);
        assert_eq!(means, vec![2.0, 6.0, 9.0]);
    }

    #[test]
    fn test_rolling_windows() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(rolling_mean(&values, 2, false), vec![1.0, 1.5, 2.5, 3.5]);
        assert_eq!(rolling_median(&values, 3, true), vec![1.5, 2.0, 3.0, 3.5]);
    }

    #[test]
    fn test_half_comparison() {
        let (first, second, change) = half_comparison(&[1.0, 1.0, 2.0, 2.0]);
        assert_eq!(first, 1.0);
        assert_eq!(second, 2.0);
        assert!((change - 100.0).abs() < 1e-12);
    }
}
