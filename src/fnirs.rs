//! fNIRS processing for the Muse optics channels
//!
//! Implements the Modified Beer-Lambert Law for computing relative
//! oxygenated (HbO) and deoxygenated (HbR) hemoglobin changes from the
//! 730 nm and 850 nm intensities.

use crate::data_loading::SessionTable;
use crate::stats::{self, Summary};
use log::{debug, warn};
use serde::Serialize;

/// Molar extinction coefficients `[HbO, HbR]` at 730 nm
pub const EXTINCTION_730: [f64; 2] = [1.4866, 3.8437];
/// Molar extinction coefficients `[HbO, HbR]` at 850 nm
pub const EXTINCTION_850: [f64; 2] = [2.5264, 1.7989];
pub const DPF: f64 = 6.0;
pub const SOURCE_DETECTOR_DISTANCE_CM: f64 = 3.0;
pub const SCALE_FACTOR: f64 = 10000.0;
/// Native optics rate of the headband
pub const OPTICS_RATE_HZ: f64 = 64.0;

/// Solves the 2x2 Beer-Lambert system for a pair of optical density changes
#[derive(Clone, Debug)]
pub struct HemoglobinSolver {
    /// Inverse extinction matrix divided by the optical path length and scaled
    inv_matrix: [[f64; 2]; 2],
}

impl HemoglobinSolver {
    /// # Arguments
    ///
    /// * `dpf` - Differential pathlength factor
    /// * `distance_cm` - Source-detector distance in cm
    /// * `scale` - Output scaling applied to the concentrations
    #[must_use]
    pub fn new(dpf: f64, distance_cm: f64, scale: f64) -> Self {
        let [a11, a12] = EXTINCTION_730;
        let [a21, a22] = EXTINCTION_850;
        let det = a11 * a22 - a12 * a21;
        let k = scale / (dpf * distance_cm * det);
        HemoglobinSolver {
            inv_matrix: [[a22 * k, -a12 * k], [-a21 * k, a11 * k]],
        }
    }

    /// Returns `(ΔHbO, ΔHbR)` for ΔOD at 730 nm and 850 nm
    pub fn solve(&self, od_730: f64, od_850: f64) -> (f64, f64) {
        let m = &self.inv_matrix;
        (
            m[0][0] * od_730 + m[0][1] * od_850,
            m[1][0] * od_730 + m[1][1] * od_850,
        )
    }
}

impl Default for HemoglobinSolver {
    fn default() -> Self {
        HemoglobinSolver::new(DPF, SOURCE_DETECTOR_DISTANCE_CM, SCALE_FACTOR)
    }
}

/// Reference intensity used for ΔOD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum BaselineMode {
    /// Mean of the first samples of the session
    Initial,
    /// Mean over the whole session
    SessionMean,
}

#[derive(Debug, Clone, Copy)]
pub struct FnirsOptions {
    pub baseline: BaselineMode,
    pub baseline_secs: f64,
    pub optics_rate_hz: f64,
}

impl Default for FnirsOptions {
    fn default() -> Self {
        FnirsOptions {
            baseline: BaselineMode::Initial,
            baseline_secs: 10.0,
            optics_rate_hz: OPTICS_RATE_HZ,
        }
    }
}

impl FnirsOptions {
    pub fn baseline_samples(&self) -> usize {
        ((self.baseline_secs * self.optics_rate_hz) as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    /// `(730 nm, 850 nm)` optics columns of this side
    pub fn columns(&self) -> (&'static str, &'static str) {
        match self {
            Hemisphere::Left => ("Optics1", "Optics3"),
            Hemisphere::Right => ("Optics2", "Optics4"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HemisphereHb {
    pub side: Hemisphere,
    pub hbo: Vec<f64>,
    pub hbr: Vec<f64>,
    pub hbo_stats: Option<Summary>,
    pub hbr_stats: Option<Summary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FnirsResult {
    pub times: Vec<f64>,
    pub left: HemisphereHb,
    pub right: HemisphereHb,
}

fn baseline(values: &[f64], options: &FnirsOptions) -> Option<f64> {
    let valid: Vec<f64> = values.iter().copied().filter(|&v| v.is_finite() && v > 0.0).collect();
    match options.baseline {
        BaselineMode::Initial => {
            let n = options.baseline_samples().min(valid.len());
            stats::mean(&valid[..n])
        }
        BaselineMode::SessionMean => stats::mean(&valid),
    }
}

fn delta_od(values: &[f64], reference: f64) -> Vec<f64> {
    values
        .iter()
        .map(|&v| {
            if v.is_finite() && v > 0.0 {
                -(v / reference).log10()
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// HbO/HbR series for one hemisphere
pub fn hemisphere_hb(
    intensity_730: &[f64],
    intensity_850: &[f64],
    side: Hemisphere,
    solver: &HemoglobinSolver,
    options: &FnirsOptions,
) -> Option<HemisphereHb> {
    let od_730 = delta_od(intensity_730, baseline(intensity_730, options)?);
    let od_850 = delta_od(intensity_850, baseline(intensity_850, options)?);
    let (hbo, hbr): (Vec<f64>, Vec<f64>) = od_730
        .iter()
        .zip(&od_850)
        .map(|(&a, &b)| {
            if a.is_nan() || b.is_nan() {
                (f64::NAN, f64::NAN)
            } else {
                solver.solve(a, b)
            }
        })
        .unzip();
    Some(HemisphereHb {
        side,
        hbo_stats: Summary::of(&hbo),
        hbr_stats: Summary::of(&hbr),
        hbo,
        hbr,
    })
}

pub fn analyze_fnirs(table: &SessionTable, options: &FnirsOptions) -> Option<FnirsResult> {
    let solver = HemoglobinSolver::default();
    let mut sides = Vec::with_capacity(2);
    for side in [Hemisphere::Left, Hemisphere::Right] {
        let (c730, c850) = side.columns();
        let (Some(i730), Some(i850)) = (table.column(c730), table.column(c850)) else {
            warn!("Optics columns {} / {} missing, skipping fNIRS", c730, c850);
            return None;
        };
        match hemisphere_hb(i730, i850, side, &solver, options) {
            Some(hb) => sides.push(hb),
            None => {
                warn!("No positive optics intensities for {:?} hemisphere", side);
                return None;
            }
        }
    }

    let right = sides.pop()?;
    let left = sides.pop()?;
    debug!(
        "fNIRS: left HbO mean {:?}, right HbO mean {:?}",
        left.hbo_stats.map(|s| s.mean),
        right.hbo_stats.map(|s| s.mean)
    );
    Some(FnirsResult {
        times: table.elapsed_seconds(),
        left,
        right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_matches_direct_inverse() {
        let solver = HemoglobinSolver::default();
        let (od_730, od_850) = (0.02, -0.01);
        let (hbo, hbr) = solver.solve(od_730, od_850);

        // Check eps @ conc == ΔOD / pathlength * scale
        let path = DPF * SOURCE_DETECTOR_DISTANCE_CM;
        let lhs_730 = EXTINCTION_730[0] * hbo + EXTINCTION_730[1] * hbr;
        let lhs_850 = EXTINCTION_850[0] * hbo + EXTINCTION_850[1] * hbr;
        assert!((lhs_730 - od_730 / path * SCALE_FACTOR).abs() < 1e-9);
        assert!((lhs_850 - od_850 / path * SCALE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_constant_intensity_gives_zero_change() {
        let options = FnirsOptions::default();
        let hb = hemisphere_hb(
            &[500.0; 100],
            &[800.0; 100],
            Hemisphere::Left,
            &HemoglobinSolver::default(),
            &options,
        )
        .unwrap();
        assert!(hb.hbo.iter().all(|v| v.abs() < 1e-12));
        assert!(hb.hbr.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_drop_in_730_intensity() {
        let options = FnirsOptions {
            baseline_secs: 1.0,
            ..FnirsOptions::default()
        };
        let mut i730 = vec![1000.0; 128];
        i730.extend(vec![500.0; 64]);
        i730.push(0.0);
        let i850 = vec![1000.0; i730.len()];
        let hb = hemisphere_hb(
            &i730,
            &i850,
            Hemisphere::Right,
            &HemoglobinSolver::default(),
            &options,
        )
        .unwrap();
        assert!(hb.hbo[150] < 0.0);
        assert!(hb.hbr[150] > 0.0);
        assert!(hb.hbo.last().unwrap().is_nan());
        assert_eq!(hb.hbo_stats.unwrap().count, 192);
    }

    #[test]
    fn test_session_mean_baseline() {
        let options = FnirsOptions {
            baseline: BaselineMode::SessionMean,
            ..FnirsOptions::default()
        };
        let i730 = [900.0, 1100.0];
        let hb = hemisphere_hb(&i730, &[1000.0, 1000.0], Hemisphere::Left, &HemoglobinSolver::default(), &options)
            .unwrap();
        // ΔOD straddles zero around the session mean
        assert!(hb.hbo[0] * hb.hbo[1] < 0.0);
    }
}
