//! PNG figures for the report, drawn with plotters into `<output>/img/`.

use crate::band_analysis::RatioKind;
use crate::pipeline::SessionAnalysis;
use crate::spectral::Spectrogram;
use anyhow::Result;
use log::{debug, warn};
use plotters::prelude::*;
use std::collections::HashSet;
use std::path::Path;

pub const IMG_DIR: &str = "img";
const SIZE: (u32, u32) = (1000, 500);
/// Upper bound on plotted points per line
const MAX_POINTS: usize = 2000;
const MAX_FRAMES: usize = 300;

const COLORS: [RGBColor; 6] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Figure {
    Psd,
    Spectrogram,
    PafEvolution,
    BandRatios,
    Faa,
    FmTheta,
    Entropy,
    Fnirs,
    Respiratory,
    Segments,
}

impl Figure {
    pub fn file_name(&self) -> &'static str {
        match self {
            Figure::Psd => "psd.png",
            Figure::Spectrogram => "spectrogram.png",
            Figure::PafEvolution => "paf_time_evolution.png",
            Figure::BandRatios => "band_ratios.png",
            Figure::Faa => "frontal_alpha_asymmetry.png",
            Figure::FmTheta => "frontal_midline_theta.png",
            Figure::Entropy => "spectral_entropy.png",
            Figure::Fnirs => "fnirs.png",
            Figure::Respiratory => "respiratory_rate.png",
            Figure::Segments => "segments.png",
        }
    }
}

/// Figures that were written, addressable by relative path
#[derive(Debug, Clone, Default)]
pub struct Figures {
    written: HashSet<Figure>,
}

impl Figures {
    /// Path relative to the report, if the figure exists
    pub fn path(&self, figure: Figure) -> Option<String> {
        self.written
            .contains(&figure)
            .then(|| format!("{}/{}", IMG_DIR, figure.file_name()))
    }

    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

struct Line {
    label: String,
    points: Vec<(f64, f64)>,
}

impl Line {
    fn new(label: impl Into<String>, xs: &[f64], ys: &[f64]) -> Self {
        let points: Vec<(f64, f64)> = xs
            .iter()
            .zip(ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| (x, y))
            .collect();
        let step = points.len().div_ceil(MAX_POINTS).max(1);
        Line {
            label: label.into(),
            points: points.into_iter().step_by(step).collect(),
        }
    }
}

fn minutes(secs: &[f64]) -> Vec<f64> {
    secs.iter().map(|s| s / 60.0).collect()
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.1 };
    Some((lo - pad, hi + pad))
}

fn line_chart(path: &Path, title: &str, x_desc: &str, y_desc: &str, lines: &[Line]) -> Result<bool> {
    let (Some(x_range), Some(y_range)) = (
        bounds(lines.iter().flat_map(|l| l.points.iter().map(|p| p.0))),
        bounds(lines.iter().flat_map(|l| l.points.iter().map(|p| p.1))),
    ) else {
        return Ok(false);
    };

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()?;

    for (i, line) in lines.iter().enumerate() {
        let color = COLORS[i % COLORS.len()];
        chart
            .draw_series(LineSeries::new(line.points.iter().copied(), color.stroke_width(2)))?
            .label(line.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if lines.len() > 1 || lines.iter().any(|l| !l.label.is_empty()) {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(true)
}

/// Map 0..1 onto a dark blue to yellow ramp
fn heat_color(v: f64) -> RGBColor {
    let v = v.clamp(0.0, 1.0);
    RGBColor(
        (68.0 + v * (253.0 - 68.0)) as u8,
        (1.0 + v * (231.0 - 1.0)) as u8,
        (84.0 + v * (37.0 - 84.0)) as u8,
    )
}

fn spectrogram_chart(path: &Path, spec: &Spectrogram) -> Result<bool> {
    let n_frames = spec.times.len();
    if n_frames == 0 || spec.freqs.len() < 2 {
        return Ok(false);
    }
    // Average adjacent frames into at most MAX_FRAMES columns
    let group = n_frames.div_ceil(MAX_FRAMES).max(1);
    let columns: Vec<(f64, f64, Vec<f64>)> = (0..n_frames)
        .step_by(group)
        .map(|start| {
            let end = (start + group).min(n_frames);
            let db: Vec<f64> = (0..spec.freqs.len())
                .map(|f| {
                    let mean = (start..end).map(|t| spec.power[[f, t]]).sum::<f64>() / (end - start) as f64;
                    10.0 * mean.max(1e-12).log10()
                })
                .collect();
            (spec.times[start] / 60.0, spec.times[end - 1] / 60.0, db)
        })
        .collect();

    let all_db: Vec<f64> = columns.iter().flat_map(|c| c.2.iter().copied()).collect();
    let (Some(lo), Some(hi)) = (
        crate::stats::quantile(&all_db, 0.02),
        crate::stats::quantile(&all_db, 0.98),
    ) else {
        return Ok(false);
    };
    let span = (hi - lo).max(1e-9);
    let df = spec.freqs[1] - spec.freqs[0];
    let frame_width = columns
        .get(1)
        .map(|c| c.0 - columns[0].0)
        .unwrap_or(1.0 / 60.0);
    let x_max = columns.last().map(|c| c.0 + frame_width).unwrap_or(1.0);
    let f_min = spec.freqs[0];
    let f_max = spec.freqs[spec.freqs.len() - 1] + df;

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Spectrogram (channel mean, dB)", ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(columns[0].0..x_max, f_min..f_max)?;
    chart
        .configure_mesh()
        .x_desc("Time (min)")
        .y_desc("Frequency (Hz)")
        .disable_mesh()
        .draw()?;

    chart.draw_series(columns.iter().flat_map(|(x0, _, db)| {
        db.iter().enumerate().map(move |(i, v)| {
            let f0 = spec.freqs[i];
            Rectangle::new(
                [(*x0, f0), (x0 + frame_width, f0 + df)],
                heat_color((v - lo) / span).filled(),
            )
        })
    }))?;

    root.present()?;
    Ok(true)
}

fn draw(figures: &mut Figures, img_dir: &Path, figure: Figure, render: impl FnOnce(&Path) -> Result<bool>) {
    let path = img_dir.join(figure.file_name());
    match render(&path) {
        Ok(true) => {
            debug!("Wrote {}", path.display());
            figures.written.insert(figure);
        }
        Ok(false) => debug!("Nothing to plot for {:?}", figure),
        Err(e) => warn!("Failed to draw {}: {}", path.display(), e),
    }
}

/// Render every figure the analysis has data for. Individual plot failures
/// are logged and leave the figure out of the report.
pub fn render_figures(analysis: &SessionAnalysis, output_dir: &Path) -> Result<Figures> {
    let img_dir = output_dir.join(IMG_DIR);
    std::fs::create_dir_all(&img_dir)?;
    let mut figures = Figures::default();

    if let Some(psd) = &analysis.psd {
        draw(&mut figures, &img_dir, Figure::Psd, |path| {
            let lines: Vec<Line> = psd
                .channels
                .iter()
                .zip(psd.power.rows())
                .map(|(name, row)| {
                    let db: Vec<f64> = row.iter().map(|p| 10.0 * p.max(1e-12).log10()).collect();
                    Line::new(name.as_str(), &psd.freqs, &db)
                })
                .collect();
            line_chart(path, "Power spectral density (Welch)", "Frequency (Hz)", "Power (dB uV^2/Hz)", &lines)
        });
    }

    if let Some(spec) = &analysis.spectrogram {
        draw(&mut figures, &img_dir, Figure::Spectrogram, |path| spectrogram_chart(path, spec));
    }

    if let Some(evo) = &analysis.paf_evolution {
        draw(&mut figures, &img_dir, Figure::PafEvolution, |path| {
            let t = minutes(&evo.times);
            line_chart(
                path,
                "Peak alpha frequency over time",
                "Time (min)",
                "PAF (Hz)",
                &[Line::new("PAF", &t, &evo.paf), Line::new("Smoothed", &t, &evo.smoothed)],
            )
        });
    }

    if let Some(ratios) = &analysis.ratios {
        draw(&mut figures, &img_dir, Figure::BandRatios, |path| {
            let lines: Vec<Line> = RatioKind::ALL
                .iter()
                .filter_map(|k| ratios.get(*k))
                .map(|s| Line::new(s.kind.label(), &minutes(&s.times), &s.smoothed))
                .collect();
            line_chart(path, "Band power ratios", "Time (min)", "Ratio", &lines)
        });
    }

    if let Some(faa) = &analysis.faa {
        draw(&mut figures, &img_dir, Figure::Faa, |path| {
            let t = minutes(&faa.times);
            let zero = vec![0.0; t.len()];
            line_chart(
                path,
                "Frontal alpha asymmetry ln(AF8) - ln(AF7)",
                "Time (min)",
                "FAA",
                &[Line::new("FAA", &t, &faa.values), Line::new("0", &t, &zero)],
            )
        });
    }

    if let Some(fm) = &analysis.fmtheta {
        draw(&mut figures, &img_dir, Figure::FmTheta, |path| {
            let label = format!("Fm theta {:.0}-{:.0} Hz", fm.range.0, fm.range.1);
            line_chart(
                path,
                "Frontal midline theta",
                "Time (min)",
                "Power (uV^2)",
                &[Line::new(label, &minutes(&fm.times), &fm.values)],
            )
        });
    }

    if let Some(series) = &analysis.entropy_series {
        draw(&mut figures, &img_dir, Figure::Entropy, |path| {
            line_chart(
                path,
                "Spectral entropy over time",
                "Time (min)",
                "Normalised entropy",
                &[Line::new("Spectral entropy", &minutes(&series.times), &series.values)],
            )
        });
    }

    if let Some(fnirs) = &analysis.fnirs {
        draw(&mut figures, &img_dir, Figure::Fnirs, |path| {
            let t = minutes(&fnirs.times);
            line_chart(
                path,
                "fNIRS hemoglobin change",
                "Time (min)",
                "Relative concentration",
                &[
                    Line::new("HbO left", &t, &fnirs.left.hbo),
                    Line::new("HbO right", &t, &fnirs.right.hbo),
                    Line::new("HbR left", &t, &fnirs.left.hbr),
                    Line::new("HbR right", &t, &fnirs.right.hbr),
                ],
            )
        });
    }

    if let Some(sliding) = analysis.respiratory.as_ref().and_then(|r| r.sliding.as_ref()) {
        draw(&mut figures, &img_dir, Figure::Respiratory, |path| {
            line_chart(
                path,
                "Respiratory rate (sliding FFT)",
                "Time (min)",
                "Breaths/min",
                &[Line::new("Respiratory rate", &minutes(&sliding.times), &sliding.rates)],
            )
        });
    }

    if let Some(segments) = &analysis.segments {
        draw(&mut figures, &img_dir, Figure::Segments, |path| {
            let idx: Vec<f64> = segments.normalized.iter().map(|n| n.index as f64).collect();
            let pick = |f: fn(&crate::segment_analysis::NormalizedSegment) -> f64| -> Vec<f64> {
                segments.normalized.iter().map(f).collect()
            };
            line_chart(
                path,
                "Key metrics by segment (normalised)",
                "Segment",
                "Normalised score",
                &[
                    Line::new("Fm theta", &idx, &pick(|n| n.fmtheta)),
                    Line::new("Alpha", &idx, &pick(|n| n.alpha)),
                    Line::new("Beta", &idx, &pick(|n| n.beta)),
                    Line::new("Theta/Alpha", &idx, &pick(|n| n.theta_alpha)),
                ],
            )
        });
    }

    println!("Wrote {} figures to {}", figures.len(), img_dir.display());
    Ok(figures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_chart_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("line.png");
        let xs: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| (x / 10.0).sin()).collect();
        let written = line_chart(&path, "Test", "x", "y", &[Line::new("sin", &xs, &ys)]).unwrap();
        assert!(written);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn test_line_chart_skips_empty_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        let written = line_chart(&path, "Empty", "x", "y", &[Line::new("nan", &[0.0], &[f64::NAN])]).unwrap();
        assert!(!written);
        assert!(!path.exists());
    }

    #[test]
    fn test_line_downsampling() {
        let xs: Vec<f64> = (0..10_000).map(|i| i as f64).collect();
        let line = Line::new("many", &xs, &xs);
        assert!(line.points.len() <= MAX_POINTS);
        assert_eq!(line.points[0], (0.0, 0.0));
    }

    #[test]
    fn test_figure_paths_are_relative() {
        let mut figures = Figures::default();
        assert!(figures.path(Figure::Psd).is_none());
        figures.written.insert(Figure::Psd);
        assert_eq!(figures.path(Figure::Psd).as_deref(), Some("img/psd.png"));
    }
}
