mod common;

use muse_report::config::AnalysisConfig;
use muse_report::data_loading::{load_session, LoadOptions};
use muse_report::pipeline;
use muse_report::DataError;

#[test]
fn test_full_pipeline_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("session.csv");
    common::write_session_csv(&csv, 150.0);
    let out = dir.path().join("out");

    let mut config = AnalysisConfig::default();
    config.segments.warmup_minutes = 0.5;
    config.segments.segment_minutes = 0.5;

    let result = pipeline::run(&csv, &out, &config, true).unwrap();
    assert!(result.report.exists());
    assert!(result.summary.exists());
    assert!(result.json.as_ref().unwrap().exists());
    assert!(out.join("img").join("psd.png").exists());

    let analysis = &result.analysis;
    assert_eq!(analysis.eeg_channels, vec!["TP9", "AF7", "AF8", "TP10"]);
    let paf = analysis.paf.as_ref().unwrap();
    assert!((paf.iaf - 10.0).abs() <= 0.5, "iaf {}", paf.iaf);
    assert!(analysis.fnirs.is_some());
    assert!(analysis.ratios.is_some());
    assert_eq!(analysis.markers.len(), 1);
    let segments = analysis.segments.as_ref().unwrap();
    assert_eq!(segments.segments.len(), 4);
    assert!(analysis.score.is_some());

    let report = std::fs::read_to_string(&result.report).unwrap();
    for section in [
        "# Muse EEG Session Report",
        "## Signal Quality",
        "## Summary",
        "## Frequency Bands",
        "### Peak Alpha Frequency",
        "## fNIRS",
        "## Time Segments",
        "](img/psd.png)",
    ] {
        assert!(report.contains(section), "missing {}", section);
    }

    let mut reader = csv::Reader::from_path(&result.summary).unwrap();
    assert_eq!(reader.records().count(), 1);
}

#[test]
fn test_missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_session(&dir.path().join("absent.csv"), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, DataError::FileNotFound(_)));
}

#[test]
fn test_band_power_only_export_skips_raw_sections() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("bands.csv");
    std::fs::write(
        &csv,
        "TimeStamp,Alpha_AF7,Alpha_AF8,Beta_AF7,Beta_AF8,Theta_AF7,Theta_AF8,HeadBandOn\n\
         2025-10-26 08:00:00.000,0.9,1.0,0.4,0.5,0.5,0.6,1\n\
         2025-10-26 08:00:01.000,0.8,0.9,0.4,0.4,0.6,0.5,1\n\
         2025-10-26 08:00:02.000,0.9,1.1,0.3,0.5,0.5,0.5,1\n\
         2025-10-26 08:00:03.000,1.0,1.0,0.5,0.4,0.4,0.6,0\n",
    )
    .unwrap();
    let table = load_session(&csv, &LoadOptions::default()).unwrap();
    assert_eq!(table.len(), 3);

    let analysis = pipeline::analyze(&table, &AnalysisConfig::default()).unwrap();
    assert!(analysis.psd.is_none());
    assert!(analysis.paf.is_none());
    assert!(analysis.score.is_none());
    assert!(analysis.alpha_asymmetry.is_some());
    assert!(!analysis.band_stats.is_empty());
}
