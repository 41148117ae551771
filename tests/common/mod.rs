use chrono::{Duration, NaiveDate};
use std::f64::consts::PI;
use std::io::Write;
use std::path::Path;

pub const SFREQ: f64 = 256.0;

/// Write a synthetic Mind Monitor export: 10 Hz alpha on every RAW channel,
/// constant band powers, good contact and a heart rate modulated at 0.25 Hz.
pub fn write_session_csv(path: &Path, secs: f64) {
    let mut file = std::fs::File::create(path).unwrap();
    let sites = ["TP9", "AF7", "AF8", "TP10"];
    let bands = [("Delta", 0.6), ("Theta", 0.5), ("Alpha", 0.9), ("Beta", 0.4), ("Gamma", 0.1)];

    let mut header = vec!["TimeStamp".to_string()];
    for (band, _) in &bands {
        header.extend(sites.iter().map(|s| format!("{}_{}", band, s)));
    }
    header.extend(sites.iter().map(|s| format!("RAW_{}", s)));
    header.extend(sites.iter().map(|s| format!("HSI_{}", s)));
    header.extend((1..=4).map(|i| format!("Optics{}", i)));
    header.extend(["Heart_Rate", "HeadBandOn", "Elements"].map(String::from));
    writeln!(file, "{}", header.join(",")).unwrap();

    let start = NaiveDate::from_ymd_opt(2025, 10, 26)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    let n = (secs * SFREQ) as usize;
    for i in 0..n {
        let t = i as f64 / SFREQ;
        let ts = start + Duration::microseconds((t * 1e6) as i64);
        let mut row = vec![ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()];
        for (_, power) in &bands {
            row.extend(sites.iter().map(|_| format!("{:.3}", power)));
        }
        for (k, _) in sites.iter().enumerate() {
            let v = 800.0 + 20.0 * (2.0 * PI * 10.0 * t + k as f64).sin();
            row.push(format!("{:.4}", v));
        }
        row.extend(sites.iter().map(|_| "1".to_string()));
        for k in 0..4 {
            let v = 300.0 + 5.0 * (2.0 * PI * 0.05 * t + k as f64).sin();
            row.push(format!("{:.4}", v));
        }
        row.push(format!("{:.3}", 60.0 + 5.0 * (2.0 * PI * 0.25 * t).sin()));
        row.push("1".to_string());
        row.push(if i == n / 2 { "/muse/elements/blink".to_string() } else { String::new() });
        writeln!(file, "{}", row.join(",")).unwrap();
    }
}
