use anyhow::{Context, Result};
use muse_report::data_loading::{parse_timestamp, timestamp_diagnostics, TIMESTAMP_COLUMN};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <csv_file>", args[0]);
        std::process::exit(1);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(&args[1])
        .with_context(|| format!("Failed to open {}", args[1]))?;
    let headers = reader.headers()?.clone();

    println!("\nSchema ({} columns):", headers.len());
    for (i, name) in headers.iter().enumerate() {
        println!("  {:>3} {}", i, name);
    }

    let ts_idx = headers
        .iter()
        .position(|h| h == TIMESTAMP_COLUMN)
        .with_context(|| format!("No {} column", TIMESTAMP_COLUMN))?;

    let mut rows = 0usize;
    let mut invalid = 0usize;
    let mut timestamps = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        rows += 1;
        match record.get(ts_idx).map(|v| parse_timestamp(row, v)) {
            Some(Ok(ts)) => timestamps.push(ts),
            _ => invalid += 1,
        }
    }

    println!("\nRows: {} ({} without a valid timestamp)", rows, invalid);
    if timestamps.len() < 2 {
        println!("Not enough timestamps for sampling diagnostics");
        return Ok(());
    }
    let diag = timestamp_diagnostics(&timestamps);
    println!("Duration: {:.1} s", diag.duration_secs);
    if let Some(step) = diag.median_positive_step_ms {
        println!("Median positive step: {:.3} ms", step);
    }
    println!("Zero steps (duplicate timestamps): {}", diag.zero_steps);
    if let Some(rate) = diag.effective_rate_hz {
        println!("Effective row rate: {:.2} Hz", rate);
    }

    Ok(())
}
