use anyhow::Context;
use clap::Parser;
use log::{debug, LevelFilter};
use muse_report::config::Args;
use muse_report::pipeline;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = args.analysis_config();
    debug!("{:?}", config);

    let output = pipeline::run(&args.data, &args.output, &config, args.json)
        .with_context(|| format!("Analysis of {} failed", args.data.display()))?;

    println!("Report: {}", output.report.display());
    println!("Summary: {}", output.summary.display());
    if let Some(json) = &output.json {
        println!("JSON: {}", json.display());
    }
    if let Some(score) = output.analysis.score {
        println!("Meditation score: {:.1} ({})", score.total, score.level.label());
    }

    Ok(())
}
