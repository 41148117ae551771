pub mod band_analysis;
pub mod config;
pub mod data_loading;
pub mod error;
pub mod fnirs;
pub mod frontal;
pub mod heart_analysis;
pub mod output;
pub mod pipeline;
pub mod plots;
pub mod preprocessing;
pub mod report;
pub mod segment_analysis;
pub mod spectral;
pub mod stats;

pub use config::AnalysisConfig;
pub use data_loading::{load_session, LoadOptions, SessionTable};
pub use error::{DataError, Result};
pub use pipeline::{analyze, run, SessionAnalysis};
