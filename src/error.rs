use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required column missing: {0}")]
    MissingColumn(String),

    #[error("Invalid timestamp '{value}' on row {row}")]
    InvalidTimestamp { row: usize, value: String },

    #[error("No usable rows in input: {0}")]
    Empty(String),

    #[error("Not enough samples: {0}")]
    InsufficientData(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
