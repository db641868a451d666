use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NocturneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Unsupported telescope: {0}")]
    UnsupportedTelescope(String),

    #[error("Missing header key {key} in {}", path.display())]
    MissingHeaderKey { key: String, path: PathBuf },

    #[error("Header key {key} in {} has unusable value: {value}", path.display())]
    InvalidHeaderValue {
        key: String,
        path: PathBuf,
        value: String,
    },

    #[error("Frame dimensions {frame_rows}x{frame_cols} do not match calibration frame {cal_rows}x{cal_cols}")]
    DimensionMismatch {
        frame_rows: usize,
        frame_cols: usize,
        cal_rows: usize,
        cal_cols: usize,
    },

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NocturneError>;
