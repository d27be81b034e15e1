pub mod config;
pub use config::{
    BinningConfig, Config, CredibilityConfig, ExportConfig, RenderConfig, SurvivalConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PmssmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("invalid credibility fraction {0}: must lie in (0, 1]")]
    InvalidFraction(f64),
    #[error("expression error: {0}")]
    Expr(String),
    #[error("column '{column}' not found in schema (available: {available})")]
    UnknownColumn { column: String, available: String },
    #[error("invalid axis: {0}")]
    InvalidAxis(String),
    #[error("unknown analysis: {0}")]
    UnknownAnalysis(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("render error: {0}")]
    Render(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PmssmError>;
