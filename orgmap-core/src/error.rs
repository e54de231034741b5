use orgmap_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Unsupported root object: {0}")]
    UnsupportedRootObject(String),

    #[error("No analyzable record found")]
    NoAnalyzableRecord,

    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;
