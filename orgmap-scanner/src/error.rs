use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("No valid API session found (last rejection: {last_endpoint})")]
    NoValidSession { last_endpoint: String },

    #[error("Remote request failed with status {status}: {body_hint}")]
    RemoteRequest { status: u16, body_hint: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
