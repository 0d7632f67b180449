//! Error types for bridge-core

use std::time::Duration;

use thiserror::Error;

/// Main error type for bridge-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend error: {status} - {body}")]
    Backend { status: u16, body: String },

    #[error("Backend stream idle for {0:?}")]
    StreamTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend process error: {0}")]
    Process(String),
}

/// Result type alias for bridge-core
pub type Result<T> = std::result::Result<T, Error>;
