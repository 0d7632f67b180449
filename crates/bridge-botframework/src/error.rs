//! エラー型定義 (bridge-botframework)

use thiserror::Error;

/// bridge-botframework のエラー型
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connector error: {0}")]
    Connector(String),

    #[error("Invalid activity: {0}")]
    InvalidActivity(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, ChannelError>;
