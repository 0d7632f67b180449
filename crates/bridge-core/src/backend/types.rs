//! Backend request types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;
use crate::Result;

/// Body of a backend chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: SessionId,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            message: message.into(),
            session_id,
        }
    }
}

/// A chat backend that turns one user message into one complete reply
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<String>;
}
