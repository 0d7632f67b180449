//! bridge-botframework: Bot Framework channel for llm-bridge
//!
//! Bot Framework の messaging endpoint を提供し、受信した activity を
//! TurnHandler に渡して応答を connector 経由で返します。
//! HTTP (`POST /api/messages`) と WebSocket の両方に対応します。

pub mod adapter;
pub mod bot;
pub mod connector;
pub mod error;
pub mod server;
pub mod types;
pub mod ws;

pub use adapter::BotAdapter;
pub use bot::BotServer;
pub use connector::{ActivitySender, ConnectorClient};
pub use error::{ChannelError, Result};
pub use server::{create_router, ServerState};
pub use types::Activity;
