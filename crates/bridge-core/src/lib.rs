//! bridge-core: LLM Bridge Core Library
//!
//! セッション管理、会話ログ、バックエンドのストリーミング応答の集約、
//! ターン処理のコア機能を提供します。

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;
pub mod supervisor;
pub mod turn;

pub use backend::{ChatBackend, ChatRequest, HttpBackend};
pub use config::{BackendConfig, BotConfig, Config, ServerConfig, SessionConfig};
pub use error::{Error, Result};
pub use session::{
    ConversationLog, InMemoryConversationLog, InMemorySessionRegistry, Role, SessionId,
    SessionLimits, SessionRegistry, Turn,
};
pub use stream::{aggregate, StreamAggregator, StreamEvent};
pub use supervisor::BackendProcess;
pub use turn::{TurnHandler, TurnOutcome};
