//! Session management module
//!
//! Maps channel users to backend sessions and keeps the per-session turn history.
//! Both stores sit behind traits so a persistent backing store can replace the
//! in-memory ones without touching the turn handler.

mod log;
mod registry;
mod types;

pub use log::{ConversationLog, InMemoryConversationLog};
pub use registry::{InMemorySessionRegistry, SessionLimits, SessionRegistry};
pub use types::{Role, SessionId, Turn};
