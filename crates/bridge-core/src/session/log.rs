//! Conversation log
//!
//! Append-only per-session turn history.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{Role, SessionId, Turn};

/// Per-session record of user and assistant turns
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Append a turn, creating the session's history if needed
    async fn append(&self, session_id: &SessionId, role: Role, content: String);

    /// Snapshot of a session's turns in insertion order (empty if unknown)
    async fn turns(&self, session_id: &SessionId) -> Vec<Turn>;

    /// Drop a session's history
    async fn forget(&self, session_id: &SessionId);

    /// Sessions that have history
    async fn session_ids(&self) -> Vec<SessionId>;

    /// Number of sessions with history
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory conversation log
#[derive(Clone, Default)]
pub struct InMemoryConversationLog {
    logs: Arc<DashMap<SessionId, Vec<Turn>>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationLog for InMemoryConversationLog {
    async fn append(&self, session_id: &SessionId, role: Role, content: String) {
        let mut turns = self.logs.entry(session_id.clone()).or_default();
        turns.push(Turn::new(role, content));
        debug!("Session {}: appended {} turn (#{})", session_id, role, turns.len());
    }

    async fn turns(&self, session_id: &SessionId) -> Vec<Turn> {
        self.logs
            .get(session_id)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }

    async fn forget(&self, session_id: &SessionId) {
        if self.logs.remove(session_id).is_some() {
            debug!("Forgot history of session {}", session_id);
        }
    }

    async fn session_ids(&self) -> Vec<SessionId> {
        self.logs.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn len(&self) -> usize {
        self.logs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_preserves_order() {
        let log = InMemoryConversationLog::new();
        let session = SessionId::from("session-1");

        log.append(&session, Role::User, "hi".to_string()).await;
        log.append(&session, Role::Assistant, "hello".to_string()).await;
        log.append(&session, Role::User, "how are you?".to_string()).await;

        let turns = log.turns(&session).await;
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello", "how are you?"]);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let log = InMemoryConversationLog::new();
        assert!(log.turns(&SessionId::from("missing")).await.is_empty());
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let log = InMemoryConversationLog::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        log.append(&a, Role::User, "from a".to_string()).await;
        log.append(&b, Role::User, "from b".to_string()).await;

        assert_eq!(log.turns(&a).await.len(), 1);
        assert_eq!(log.turns(&b).await[0].content, "from b");
        assert_eq!(log.len().await, 2);

        let mut ids = log.session_ids().await;
        ids.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_forget() {
        let log = InMemoryConversationLog::new();
        let session = SessionId::from("session-1");
        log.append(&session, Role::User, "hi".to_string()).await;

        log.forget(&session).await;

        assert!(log.turns(&session).await.is_empty());
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_content_stored_verbatim() {
        let log = InMemoryConversationLog::new();
        let session = SessionId::from("session-1");
        let long = "x".repeat(100_000);

        log.append(&session, Role::User, long.clone()).await;

        assert_eq!(log.turns(&session).await[0].content, long);
    }
}
