//! Turn handling
//!
//! One inbound user message in, one outbound text out. Backend failures are
//! turned into the configured apology here and never propagate further.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::backend::{ChatBackend, ChatRequest};
use crate::config::default_apology;
use crate::session::{ConversationLog, Role, SessionId, SessionRegistry};

/// Result of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing to do (empty message)
    Ignored,
    /// The backend's aggregated reply
    Replied(String),
    /// The backend failed; the apology text is delivered instead
    Apologized(String),
}

impl TurnOutcome {
    /// Text to deliver to the user, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Ignored => None,
            Self::Replied(text) | Self::Apologized(text) => Some(text.as_str()),
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored)
    }
}

/// Orchestrates session lookup, history and the backend call for each turn
pub struct TurnHandler {
    registry: Arc<dyn SessionRegistry>,
    log: Arc<dyn ConversationLog>,
    backend: Arc<dyn ChatBackend>,
    apology: String,
}

impl TurnHandler {
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        log: Arc<dyn ConversationLog>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            registry,
            log,
            backend,
            apology: default_apology(),
        }
    }

    /// Override the text delivered when the backend fails
    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        self.apology = apology.into();
        self
    }

    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    pub fn log(&self) -> &Arc<dyn ConversationLog> {
        &self.log
    }

    /// Handle one user message
    ///
    /// The user turn is recorded before the backend call and is kept even when
    /// the call fails, so a failed attempt stays visible in the history.
    pub async fn handle_turn(&self, user_id: &str, message: &str) -> TurnOutcome {
        if message.is_empty() {
            debug!("Ignoring empty message from {}", user_id);
            return TurnOutcome::Ignored;
        }

        let session_id = self.registry.resolve(user_id).await;
        self.log
            .append(&session_id, Role::User, message.to_string())
            .await;

        let request = ChatRequest::new(message, session_id.clone());
        match self.backend.chat(&request).await {
            Ok(reply) => {
                if self.registry.get(user_id).await.as_ref() == Some(&session_id) {
                    self.log
                        .append(&session_id, Role::Assistant, reply.clone())
                        .await;
                } else {
                    debug!("Session {} was swept during the backend call; reply not logged", session_id);
                }
                TurnOutcome::Replied(reply)
            }
            Err(e) => {
                error!("Error communicating with backend (session {}): {}", session_id, e);
                TurnOutcome::Apologized(self.apology.clone())
            }
        }
    }

    /// Apply the registry limits and drop the history of removed sessions
    pub async fn sweep_sessions(&self) -> usize {
        let removed = self.registry.sweep(Utc::now()).await;
        for session_id in &removed {
            self.log.forget(session_id).await;
        }
        let orphaned = self.forget_orphaned_logs().await;
        if !removed.is_empty() || orphaned > 0 {
            info!(
                "Session sweep removed {} session(s), {} orphaned log(s)",
                removed.len(),
                orphaned
            );
        }
        removed.len()
    }

    /// Forget history whose session is no longer registered
    async fn forget_orphaned_logs(&self) -> usize {
        // Log first: a session is registered before its first append, so
        // anything logged here and missing below is gone for good.
        let logged = self.log.session_ids().await;
        let live: HashSet<SessionId> = self.registry.session_ids().await.into_iter().collect();

        let mut forgotten = 0;
        for session_id in logged.iter().filter(|id| !live.contains(*id)) {
            self.log.forget(session_id).await;
            forgotten += 1;
        }
        forgotten
    }

    /// Start a background task running [`Self::sweep_sessions`] every `every`
    pub fn start_sweep_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep_sessions().await;
            }
        })
    }
}
