//! Session registry
//!
//! Thread-safe user → session mapping using DashMap

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

use super::SessionId;

/// Optional bounds applied by [`SessionRegistry::sweep`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionLimits {
    /// Maximum number of tracked users (0 = unlimited)
    pub max_sessions: usize,
    /// Drop sessions idle longer than this
    pub idle_timeout: Option<Duration>,
}

impl SessionLimits {
    /// Whether `sweep` can ever remove anything
    pub fn is_bounded(&self) -> bool {
        self.max_sessions > 0 || self.idle_timeout.is_some()
    }
}

/// User → session mapping
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Return the session of `user_id`, creating it on first contact
    async fn resolve(&self, user_id: &str) -> SessionId;

    /// Look up a session without creating one
    async fn get(&self, user_id: &str) -> Option<SessionId>;

    /// Number of tracked users
    async fn len(&self) -> usize;

    /// Sessions currently assigned to a user
    async fn session_ids(&self) -> Vec<SessionId>;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply the configured limits and return the sessions that were dropped
    async fn sweep(&self, now: DateTime<Utc>) -> Vec<SessionId>;
}

#[derive(Debug, Clone)]
struct SessionEntry {
    session_id: SessionId,
    last_seen: DateTime<Utc>,
}

/// In-memory session registry
#[derive(Clone, Default)]
pub struct InMemorySessionRegistry {
    sessions: Arc<DashMap<String, SessionEntry>>,
    limits: SessionLimits,
}

impl InMemorySessionRegistry {
    /// Create an unbounded registry: sessions live for the whole process
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that `sweep` keeps within `limits`
    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    fn resolve_at(&self, user_id: &str, now: DateTime<Utc>) -> SessionId {
        // The entry guard holds the shard lock, so check-and-insert is atomic per user.
        let mut entry = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                let session_id = SessionId::generate();
                info!("Created session {} for user {}", session_id, user_id);
                SessionEntry {
                    session_id,
                    last_seen: now,
                }
            });
        entry.last_seen = now;
        entry.session_id.clone()
    }

    fn is_expired(&self, entry: &SessionEntry, now: DateTime<Utc>) -> bool {
        let Some(timeout) = self.limits.idle_timeout else {
            return false;
        };
        (now - entry.last_seen)
            .to_std()
            .map(|idle| idle > timeout)
            .unwrap_or(false)
    }

    fn remove_expired(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| self.is_expired(entry.value(), now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::new();
        for user_id in expired {
            // Re-check under the lock: the user may have sent a message meanwhile.
            if let Some((_, entry)) = self
                .sessions
                .remove_if(&user_id, |_, entry| self.is_expired(entry, now))
            {
                info!("Cleaned up idle session {} for user {}", entry.session_id, user_id);
                removed.push(entry.session_id);
            }
        }
        removed
    }

    fn remove_overflow(&self) -> Vec<SessionId> {
        let max = self.limits.max_sessions;
        if max == 0 || self.sessions.len() <= max {
            return Vec::new();
        }

        let mut by_age: Vec<(String, DateTime<Utc>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_seen))
            .collect();
        by_age.sort_by_key(|(_, last_seen)| *last_seen);

        let excess = by_age.len().saturating_sub(max);
        by_age.truncate(excess);
        self.evict_unchanged(by_age)
    }

    /// Remove each candidate unless it was seen again after the snapshot
    fn evict_unchanged(&self, candidates: Vec<(String, DateTime<Utc>)>) -> Vec<SessionId> {
        let max = self.limits.max_sessions;
        let mut removed = Vec::with_capacity(candidates.len());
        for (user_id, seen) in candidates {
            if let Some((_, entry)) = self
                .sessions
                .remove_if(&user_id, |_, entry| entry.last_seen == seen)
            {
                info!("Evicted session {} for user {} (capacity {})", entry.session_id, user_id, max);
                removed.push(entry.session_id);
            }
        }
        removed
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn resolve(&self, user_id: &str) -> SessionId {
        self.resolve_at(user_id, Utc::now())
    }

    async fn get(&self, user_id: &str) -> Option<SessionId> {
        self.sessions
            .get(user_id)
            .map(|entry| entry.session_id.clone())
    }

    async fn len(&self) -> usize {
        self.sessions.len()
    }

    async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions
            .iter()
            .map(|entry| entry.session_id.clone())
            .collect()
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        if !self.limits.is_bounded() {
            return Vec::new();
        }
        let mut removed = self.remove_expired(now);
        removed.extend(self.remove_overflow());
        removed
    }
}
