//! Pending login-flow sessions.
//!
//! Between the redirect to the IdP and the callback, the flow keeps the
//! state, nonce, and PKCE verifier server-side, keyed by an opaque
//! session key handed to the browser. Sessions are single-use: the
//! callback takes them out of the store before validating anything.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// How long a pending session stays redeemable.
pub const SESSION_TTL_MINUTES: i64 = 10;

/// Per-login secrets captured at initiation.
#[derive(Debug, Clone)]
pub struct FlowSession {
    pub provider_id: Uuid,
    pub state: String,
    pub nonce: String,
    pub pkce_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl FlowSession {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::minutes(SESSION_TTL_MINUTES)
    }
}

/// Storage for pending login sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, key: String, session: FlowSession);

    /// Remove and return the session for `key`. Expired sessions are
    /// discarded and reported as absent.
    async fn take(&self, key: &str) -> Option<FlowSession>;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, FlowSession>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, key: String, session: FlowSession) {
        self.sessions.insert(key, session);
    }

    async fn take(&self, key: &str) -> Option<FlowSession> {
        let (_, session) = self.sessions.remove(key)?;
        if session.is_expired(Utc::now()) {
            tracing::debug!(provider_id = %session.provider_id, "discarding expired login session");
            return None;
        }
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(created_at: DateTime<Utc>) -> FlowSession {
        FlowSession {
            provider_id: Uuid::new_v4(),
            state: "state123".to_string(),
            nonce: "nonce456".to_string(),
            pkce_verifier: "verifier789".to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = InMemorySessionStore::new();
        store.put("key".to_string(), session(Utc::now())).await;

        assert!(store.take("key").await.is_some());
        assert!(store.take("key").await.is_none());
    }

    #[tokio::test]
    async fn test_take_unknown_key() {
        let store = InMemorySessionStore::new();
        assert!(store.take("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_discarded() {
        let store = InMemorySessionStore::new();
        let stale = session(Utc::now() - Duration::minutes(SESSION_TTL_MINUTES + 1));
        store.put("key".to_string(), stale).await;

        assert!(store.take("key").await.is_none());
    }
}
