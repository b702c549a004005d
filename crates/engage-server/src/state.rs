//! Application state

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use uuid::Uuid;

use crate::engine::Engine;
use crate::models::Principal;
use crate::notify::Notifier;

/// Bearer-token session. Tokens are opaque and expire; identity is the
/// user uid they resolve to.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_uid: Uuid,
    pub expires_at: i64,
}

pub const SESSION_TTL_SECS: i64 = 12 * 3600;

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub struct AppState {
    pub engine: Arc<Engine>,
    pub notifier: Arc<Notifier>,
    pub sessions: DashMap<String, AuthSession>,
    /// Shared secret for the schedule-sync and venue-admin endpoints.
    pub sync_key: Option<String>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, notifier: Arc<Notifier>, sync_key: Option<String>) -> Self {
        Self {
            engine,
            notifier,
            sessions: DashMap::new(),
            sync_key,
        }
    }

    /// Issue a fresh session token for a user. Each issue also sweeps out
    /// expired sessions so abandoned tokens do not pile up in the table.
    pub fn issue_session(&self, user_uid: Uuid) -> (String, i64) {
        let now = now_unix();
        self.sessions.retain(|_, session| session.expires_at >= now);
        let token = Uuid::new_v4().to_string();
        let expires_at = now + SESSION_TTL_SECS;
        self.sessions.insert(
            token.clone(),
            AuthSession {
                user_uid,
                expires_at,
            },
        );
        (token, expires_at)
    }

    /// Resolve a token to a principal; expired sessions are dropped here.
    pub fn principal_for(&self, token: &str) -> Option<Principal> {
        let session = self.sessions.get(token)?;
        if session.expires_at < now_unix() {
            drop(session);
            self.sessions.remove(token);
            return None;
        }
        Some(Principal {
            user_uid: session.user_uid,
        })
    }

    pub fn is_sync_key(&self, candidate: &str) -> bool {
        self.sync_key.as_deref() == Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::repo::memory::MemoryRepository;

    fn state() -> AppState {
        let notifier = Arc::new(Notifier::default());
        let engine = Arc::new(Engine::new(
            Arc::new(MemoryRepository::new()),
            notifier.clone(),
            EngineConfig::default(),
        ));
        AppState::new(engine, notifier, None)
    }

    #[test]
    fn issuing_a_session_sweeps_expired_ones() {
        let state = state();
        state.sessions.insert(
            "stale".to_string(),
            AuthSession {
                user_uid: Uuid::new_v4(),
                expires_at: now_unix() - 1,
            },
        );

        let (token, _) = state.issue_session(Uuid::new_v4());
        assert!(!state.sessions.contains_key("stale"));
        assert!(state.sessions.contains_key(&token));
    }

    #[test]
    fn expired_token_is_rejected_and_removed() {
        let state = state();
        state.sessions.insert(
            "old".to_string(),
            AuthSession {
                user_uid: Uuid::new_v4(),
                expires_at: now_unix() - 1,
            },
        );

        assert!(state.principal_for("old").is_none());
        assert!(!state.sessions.contains_key("old"));
    }
}

