use crate::auth::Role;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "territory_session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// In-memory sessions keyed by an opaque random token. Sessions do not
/// survive a restart.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Starts a session and drops every expired one.
    pub async fn create(&self, role: Role) -> Session {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            role,
            expires_at: now + self.ttl,
        };
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, existing| !existing.is_expired(now));
        sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Live session for `token`. Expired sessions are dropped on lookup.
    pub async fn get(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().await.remove(token);
        None
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
