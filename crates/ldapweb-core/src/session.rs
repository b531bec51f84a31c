//! Session storage for the embedding web layer.
//!
//! The directory client never looks at sessions. A web layer that wants to keep a user signed in
//! between requests stores the login here and turns it back into a per-request credential
//! itself.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Opaque session identifier handed to the client (e.g. in a cookie).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random identifier (v4).
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner [`Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::ValidationError("malformed session id".to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed-in user's login as retained between requests.
#[derive(Debug)]
pub struct Session {
    username: String,
    password: SecretString,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session stamped with the current time.
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            created_at: Utc::now(),
        }
    }

    /// Username the session was opened for.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password the user signed in with.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true once `ttl` has elapsed since creation.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= ttl
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
            created_at: self.created_at,
        }
    }
}

/// Storage for sessions keyed by [`SessionId`].
pub trait SessionStore: Send + Sync {
    /// Stores a session and returns its new identifier.
    ///
    /// Implementations may drop expired sessions at the same time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if the store is unusable.
    fn create(&self, session: Session) -> Result<SessionId>;

    /// Returns the live session for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if the store is unusable.
    fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Removes the session, returning true if it existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if the store is unusable.
    fn remove(&self, id: &SessionId) -> Result<bool>;

    /// Drops every expired session and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if the store is unusable.
    fn purge_expired(&self) -> Result<usize>;
}

/// In-process session store with a fixed time-to-live.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Creates an empty store whose sessions live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored sessions, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.sessions.read().map_err(poisoned)?.len())
    }

    /// Returns true if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, session: Session) -> Result<SessionId> {
        let id = SessionId::new_v4();
        let now = Utc::now();
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.retain(|_, existing| !existing.is_expired(self.ttl, now));
        debug!(username = session.username(), "session created");
        sessions.insert(id, session);
        Ok(id)
    }

    fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let now = Utc::now();
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions
            .get(id)
            .filter(|session| !session.is_expired(self.ttl, now))
            .cloned())
    }

    fn remove(&self, id: &SessionId) -> Result<bool> {
        let removed = self.sessions.write().map_err(poisoned)?.remove(id);
        if let Some(session) = &removed {
            debug!(username = session.username(), "session removed");
        }
        Ok(removed.is_some())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.ttl, now));
        Ok(before - sessions.len())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::InternalError("session store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(username: &str) -> Session {
        Session::new(username, SecretString::from("hunter2".to_string()))
    }

    #[test]
    fn create_then_get() {
        let store = MemorySessionStore::new(Duration::minutes(30));
        let id = store.create(session("alice")).unwrap();

        let found = store.get(&id).unwrap().unwrap();
        assert_eq!(found.username(), "alice");
        assert_eq!(found.password().expose_secret(), "hunter2");
        assert!(store.get(&SessionId::new_v4()).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_are_invisible_and_purged() {
        let store = MemorySessionStore::new(Duration::zero());
        let id = store.create(session("bob")).unwrap();

        assert!(store.get(&id).unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn create_evicts_expired_sessions() {
        let store = MemorySessionStore::new(Duration::zero());
        for name in ["erin", "frank", "grace"] {
            store.create(session(name)).unwrap();
        }
        assert_eq!(store.len().unwrap(), 1);

        let store = MemorySessionStore::new(Duration::hours(1));
        store.create(session("erin")).unwrap();
        store.create(session("frank")).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn remove_reports_presence() {
        let store = MemorySessionStore::new(Duration::hours(1));
        let id = store.create(session("carol")).unwrap();

        assert!(store.remove(&id).unwrap());
        assert!(!store.remove(&id).unwrap());
    }

    #[test]
    fn session_debug_redacts_password() {
        let rendered = format!("{:?}", session("dave"));
        assert!(rendered.contains("dave"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn session_id_round_trips_through_display() {
        let id = SessionId::new_v4();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-session".parse::<SessionId>().is_err());
    }
}
