//! Per-session chat state.
//!
//! Each browser session owns a [`ChatSession`]: its password flag and the
//! ordered chat history. Sessions live in a [`SessionStore`] until they sit
//! idle past the configured timeout, and are handed to request handlers
//! explicitly.
//!
//! A session is held behind its own async mutex. The chat handler keeps the
//! lock for the whole knowledge-base round-trip, so a second question on the
//! same session while one is in flight is refused rather than queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::ChatTurn;

#[derive(Debug, Default)]
pub struct ChatSession {
    authenticated: bool,
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(authenticated: bool) -> Self {
        Self {
            authenticated,
            turns: Vec::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Check `attempt` against the configured password.
    ///
    /// A wrong password leaves the session locked; the caller may simply
    /// prompt again.
    pub fn authenticate(&mut self, expected: Option<&str>, attempt: &str) -> bool {
        let ok = match expected {
            None => true,
            Some(expected) => constant_time_eq(expected.as_bytes(), attempt.as_bytes()),
        };
        if ok {
            self.authenticated = true;
        }
        ok
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Clear the chat history. Authentication is kept.
    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

type SharedSession = Arc<AsyncMutex<ChatSession>>;

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

/// In-memory registry of live sessions keyed by id.
///
/// Sessions unused for longer than the idle timeout are dropped. When the
/// store is full, starting a session evicts the least recently used one.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Entry>>>,
    password_required: bool,
    idle_timeout: Duration,
    max_sessions: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    NotFound,
    Busy,
}

impl SessionStore {
    pub fn new(password_required: bool, idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            password_required,
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Start a session and return its id.
    pub fn create(&self) -> String {
        self.create_at(Instant::now())
    }

    fn create_at(&self, now: Instant) -> String {
        let id = Uuid::new_v4().to_string();
        let session = ChatSession::new(!self.password_required);

        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, e| now.saturating_duration_since(e.last_used) <= self.idle_timeout);
        if sessions.len() < before {
            tracing::debug!(expired = before - sessions.len(), "idle sessions dropped");
        }
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            tracing::debug!(session = %oldest, "session evicted, store full");
        }
        sessions.insert(
            id.clone(),
            Entry {
                session: Arc::new(AsyncMutex::new(session)),
                last_used: now,
            },
        );
        tracing::debug!(session = %id, "session started");
        id
    }

    pub fn password_required(&self) -> bool {
        self.password_required
    }

    /// Number of sessions currently held.
    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }

    /// Wait for exclusive access to a session.
    pub async fn acquire(&self, id: &str) -> Result<OwnedMutexGuard<ChatSession>, SessionError> {
        let session = self.get_at(id, Instant::now())?;
        Ok(session.lock_owned().await)
    }

    /// Take exclusive access only if no other request holds the session.
    pub fn try_acquire(&self, id: &str) -> Result<OwnedMutexGuard<ChatSession>, SessionError> {
        let session = self.get_at(id, Instant::now())?;
        session.try_lock_owned().map_err(|_| SessionError::Busy)
    }

    fn get_at(&self, id: &str, now: Instant) -> Result<SharedSession, SessionError> {
        let mut sessions = self.lock();
        let entry = sessions.get_mut(id).ok_or(SessionError::NotFound)?;
        if now.saturating_duration_since(entry.last_used) > self.idle_timeout {
            sessions.remove(id);
            tracing::debug!(session = %id, "session expired");
            return Err(SessionError::NotFound);
        }
        entry.last_used = now;
        Ok(entry.session.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // The map only holds Arcs; a poisoned lock still has a consistent map.
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }
}
