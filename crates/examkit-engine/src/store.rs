//! Session persistence abstraction.
//!
//! The service only talks to [`SessionStore`], so persistence is injectable
//! and nothing here is process-global. Writes use optimistic versioning: a
//! save with a stale version is a conflict, never a silent overwrite.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use examkit_core::error::{EngineError, Result};
use examkit_core::session::Session;

/// Storage backend for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session with its current version, or `None` when unknown.
    async fn load(&self, id: Uuid) -> Result<Option<(Session, u64)>>;

    /// Persist a session. `expected_version` must match the stored version
    /// (0 for a new session) or the write fails with a conflict. Returns the
    /// new version.
    async fn save(&self, session: Session, expected_version: u64) -> Result<u64>;

    /// Remove a session outright. Returns whether it existed. Normal
    /// retention goes through [`SessionStore::evict_settled`]; this is for
    /// administrative erasure.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// All sessions whose status is still live.
    async fn list_active(&self) -> Result<Vec<Session>>;

    /// The user's live session for a definition, if one exists.
    async fn find_active_for(&self, definition_id: &str, user_id: &str)
        -> Result<Option<Session>>;

    /// How many sessions the user has ever created for a definition,
    /// regardless of state. Eviction must never reduce this count, or
    /// attempt limits stop holding.
    async fn count_attempts(&self, definition_id: &str, user_id: &str) -> Result<u32>;

    /// Drop settled sessions past the backend's retention window. Backends
    /// without retention keep everything.
    async fn evict_settled(&self) -> Result<usize> {
        Ok(0)
    }
}

struct Entry {
    session: Session,
    version: u64,
    touched_at: Instant,
}

#[derive(Default)]
struct State {
    sessions: HashMap<Uuid, Entry>,
    /// Attempts ever created per (definition, user). Outlives eviction so
    /// attempt limits and attempt numbering hold after the session rows are
    /// gone.
    attempts: HashMap<(String, String), u32>,
}

/// In-memory store with TTL eviction of settled sessions.
///
/// Live sessions are never evicted; terminal ones are dropped once untouched
/// for longer than the TTL. The attempt ledger is kept separately and is
/// never evicted. Intended for tests and single-process deployments.
pub struct InMemorySessionStore {
    state: Mutex<State>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop settled sessions past their TTL. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let mut state = self.lock();
        let before = state.sessions.len();
        let ttl = self.ttl;
        state.sessions.retain(|_, e| {
            !e.session.status.is_terminal() || e.touched_at.elapsed() < ttl
        });
        let evicted = before - state.sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted settled sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<(Session, u64)>> {
        Ok(self
            .lock()
            .sessions
            .get(&id)
            .map(|e| (e.session.clone(), e.version)))
    }

    async fn save(&self, session: Session, expected_version: u64) -> Result<u64> {
        let mut state = self.lock();
        let current = state
            .sessions
            .get(&session.id)
            .map(|e| e.version)
            .unwrap_or(0);
        if current != expected_version {
            return Err(EngineError::Conflict(format!(
                "session {} version {current} does not match expected {expected_version}",
                session.id
            )));
        }
        // First save of a new session consumes an attempt in the ledger.
        if current == 0 {
            *state
                .attempts
                .entry((session.definition_id.clone(), session.user_id.clone()))
                .or_insert(0) += 1;
        }
        let version = current + 1;
        state.sessions.insert(
            session.id,
            Entry {
                session,
                version,
                touched_at: Instant::now(),
            },
        );
        Ok(version)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock().sessions.remove(&id).is_some())
    }

    async fn list_active(&self) -> Result<Vec<Session>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|e| e.session.status.is_live())
            .map(|e| e.session.clone())
            .collect())
    }

    async fn find_active_for(
        &self,
        definition_id: &str,
        user_id: &str,
    ) -> Result<Option<Session>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .find(|e| {
                e.session.status.is_live()
                    && e.session.definition_id == definition_id
                    && e.session.user_id == user_id
            })
            .map(|e| e.session.clone()))
    }

    async fn count_attempts(&self, definition_id: &str, user_id: &str) -> Result<u32> {
        Ok(self
            .lock()
            .attempts
            .get(&(definition_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn evict_settled(&self) -> Result<usize> {
        Ok(self.evict_expired())
    }
}
