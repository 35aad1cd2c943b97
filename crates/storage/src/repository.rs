use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use study_core::Clock;
use study_core::model::{Session, SessionId};
use thiserror::Error;
use tracing::{debug, info};

/// Shared handle to one session.
///
/// The async mutex is the per-session serialization point: it is held for
/// the whole of a request's dispatch, including any generation round trip,
/// while other sessions stay unaffected.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Errors surfaced by session stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
}

/// Process-wide table of live sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Allocate a session with default field values and return its id.
    async fn create(&self) -> SessionId;

    /// Resolve a live session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the id is unknown, reset or expired.
    async fn get(&self, id: SessionId) -> Result<SessionHandle, StorageError>;

    /// Discard the session entirely (documents, test, score, weak topics) and
    /// allocate a fresh one. Unknown ids simply get a fresh session.
    async fn reset(&self, id: SessionId) -> SessionId;

    /// Drop a session. Returns whether it existed.
    async fn remove(&self, id: SessionId) -> bool;

    /// Drop every session idle for longer than `ttl`; returns the dropped ids.
    async fn purge_expired(&self, ttl: Duration) -> Vec<SessionId>;

    /// Number of live sessions.
    async fn len(&self) -> usize;
}

//
// ─── IN-MEMORY STORE ───────────────────────────────────────────────────────────
//

struct Entry {
    handle: SessionHandle,
    last_access: DateTime<Utc>,
}

/// In-memory session table.
///
/// The table lock is only held for map operations, never across an await;
/// each session carries its own async lock. Removing an entry drops the
/// session's document index and active test together with it.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    clock: Clock,
    sessions: Arc<Mutex<HashMap<SessionId, Entry>>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Same table, different clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // A panic while holding the table lock cannot leave a half-written entry
    // (every critical section is a single map call), so poisoning is ignored.
    fn table(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_fresh(&self, table: &mut HashMap<SessionId, Entry>) -> SessionId {
        let now = self.clock.now();
        let mut id = SessionId::generate();
        while table.contains_key(&id) {
            id = SessionId::generate();
        }
        table.insert(
            id,
            Entry {
                handle: Arc::new(tokio::sync::Mutex::new(Session::new(id, now))),
                last_access: now,
            },
        );
        id
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn create(&self) -> SessionId {
        let id = {
            let mut table = self.table();
            self.insert_fresh(&mut table)
        };
        info!(session_id = %id, "session created");
        id
    }

    async fn get(&self, id: SessionId) -> Result<SessionHandle, StorageError> {
        let mut table = self.table();
        let entry = table.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        entry.last_access = self.clock.now();
        Ok(Arc::clone(&entry.handle))
    }

    async fn reset(&self, id: SessionId) -> SessionId {
        let (existed, fresh) = {
            let mut table = self.table();
            let existed = table.remove(&id).is_some();
            (existed, self.insert_fresh(&mut table))
        };
        info!(old_session_id = %id, session_id = %fresh, existed, "session reset");
        fresh
    }

    async fn remove(&self, id: SessionId) -> bool {
        let removed = self.table().remove(&id).is_some();
        if removed {
            debug!(session_id = %id, "session removed");
        }
        removed
    }

    async fn purge_expired(&self, ttl: Duration) -> Vec<SessionId> {
        let expired: Vec<SessionId> = {
            let mut table = self.table();
            let expired: Vec<SessionId> = table
                .iter()
                .filter(|(_, entry)| self.clock.has_elapsed(entry.last_access, ttl))
                .map(|(id, _)| *id)
                .collect();
            for id in &expired {
                table.remove(id);
            }
            expired
        };
        if !expired.is_empty() {
            info!(count = expired.len(), "expired sessions purged");
        }
        expired
    }

    async fn len(&self) -> usize {
        self.table().len()
    }
}
