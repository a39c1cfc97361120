//! Per-user session store: one lock per session, write-behind flush to
//! durable storage, idle eviction.
//!
//! Each session's turns live behind their own `tokio::sync::Mutex` so a
//! slow flush or a long Agent Loop iteration for one user never blocks
//! another user's session. A second, separate mutex per session
//! coalesces flushes — at most one flush per session is ever in flight,
//! matching `SessionLockMap`'s one-permit-per-key shape.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use sa_domain::config::SessionsConfig;
use sa_domain::error::Result;
use sa_domain::tool::Turn;
use sa_domain::trace::TraceEvent;

use crate::persist::{SerializedSession, SessionPersistence};

struct SessionData {
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    turns: Vec<Turn>,
    dirty: bool,
    messages_since_flush: u32,
}

/// A session's full in-memory state, reference-counted so the store's
/// map and any handle held by a caller point at the same lock.
struct SessionHandleInner {
    user_id: String,
    data: Mutex<SessionData>,
    flush_gate: Mutex<()>,
}

/// An opened session. Cloning is cheap — it's a handle onto shared state.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionHandleInner>,
}

impl SessionHandle {
    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionHandleInner>>>,
    persistence: Arc<dyn SessionPersistence>,
    config: SessionsConfig,
}

impl SessionStore {
    /// Construct the store. Scans `persistence` for existing session
    /// ids (a count, for crash-recovery visibility) without loading any
    /// of them — each loads lazily on its first `open`.
    pub async fn new(persistence: Arc<dyn SessionPersistence>, config: SessionsConfig) -> Result<Self> {
        let known = persistence.list().await?;
        tracing::info!(sessions = known.len(), "session store started, sessions load lazily");
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            persistence,
            config,
        })
    }

    /// Load a session from durable storage if cold, or create an empty
    /// one; install it in the in-memory map and return a handle.
    pub async fn open(&self, user_id: &str) -> Result<SessionHandle> {
        if let Some(inner) = self.sessions.read().get(user_id).cloned() {
            return Ok(SessionHandle { inner });
        }

        let loaded = self.persistence.get(user_id).await?;
        let (created_at, last_activity, turns) = match loaded {
            Some(s) => (s.created_at, s.last_activity, s.turns),
            None => {
                let now = Utc::now();
                (now, now, Vec::new())
            }
        };

        let inner = Arc::new(SessionHandleInner {
            user_id: user_id.to_string(),
            data: Mutex::new(SessionData {
                created_at,
                last_activity,
                turns,
                dirty: false,
                messages_since_flush: 0,
            }),
            flush_gate: Mutex::new(()),
        });

        // Another opener may have raced us; the first insert wins so
        // every caller for this user-id ends up sharing one lock.
        let inner = {
            let mut sessions = self.sessions.write();
            sessions
                .entry(user_id.to_string())
                .or_insert(inner)
                .clone()
        };

        Ok(SessionHandle { inner })
    }

    /// Append a turn under the session's exclusive lock, marking it
    /// dirty and scheduling a flush if the write-behind thresholds say so.
    pub async fn append(&self, handle: &SessionHandle, turn: Turn) -> Result<()> {
        let should_flush = {
            let mut data = handle.inner.data.lock().await;
            data.turns.push(turn);
            data.dirty = true;
            data.messages_since_flush += 1;
            data.last_activity = Utc::now();
            data.messages_since_flush >= self.config.flush_threshold
        };

        if should_flush {
            self.flush(handle).await?;
        }
        Ok(())
    }

    /// Snapshot of the ordered turns, for building an LLM request.
    pub async fn history(&self, handle: &SessionHandle) -> Vec<Turn> {
        handle.inner.data.lock().await.turns.clone()
    }

    /// Release a handle. Does not flush unless dirty — callers that
    /// want a guaranteed flush call `flush` explicitly first.
    pub async fn close(&self, handle: SessionHandle) -> Result<()> {
        let dirty = handle.inner.data.lock().await.dirty;
        if dirty {
            self.flush(&handle).await?;
        }
        Ok(())
    }

    /// Flush a session's pending turns to durable storage. Coalesced:
    /// if a flush for this session is already running, this call waits
    /// for it rather than racing a second write.
    pub async fn flush(&self, handle: &SessionHandle) -> Result<()> {
        let _gate = handle.inner.flush_gate.lock().await;

        let (snapshot, flushed_len) = {
            let data = handle.inner.data.lock().await;
            if !data.dirty {
                return Ok(());
            }
            (
                SerializedSession {
                    version: 1,
                    user_id: handle.inner.user_id.clone(),
                    created_at: data.created_at,
                    last_activity: data.last_activity,
                    turns: data.turns.clone(),
                },
                data.turns.len(),
            )
        };

        self.persistence.put(&handle.inner.user_id, &snapshot).await?;

        {
            let mut data = handle.inner.data.lock().await;
            if data.turns.len() == flushed_len {
                data.dirty = false;
                data.messages_since_flush = 0;
            } else {
                // Turns were appended while this flush was in flight;
                // stay dirty so the next trigger picks up the rest.
                data.messages_since_flush = (data.turns.len() - flushed_len) as u32;
            }
        }

        TraceEvent::SessionFlushed {
            session_key: handle.inner.user_id.clone(),
            turns: snapshot.turns.len(),
        }
        .emit();

        Ok(())
    }

    /// Idle-flush and idle-evict sessions per `SessionsConfig`. Intended
    /// to run on a periodic timer; one pass does not loop internally.
    pub async fn sweep(&self) -> Result<()> {
        let now = Utc::now();
        let candidates: Vec<(String, Arc<SessionHandleInner>)> = self
            .sessions
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut to_evict = Vec::new();
        for (user_id, inner) in candidates {
            let handle = SessionHandle { inner: inner.clone() };
            let (idle_ms, dirty) = {
                let data = inner.data.lock().await;
                (
                    now.signed_duration_since(data.last_activity).num_milliseconds().max(0) as u64,
                    data.dirty,
                )
            };

            if dirty && idle_ms >= self.config.flush_idle_ms {
                self.flush(&handle).await?;
            }
            if idle_ms >= self.config.evict_idle_ms {
                // Final flush before dropping it from memory.
                self.flush(&handle).await?;
                TraceEvent::SessionEvicted {
                    session_key: user_id.clone(),
                    idle_secs: (idle_ms / 1000) as i64,
                }
                .emit();
                to_evict.push(user_id);
            }
        }

        if !to_evict.is_empty() {
            let mut sessions = self.sessions.write();
            for user_id in &to_evict {
                sessions.remove(user_id);
            }
        }

        Ok(())
    }

    /// Flush every resident dirty session. Called on shutdown so no
    /// acknowledged append is lost when the process exits.
    pub async fn flush_all(&self) -> Result<()> {
        let residents: Vec<Arc<SessionHandleInner>> =
            self.sessions.read().values().cloned().collect();
        for inner in residents {
            let handle = SessionHandle { inner };
            self.flush(&handle).await?;
        }
        Ok(())
    }

    pub fn config(&self) -> &SessionsConfig {
        &self.config
    }

    pub fn resident_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::JsonFilePersistence;
    use sa_domain::tool::Message;

    async fn store(dir: &std::path::Path) -> SessionStore {
        let persistence = Arc::new(JsonFilePersistence::new(dir));
        SessionStore::new(persistence, SessionsConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn open_creates_empty_session_for_new_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let handle = store.open("alice").await.unwrap();
        assert!(store.history(&handle).await.is_empty());
    }

    #[tokio::test]
    async fn append_then_history_reflects_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let handle = store.open("alice").await.unwrap();
        store.append(&handle, Turn::new(Message::user("hi"))).await.unwrap();
        store.append(&handle, Turn::new(Message::assistant("hello"))).await.unwrap();
        let history = store.history(&handle).await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn flush_threshold_triggers_automatic_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SessionsConfig::default();
        config.flush_threshold = 2;
        let persistence = Arc::new(JsonFilePersistence::new(dir.path()));
        let store = SessionStore::new(persistence.clone(), config).await.unwrap();

        let handle = store.open("alice").await.unwrap();
        store.append(&handle, Turn::new(Message::user("one"))).await.unwrap();
        store.append(&handle, Turn::new(Message::user("two"))).await.unwrap();

        let persisted = persistence.get("alice").await.unwrap().unwrap();
        assert_eq!(persisted.turns.len(), 2);
    }

    #[tokio::test]
    async fn close_flushes_if_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(JsonFilePersistence::new(dir.path()));
        let store = SessionStore::new(persistence.clone(), SessionsConfig::default()).await.unwrap();

        let handle = store.open("alice").await.unwrap();
        store.append(&handle, Turn::new(Message::user("hi"))).await.unwrap();
        store.close(handle).await.unwrap();

        assert!(persistence.get("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reopen_after_flush_restores_history() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(JsonFilePersistence::new(dir.path()));
        let config = SessionsConfig::default();

        {
            let store = SessionStore::new(persistence.clone(), config.clone()).await.unwrap();
            let handle = store.open("alice").await.unwrap();
            store.append(&handle, Turn::new(Message::user("hi"))).await.unwrap();
            store.flush(&handle).await.unwrap();
        }

        let store = SessionStore::new(persistence, config).await.unwrap();
        let handle = store.open("alice").await.unwrap();
        assert_eq!(store.history(&handle).await.len(), 1);
    }

    #[tokio::test]
    async fn flush_all_persists_every_dirty_session() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(JsonFilePersistence::new(dir.path()));
        let store = SessionStore::new(persistence.clone(), SessionsConfig::default()).await.unwrap();

        for user in ["alice", "bob"] {
            let handle = store.open(user).await.unwrap();
            store.append(&handle, Turn::new(Message::user("hi"))).await.unwrap();
        }

        store.flush_all().await.unwrap();

        assert!(persistence.get("alice").await.unwrap().is_some());
        assert!(persistence.get("bob").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_evicts_and_flushes_idle_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SessionsConfig::default();
        config.evict_idle_ms = 0;
        config.flush_idle_ms = 0;
        let persistence = Arc::new(JsonFilePersistence::new(dir.path()));
        let store = SessionStore::new(persistence.clone(), config).await.unwrap();

        let handle = store.open("alice").await.unwrap();
        store.append(&handle, Turn::new(Message::user("hi"))).await.unwrap();
        assert_eq!(store.resident_count(), 1);

        store.sweep().await.unwrap();

        assert_eq!(store.resident_count(), 0);
        assert!(persistence.get("alice").await.unwrap().is_some());
    }
}
