//! Per-session cancellation tokens.
//!
//! Each running [`crate::loop_::AgentLoop::run`] call registers a token
//! keyed by the session's user-id so a caller (the platform pump,
//! an admin endpoint) can request it stop cleanly from another task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation flag checked by the loop between LLM calls and tool
/// dispatches.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the token for each currently-running session, so a caller
/// holding only a user-id can cancel a run it doesn't otherwise have a
/// handle to.
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new token for a session, replacing any
    /// previous (presumably finished) one for the same key.
    pub fn register(&self, session_key: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(session_key.to_owned(), token.clone());
        token
    }

    /// Request cancellation of a running session. Returns `true` if a
    /// token was found for it.
    pub fn cancel(&self, session_key: &str) -> bool {
        if let Some(token) = self.tokens.lock().get(session_key) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Remove a session's token, called when its run finishes.
    pub fn remove(&self, session_key: &str) {
        self.tokens.lock().remove(session_key);
    }

    pub fn is_running(&self, session_key: &str) -> bool {
        self.tokens.lock().contains_key(session_key)
    }
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a session's token from the map on drop, so every early
/// return path in `run` cleans up without repeating the call.
pub(crate) struct CancelGuard<'a> {
    map: &'a CancelMap,
    key: String,
}

impl<'a> CancelGuard<'a> {
    pub(crate) fn new(map: &'a CancelMap, key: &str) -> Self {
        Self {
            map,
            key: key.to_string(),
        }
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
