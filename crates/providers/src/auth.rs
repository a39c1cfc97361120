//! API-key pool with round-robin hand-out and failure cooldown.
//!
//! Providers configured with several keys (`auth.keys`) spread load
//! across them; a key that just caused an auth or quota failure sits
//! out a cooldown window before it is handed out again. With a single
//! key the pool degenerates to "always that key".

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use sa_domain::config::AuthConfig;
use sa_domain::error::{Error, Result};

const COOLDOWN: Duration = Duration::from_secs(60);

struct Slot {
    key: String,
    cooling_until: Option<Instant>,
}

impl Slot {
    fn usable(&self, now: Instant) -> bool {
        self.cooling_until.map_or(true, |until| now >= until)
    }
}

/// The key handed out for one request. Keep the `index` so the failure
/// path can report which key misbehaved.
#[derive(Clone)]
pub struct LeasedKey {
    pub index: usize,
    pub key: String,
}

pub struct KeyPool {
    slots: Mutex<Vec<Slot>>,
    cursor: Mutex<usize>,
    cooldown: Duration,
}

impl KeyPool {
    fn with_keys(keys: Vec<String>, cooldown: Duration) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::Auth("a provider needs at least one API key".into()));
        }
        Ok(Self {
            slots: Mutex::new(
                keys.into_iter()
                    .map(|key| Slot {
                        key,
                        cooling_until: None,
                    })
                    .collect(),
            ),
            cursor: Mutex::new(0),
            cooldown,
        })
    }

    /// Resolve every configured key. `auth.keys` entries are env var
    /// names, resolved eagerly; an empty list falls back to the single
    /// `key`/`env`/keychain resolution in [`crate::util::resolve_api_key`].
    pub fn from_auth_config(auth: &AuthConfig) -> Result<Self> {
        let keys = if auth.keys.is_empty() {
            vec![crate::util::resolve_api_key(auth)?]
        } else {
            auth.keys
                .iter()
                .map(|env_name| match std::env::var(env_name) {
                    Ok(v) if !v.is_empty() => Ok(v),
                    _ => Err(Error::Auth(format!(
                        "environment variable '{env_name}' (from auth.keys) is not set"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?
        };
        Self::with_keys(keys, COOLDOWN)
    }

    /// Hand out the next usable key, round-robin. When every key is
    /// cooling down, the one closest to recovery is returned anyway —
    /// a throttled key beats no key.
    pub fn lease(&self) -> LeasedKey {
        let slots = self.slots.lock();
        let now = Instant::now();

        let start = {
            let mut cursor = self.cursor.lock();
            let s = *cursor;
            *cursor = (*cursor + 1) % slots.len();
            s
        };

        for offset in 0..slots.len() {
            let index = (start + offset) % slots.len();
            if slots[index].usable(now) {
                return LeasedKey {
                    index,
                    key: slots[index].key.clone(),
                };
            }
        }

        let (index, slot) = slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.cooling_until)
            .expect("pool is never empty");
        LeasedKey {
            index,
            key: slot.key.clone(),
        }
    }

    /// Put a key into cooldown after it caused a failure.
    pub fn mark_failed(&self, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(index) {
            slot.cooling_until = Some(Instant::now() + self.cooldown);
            tracing::warn!(key_index = index, cooldown_secs = self.cooldown.as_secs(), "API key entering cooldown");
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

// Key values must never land in logs via Debug.
impl std::fmt::Debug for KeyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPool")
            .field("keys", &self.len())
            .field("cooldown", &self.cooldown)
            .finish()
    }
}
