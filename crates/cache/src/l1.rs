use crate::fingerprint::Fingerprint;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry {
    value: serde_json::Value,
    inserted_at: Instant,
}

/// Bounded in-process cache, guarded by a synchronous lock since every
/// critical section here is a map lookup or insert — never held across
/// an `.await`.
pub struct L1Cache {
    inner: RwLock<LruCache<[u8; 32], Entry>>,
    ttl: Duration,
}

impl L1Cache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<serde_json::Value> {
        let mut guard = self.inner.write();
        let entry = guard.get(&fp.0)?;
        if entry.inserted_at.elapsed() > self.ttl {
            guard.pop(&fp.0);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn put(&self, fp: Fingerprint, value: serde_json::Value) {
        self.inner.write().put(
            fp.0,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop entries whose hex fingerprint starts with `prefix`. Returns
    /// how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut guard = self.inner.write();
        let doomed: Vec<[u8; 32]> = guard
            .iter()
            .filter(|(key, _)| Fingerprint(**key).to_string().starts_with(prefix))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            guard.pop(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint([byte; 32])
    }

    #[test]
    fn put_then_get_hits() {
        let cache = L1Cache::new(10, Duration::from_secs(60));
        cache.put(fp(1), serde_json::json!("hello"));
        assert_eq!(cache.get(&fp(1)), Some(serde_json::json!("hello")));
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = L1Cache::new(10, Duration::from_secs(60));
        assert_eq!(cache.get(&fp(9)), None);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = L1Cache::new(10, Duration::from_millis(1));
        cache.put(fp(1), serde_json::json!("hello"));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get(&fp(1)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = L1Cache::new(1, Duration::from_secs(60));
        cache.put(fp(1), serde_json::json!("a"));
        cache.put(fp(2), serde_json::json!("b"));
        assert_eq!(cache.get(&fp(1)), None);
        assert_eq!(cache.get(&fp(2)), Some(serde_json::json!("b")));
    }
}
