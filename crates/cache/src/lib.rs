pub mod fingerprint;
pub mod l1;
pub mod remote;

pub use fingerprint::Fingerprint;
pub use l1::L1Cache;
pub use remote::{HttpRemoteCache, NullRemoteCache, RemoteCacheBackend};

use sa_domain::config::CacheConfig;
use sa_domain::trace::TraceEvent;
use std::sync::Arc;
use std::time::Duration;

/// Two-tier response cache: a bounded in-process L1 backed by an
/// optional remote L2. `lookup`/`store` never fail — backend errors are
/// logged and degrade to a miss, per the "cache failures are never
/// fatal" rule.
pub struct ResponseCache {
    l1: L1Cache,
    l2: Arc<dyn RemoteCacheBackend>,
    ttl: Duration,
    enabled: bool,
    temperature_max: f32,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        let l2: Arc<dyn RemoteCacheBackend> = match &config.remote_url {
            Some(url) => Arc::new(HttpRemoteCache::new(
                url.clone(),
                Duration::from_millis(config.remote_timeout_ms),
            )),
            None => Arc::new(NullRemoteCache),
        };
        Self {
            l1: L1Cache::new(config.l1_capacity, ttl),
            l2,
            ttl,
            enabled: config.enabled,
            temperature_max: config.temperature_max,
        }
    }

    /// Whether a request with this shape is cacheable at all: the cache
    /// must be enabled, tool-bearing requests are never cached (their
    /// payload depends on the current tool catalog), and sampling above
    /// the configured temperature makes responses non-deterministic.
    pub fn admits(&self, temperature: Option<f32>, has_tools: bool) -> bool {
        self.enabled && !has_tools && temperature.map_or(true, |t| t <= self.temperature_max)
    }

    pub async fn lookup(&self, fp: &Fingerprint) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        if let Some(value) = self.l1.get(fp) {
            TraceEvent::CacheLookup {
                fingerprint: fp.to_string(),
                hit: true,
                tier: "l1",
            }
            .emit();
            return Some(value);
        }
        if let Some(value) = self.l2.get(fp).await {
            TraceEvent::CacheLookup {
                fingerprint: fp.to_string(),
                hit: true,
                tier: "l2",
            }
            .emit();
            self.l1.put(*fp, value.clone());
            return Some(value);
        }
        TraceEvent::CacheLookup {
            fingerprint: fp.to_string(),
            hit: false,
            tier: "none",
        }
        .emit();
        None
    }

    pub async fn store(&self, fp: Fingerprint, value: serde_json::Value) {
        if !self.enabled {
            return;
        }
        self.l1.put(fp, value.clone());
        self.l2.set(&fp, &value, self.ttl).await;
    }

    /// Drop every entry whose hex fingerprint starts with `prefix` (an
    /// empty prefix clears everything). Applied to both tiers; the L2
    /// side is fire-and-forget like its writes.
    pub async fn invalidate(&self, prefix: &str) {
        let dropped = self.l1.invalidate_prefix(prefix);
        self.l2.invalidate(prefix).await;
        tracing::info!(prefix = %prefix, dropped, "cache invalidation");
    }
}
