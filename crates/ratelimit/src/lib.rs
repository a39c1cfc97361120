mod bucket;

pub use bucket::TokenBucket;

use parking_lot::RwLock;
use sa_domain::config::RateLimitConfig;
use sa_domain::trace::TraceEvent;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, thiserror::Error)]
#[error("rate limit exceeded for {key} on {route}, retry after {retry_after:?}")]
pub struct RateLimited {
    pub key: String,
    pub route: String,
    /// How long until the bucket will hold enough tokens again;
    /// `Duration::MAX` when the bucket never refills.
    pub retry_after: Duration,
}

/// Per-`(key, route)` admission control, generalized from
/// `QuotaTracker`'s per-key daily-rollover counters to a continuous
/// token-bucket refill. Held behind a synchronous lock: every critical
/// section is a bucket lookup/mutate, never awaited across.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<(String, String), TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// `tier` selects a capacity/refill multiplier from
    /// `config.tiers`; an unrecognized or absent tier uses 1.0. `cost`
    /// is how many tokens this admission debits (usually 1.0).
    pub fn check(
        &self,
        key: &str,
        route: &str,
        tier: Option<&str>,
        cost: f64,
    ) -> Result<(), RateLimited> {
        if !self.config.enabled
            || self.config.admin_bypass.iter().any(|k| k == key)
            || self.config.whitelist.iter().any(|k| k == key)
        {
            return Ok(());
        }

        let multiplier = tier
            .and_then(|t| self.config.tiers.get(t))
            .copied()
            .unwrap_or(1.0);

        let mut buckets = self.buckets.write();
        let bucket = buckets
            .entry((key.to_string(), route.to_string()))
            .or_insert_with(|| {
                TokenBucket::new(
                    self.config.capacity * multiplier,
                    self.config.refill_per_sec * multiplier,
                )
            });

        let allowed = bucket.try_take(cost);
        let remaining = bucket.remaining();
        let retry_after = if allowed {
            Duration::ZERO
        } else {
            bucket.retry_after(cost)
        };
        drop(buckets);

        TraceEvent::AdmissionDecision {
            key: key.to_string(),
            route: route.to_string(),
            tier: tier.map(str::to_string),
            allowed,
            tokens_remaining: remaining,
        }
        .emit();

        if allowed {
            Ok(())
        } else {
            Err(RateLimited {
                key: key.to_string(),
                route: route.to_string(),
                retry_after,
            })
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Drop buckets that have had no activity for
    /// `config.idle_evict_ms`. Intended to be called periodically from
    /// a `tokio::spawn`ed sweep task.
    pub fn sweep_idle(&self) {
        let threshold = Duration::from_millis(self.config.idle_evict_ms);
        let now = Instant::now();
        self.buckets
            .write()
            .retain(|_, bucket| bucket.idle_for(now) < threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: f64, refill: f64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            capacity,
            refill_per_sec: refill,
            admin_bypass: vec!["admin".into()],
            whitelist: vec!["10.0.0.7".into()],
            tiers: HashMap::from([("premium".to_string(), 4.0)]),
            idle_evict_ms: 10,
        })
    }

    #[test]
    fn allows_up_to_capacity_then_denies() {
        let rl = limiter(2.0, 0.0);
        assert!(rl.check("u1", "chat", None, 1.0).is_ok());
        assert!(rl.check("u1", "chat", None, 1.0).is_ok());
        assert!(rl.check("u1", "chat", None, 1.0).is_err());
    }

    #[test]
    fn different_routes_have_independent_buckets() {
        let rl = limiter(1.0, 0.0);
        assert!(rl.check("u1", "chat", None, 1.0).is_ok());
        assert!(rl.check("u1", "tools", None, 1.0).is_ok());
    }

    #[test]
    fn admin_bypass_is_unbounded() {
        let rl = limiter(1.0, 0.0);
        assert!(rl.check("admin", "chat", None, 1.0).is_ok());
        assert!(rl.check("admin", "chat", None, 1.0).is_ok());
        assert!(rl.check("admin", "chat", None, 1.0).is_ok());
    }

    #[test]
    fn whitelisted_source_skips_admission() {
        let rl = limiter(1.0, 0.0);
        assert!(rl.check("10.0.0.7", "chat", None, 1.0).is_ok());
        assert!(rl.check("10.0.0.7", "chat", None, 1.0).is_ok());
        assert_eq!(rl.bucket_count(), 0);
    }

    #[test]
    fn premium_tier_gets_larger_bucket() {
        let rl = limiter(1.0, 0.0);
        assert!(rl.check("u1", "chat", Some("premium"), 1.0).is_ok());
        assert!(rl.check("u1", "chat", Some("premium"), 1.0).is_ok());
        assert!(rl.check("u1", "chat", Some("premium"), 1.0).is_ok());
        assert!(rl.check("u1", "chat", Some("premium"), 1.0).is_ok());
        assert!(rl.check("u1", "chat", Some("premium"), 1.0).is_err());
    }

    #[test]
    fn blocked_admission_carries_a_retry_after() {
        let rl = limiter(1.0, 2.0);
        assert!(rl.check("u1", "chat", None, 1.0).is_ok());
        let err = rl.check("u1", "chat", None, 1.0).unwrap_err();
        assert!(err.retry_after > Duration::ZERO);
        assert!(err.retry_after <= Duration::from_millis(500));
    }

    #[test]
    fn cost_above_one_drains_the_bucket_faster() {
        let rl = limiter(3.0, 0.0);
        assert!(rl.check("u1", "chat", None, 2.0).is_ok());
        assert!(rl.check("u1", "chat", None, 2.0).is_err());
        assert!(rl.check("u1", "chat", None, 1.0).is_ok());
    }

    #[test]
    fn sweep_idle_drops_stale_buckets() {
        let rl = limiter(1.0, 0.0);
        rl.check("u1", "chat", None, 1.0).unwrap();
        assert_eq!(rl.bucket_count(), 1);
        std::thread::sleep(Duration::from_millis(20));
        rl.sweep_idle();
        assert_eq!(rl.bucket_count(), 0);
    }
}
