use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-(key, route) token-bucket admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Bucket capacity (max burst) in tokens.
    #[serde(default = "d_capacity")]
    pub capacity: f64,
    /// Refill rate, in tokens per second.
    #[serde(default = "d_refill_per_sec")]
    pub refill_per_sec: f64,
    /// Keys in this set bypass admission control entirely (e.g. admin
    /// service accounts).
    #[serde(default)]
    pub admin_bypass: Vec<String>,
    /// Trusted sources (user ids or source addresses) whose requests
    /// skip admission without counting against any bucket.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Per-key capacity/refill multipliers, keyed by tier name
    /// (e.g. `"premium" -> 4.0`). A key's tier is resolved by the
    /// caller before calling the limiter.
    #[serde(default)]
    pub tiers: HashMap<String, f64>,
    /// Idle buckets are dropped from memory after this many
    /// milliseconds with no activity.
    #[serde(default = "d_idle_evict_ms")]
    pub idle_evict_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: d_true(),
            capacity: d_capacity(),
            refill_per_sec: d_refill_per_sec(),
            admin_bypass: Vec::new(),
            whitelist: Vec::new(),
            tiers: HashMap::new(),
            idle_evict_ms: d_idle_evict_ms(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_capacity() -> f64 {
    60.0
}
fn d_refill_per_sec() -> f64 {
    1.0
}
fn d_idle_evict_ms() -> u64 {
    3_600_000
}
