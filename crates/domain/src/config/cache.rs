use serde::{Deserialize, Serialize};

/// Two-tier LLM response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Max number of entries held in the in-process L1 LRU.
    #[serde(default = "d_l1_capacity")]
    pub l1_capacity: usize,
    /// Entry time-to-live, in seconds, for both tiers.
    #[serde(default = "d_ttl_secs")]
    pub ttl_secs: u64,
    /// Responses sampled above this temperature are never cached.
    #[serde(default = "d_temperature_max")]
    pub temperature_max: f32,
    /// Optional L2 remote cache base URL (HTTP JSON proxy). `None` uses
    /// the no-op `NullRemoteCache`.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "d_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: d_true(),
            l1_capacity: d_l1_capacity(),
            ttl_secs: d_ttl_secs(),
            temperature_max: d_temperature_max(),
            remote_url: None,
            remote_timeout_ms: d_remote_timeout_ms(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_l1_capacity() -> usize {
    1_000
}
fn d_ttl_secs() -> u64 {
    300
}
fn d_temperature_max() -> f32 {
    0.3
}
fn d_remote_timeout_ms() -> u64 {
    200
}
