use serde::{Deserialize, Serialize};

/// Platform pump bind address and edge-level protections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_3210")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Per-IP edge rate limit (defense in depth in front of the
    /// per-user/route limiter in `sa-ratelimit`). `None` disables it.
    #[serde(default)]
    pub rate_limit: Option<EdgeRateLimitConfig>,
    /// Max concurrent in-flight HTTP requests before 503.
    #[serde(default = "d_concurrency")]
    pub max_concurrent_requests: usize,
    /// Max concurrent agent runs per transport; excess events get a
    /// "busy" reply instead of queueing unboundedly.
    #[serde(default = "d_pump_inflight")]
    pub pump_max_inflight: usize,
    /// Max concurrent agent runs per user within one transport.
    #[serde(default = "d_pump_inflight_per_user")]
    pub pump_max_inflight_per_user: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_3210(),
            host: d_host(),
            cors: CorsConfig::default(),
            rate_limit: None,
            max_concurrent_requests: d_concurrency(),
            pump_max_inflight: d_pump_inflight(),
            pump_max_inflight_per_user: d_pump_inflight_per_user(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

/// Per-IP request/second ceiling enforced at the HTTP edge, distinct
/// from `crate::config::ratelimit::RateLimitConfig`'s per-user token
/// bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeRateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

fn d_3210() -> u16 {
    3210
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_concurrency() -> usize {
    64
}
fn d_pump_inflight() -> usize {
    16
}
fn d_pump_inflight_per_user() -> usize {
    1
}
