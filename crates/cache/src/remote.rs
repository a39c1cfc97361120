use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::time::Duration;

/// L2 cache backend — an external system, specified only at this trait
/// boundary. A failure here is logged and treated as a miss; it never
/// propagates to the caller.
#[async_trait]
pub trait RemoteCacheBackend: Send + Sync {
    async fn get(&self, fp: &Fingerprint) -> Option<serde_json::Value>;
    async fn set(&self, fp: &Fingerprint, value: &serde_json::Value, ttl: Duration);
    /// Best-effort bulk eviction by hex-fingerprint prefix.
    async fn invalidate(&self, _prefix: &str) {}
}

/// Default L2 backend: always misses, never stores. Used when no
/// `remote_url` is configured.
pub struct NullRemoteCache;

#[async_trait]
impl RemoteCacheBackend for NullRemoteCache {
    async fn get(&self, _fp: &Fingerprint) -> Option<serde_json::Value> {
        None
    }

    async fn set(&self, _fp: &Fingerprint, _value: &serde_json::Value, _ttl: Duration) {}
}

/// Reference L2 backend: a thin JSON client against an HTTP cache proxy
/// (e.g. a Redis-compatible REST gateway). Every call is wrapped in a
/// short timeout so a slow or unreachable proxy degrades to a cache
/// miss rather than stalling the request path.
pub struct HttpRemoteCache {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRemoteCache {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RemoteCacheBackend for HttpRemoteCache {
    async fn get(&self, fp: &Fingerprint) -> Option<serde_json::Value> {
        let url = format!("{}/cache/{fp}", self.base_url);
        let result = tokio::time::timeout(self.timeout, self.client.get(&url).send()).await;
        match result {
            Ok(Ok(resp)) if resp.status().is_success() => resp.json().await.ok(),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "remote cache get failed, treating as miss");
                None
            }
            Err(_) => {
                tracing::warn!("remote cache get timed out, treating as miss");
                None
            }
        }
    }

    async fn set(&self, fp: &Fingerprint, value: &serde_json::Value, ttl: Duration) {
        let url = format!("{}/cache/{fp}", self.base_url);
        let body = serde_json::json!({ "value": value, "ttl_secs": ttl.as_secs() });
        let result = tokio::time::timeout(self.timeout, self.client.put(&url).json(&body).send())
            .await;
        if let Err(_) | Ok(Err(_)) = result {
            tracing::warn!("remote cache set failed or timed out, dropping write");
        }
    }

    async fn invalidate(&self, prefix: &str) {
        let url = format!("{}/cache?prefix={prefix}", self.base_url);
        let result = tokio::time::timeout(self.timeout, self.client.delete(&url).send()).await;
        if let Err(_) | Ok(Err(_)) = result {
            tracing::warn!("remote cache invalidation failed or timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_cache_always_misses() {
        let cache = NullRemoteCache;
        let fp = Fingerprint([0; 32]);
        cache.set(&fp, &serde_json::json!("x"), Duration::from_secs(1)).await;
        assert_eq!(cache.get(&fp).await, None);
    }
}
