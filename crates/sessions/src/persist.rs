//! Durable storage trait for session state, plus a one-file-per-user-id
//! reference implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sa_domain::error::{Error, Result};
use sa_domain::tool::Turn;

/// Current on-disk envelope version. Bump when the field layout changes
/// in a way that isn't simply additive.
const ENVELOPE_VERSION: u32 = 1;

/// The serialized form of one session, matching what `SessionInner`
/// needs to rebuild itself on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedSession {
    pub version: u32,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

/// `put`/`get`/`list`/`delete` over opaque user-id keys. Implementations
/// must make `put` durable before returning, so a flush that completes
/// guarantees the data survives a crash immediately after.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn put(&self, user_id: &str, session: &SerializedSession) -> Result<()>;
    async fn get(&self, user_id: &str) -> Result<Option<SerializedSession>>;
    async fn list(&self) -> Result<Vec<String>>;
    async fn delete(&self, user_id: &str) -> Result<()>;
}

/// One JSON file per user-id under `root`, with a version + checksum
/// envelope so corruption is detected on load rather than silently
/// producing a truncated history.
pub struct JsonFilePersistence {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct OnDiskEnvelope {
    version: u32,
    checksum: u32,
    session: SerializedSession,
}

fn checksum(bytes: &[u8]) -> u32 {
    // Fowler-Noll-Vo, 32-bit: enough to catch truncation/bit-rot, not a
    // security boundary.
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

impl JsonFilePersistence {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        // user-id is an opaque string; percent-encode path separators so
        // it can't escape `root`.
        let safe: String = user_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(Error::Io)
    }
}

#[async_trait]
impl SessionPersistence for JsonFilePersistence {
    async fn put(&self, user_id: &str, session: &SerializedSession) -> Result<()> {
        self.ensure_root().await?;
        let body = serde_json::to_vec(session)?;
        let envelope = OnDiskEnvelope {
            version: ENVELOPE_VERSION,
            checksum: checksum(&body),
            session: session.clone(),
        };
        let serialized = serde_json::to_vec_pretty(&envelope)?;

        let path = self.path_for(user_id);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &serialized).await.map_err(Error::Io)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(Error::Io)?;
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<SerializedSession>> {
        let path = self.path_for(user_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let envelope: OnDiskEnvelope = serde_json::from_slice(&raw)?;
        let body = serde_json::to_vec(&envelope.session)?;
        if checksum(&body) != envelope.checksum {
            return Err(Error::Other(format!(
                "checksum mismatch loading session '{user_id}'; file may be corrupt"
            )));
        }
        Ok(Some(envelope.session))
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.ensure_root().await?;
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(Error::Io)?;
        let mut user_ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    user_ids.push(stem.to_string());
                }
            }
        }
        user_ids.sort();
        Ok(user_ids)
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let path = self.path_for(user_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(user_id: &str) -> SerializedSession {
        let now = Utc::now();
        SerializedSession {
            version: ENVELOPE_VERSION,
            user_id: user_id.into(),
            created_at: now,
            last_activity: now,
            turns: vec![],
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path());
        store.put("alice", &sample("alice")).await.unwrap();
        let loaded = store.get("alice").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "alice");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path());
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_all_put_user_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path());
        store.put("alice", &sample("alice")).await.unwrap();
        store.put("bob", &sample("bob")).await.unwrap();
        let ids = store.list().await.unwrap();
        assert_eq!(ids, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path());
        store.put("alice", &sample("alice")).await.unwrap();
        store.delete("alice").await.unwrap();
        assert!(store.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupted_checksum_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path());
        store.put("alice", &sample("alice")).await.unwrap();

        let path = dir.path().join("alice.json");
        let mut envelope: OnDiskEnvelope =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        envelope.checksum = envelope.checksum.wrapping_add(1);
        std::fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();

        assert!(store.get("alice").await.is_err());
    }
}
