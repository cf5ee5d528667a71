//! os.direct -- plaintext JSON document with per-entry expiry.
//!
//! The least-protected local vault: one JSON file, one entry per slug, no
//! passphrase.  Useful for low-value keys and for automation that already
//! runs in a trusted environment.  Entries may carry an `expires_at`
//! timestamp; `get` treats an expired entry as absent and deletes it from
//! the document as a side effect (lazy eviction), so expired secrets do not
//! linger on disk.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use keyrack_core::error::{Error, Result};
use keyrack_core::kinds::VaultKind;
use keyrack_core::slug::KeySlug;

use crate::traits::Vault;

/// One stored entry.  `env` and `org` are denormalized from the slug so the
/// document is greppable on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirectEntry {
    secret: String,
    env: String,
    org: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Plaintext JSON-file vault.
pub struct DirectVault {
    path: PathBuf,
}

impl DirectVault {
    /// Create a vault persisting to `path` (conventionally `direct.json`
    /// in the keyrack data directory).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<BTreeMap<String, DirectEntry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| Error::ManifestCorrupt {
                reason: format!("{}: {e}", self.path.display()),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, DirectEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, text).await?;
        Ok(())
    }
}

#[async_trait]
impl Vault for DirectVault {
    fn kind(&self) -> VaultKind {
        VaultKind::OsDirect
    }

    async fn is_unlocked(&self) -> bool {
        true
    }

    async fn unlock(&self, _passphrase: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn get(&self, slug: &KeySlug, _exid: Option<&str>) -> Result<Option<String>> {
        let mut entries = self.load().await?;
        let key = slug.to_string();

        let Some(entry) = entries.get(&key) else {
            return Ok(None);
        };

        if let Some(expires_at) = entry.expires_at
            && expires_at <= Utc::now()
        {
            // Lazy eviction: expired entries are removed the moment they are
            // observed, not on a schedule.
            debug!(slug = %slug, %expires_at, "evicting expired direct entry");
            entries.remove(&key);
            self.save(&entries).await?;
            return Ok(None);
        }

        Ok(Some(entry.secret.clone()))
    }

    async fn set(
        &self,
        slug: &KeySlug,
        secret: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        let mut entries = self.load().await?;
        entries.insert(
            slug.to_string(),
            DirectEntry {
                secret: secret.to_string(),
                env: slug.env().to_string(),
                org: slug.org().to_string(),
                expires_at,
            },
        );
        self.save(&entries).await?;
        debug!(slug = %slug, "stored direct entry");
        Ok(None)
    }

    async fn del(&self, slug: &KeySlug) -> Result<()> {
        let mut entries = self.load().await?;
        if entries.remove(&slug.to_string()).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slug(s: &str) -> KeySlug {
        KeySlug::parse(s).unwrap()
    }

    #[tokio::test]
    async fn set_get_del_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = DirectVault::new(dir.path().join("direct.json"));
        let s = slug("acme.prod.API_KEY");

        assert!(vault.get(&s, None).await.unwrap().is_none());
        vault.set(&s, "v1", None).await.unwrap();
        assert_eq!(vault.get(&s, None).await.unwrap().as_deref(), Some("v1"));

        vault.del(&s).await.unwrap();
        assert!(vault.get(&s, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direct.json");
        let vault = DirectVault::new(&path);
        let s = slug("acme.prod.TEMP_KEY");

        let past = Utc::now() - Duration::minutes(1);
        vault.set(&s, "stale", Some(past)).await.unwrap();

        assert!(vault.get(&s, None).await.unwrap().is_none());

        // The entry is gone from the document itself, not just filtered.
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!text.contains("TEMP_KEY"));
        assert!(!text.contains("stale"));
    }

    #[tokio::test]
    async fn unexpired_entry_survives() {
        let dir = tempfile::tempdir().unwrap();
        let vault = DirectVault::new(dir.path().join("direct.json"));
        let s = slug("acme.prod.FRESH");

        let future = Utc::now() + Duration::hours(1);
        vault.set(&s, "fresh", Some(future)).await.unwrap();
        assert_eq!(vault.get(&s, None).await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn deleting_missing_entry_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let vault = DirectVault::new(dir.path().join("direct.json"));
        vault.del(&slug("acme.prod.NOPE")).await.unwrap();
    }

    #[tokio::test]
    async fn document_carries_env_and_org() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direct.json");
        let vault = DirectVault::new(&path);
        vault.set(&slug("acme.stage.K"), "v", None).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"env\": \"stage\""));
        assert!(text.contains("\"org\": \"acme\""));
    }
}
