//! os.daemon -- delegation to the long-lived session daemon.
//!
//! The daemon is an out-of-process cache that survives across CLI
//! invocations within one login session, so a human is not re-prompted for
//! a passphrase on every command.  Its transport is a collaborator, modeled
//! here as the [`DaemonClient`] trait; the production implementation speaks
//! newline-delimited JSON over a unix domain socket with a bounded timeout.
//!
//! Transport failures are *never* errors on the read path: an unreachable
//! daemon is indistinguishable from "not found", and the resolution engine
//! relies on that.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use keyrack_core::error::{Error, Result};
use keyrack_core::kinds::{MechanismKind, VaultKind};
use keyrack_core::slug::KeySlug;

use crate::traits::Vault;

/// Default time-to-live for cached entries when the caller supplies none:
/// nine hours, roughly one working day's login session.
pub const DEFAULT_TTL_HOURS: i64 = 9;

/// One cached key as the daemon stores it.  Carries the mechanism recorded
/// at cache-write time so grants resolved from the cache report correct
/// provenance and re-apply the right firewall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonKey {
    pub slug: KeySlug,
    pub secret: String,
    pub mechanism: MechanismKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The daemon's access surface.
///
/// All methods are infallible by design: any transport or protocol failure
/// degrades to "nothing there" (`None` / `false`) and is logged, never
/// propagated.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Whether a daemon is listening at all.
    async fn is_reachable(&self) -> bool;

    /// Fetch cached keys for the given slugs.  `None` when the daemon is
    /// unreachable or holds none of them.
    async fn access_get(&self, slugs: &[KeySlug]) -> Option<Vec<DaemonKey>>;

    /// Push keys into the cache.  Returns whether the daemon accepted them.
    async fn access_unlock(&self, keys: &[DaemonKey]) -> bool;

    /// Evict the given slugs from the cache.
    async fn access_relock(&self, slugs: &[KeySlug]) -> bool;
}

// ---------------------------------------------------------------------------
// Unix-socket client
// ---------------------------------------------------------------------------

/// Wire request, one JSON object per line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireRequest {
    Get { slugs: Vec<KeySlug> },
    Unlock { keys: Vec<DaemonKey> },
    Relock { slugs: Vec<KeySlug> },
    Ping,
}

/// Wire response, one JSON object per line.
#[derive(Debug, Serialize, Deserialize)]
struct WireResponse {
    ok: bool,
    #[serde(default)]
    keys: Option<Vec<DaemonKey>>,
}

/// Production [`DaemonClient`] over a unix domain socket.
#[cfg(unix)]
pub struct SocketDaemonClient {
    socket: PathBuf,
    timeout: Duration,
}

#[cfg(unix)]
impl SocketDaemonClient {
    /// Client for the daemon socket at `socket`, with a 2-second round-trip
    /// budget per request.
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: Duration::from_secs(2),
        }
    }

    async fn round_trip(&self, request: &WireRequest) -> Option<WireResponse> {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let io = async {
            let stream = tokio::net::UnixStream::connect(&self.socket).await?;
            let (read_half, mut write_half) = stream.into_split();

            let mut line = serde_json::to_string(request).expect("wire request serializes");
            line.push('\n');
            write_half.write_all(line.as_bytes()).await?;
            write_half.shutdown().await?;

            let mut reply = String::new();
            BufReader::new(read_half).read_line(&mut reply).await?;
            std::io::Result::Ok(reply)
        };

        let reply = match tokio::time::timeout(self.timeout, io).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                debug!(socket = %self.socket.display(), error = %e, "daemon unreachable");
                return None;
            }
            Err(_) => {
                warn!(socket = %self.socket.display(), "daemon request timed out");
                return None;
            }
        };

        match serde_json::from_str::<WireResponse>(reply.trim_end()) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(error = %e, "daemon sent unparseable response");
                None
            }
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl DaemonClient for SocketDaemonClient {
    async fn is_reachable(&self) -> bool {
        matches!(self.round_trip(&WireRequest::Ping).await, Some(r) if r.ok)
    }

    async fn access_get(&self, slugs: &[KeySlug]) -> Option<Vec<DaemonKey>> {
        let response = self
            .round_trip(&WireRequest::Get {
                slugs: slugs.to_vec(),
            })
            .await?;
        response.ok.then_some(response.keys.unwrap_or_default())
    }

    async fn access_unlock(&self, keys: &[DaemonKey]) -> bool {
        matches!(
            self.round_trip(&WireRequest::Unlock { keys: keys.to_vec() }).await,
            Some(r) if r.ok
        )
    }

    async fn access_relock(&self, slugs: &[KeySlug]) -> bool {
        matches!(
            self.round_trip(&WireRequest::Relock {
                slugs: slugs.to_vec()
            })
            .await,
            Some(r) if r.ok
        )
    }
}

/// A client for "no daemon": never reachable, holds nothing.  Used when the
/// session daemon is disabled or unsupported on this platform; resolution
/// then simply falls through to the locked outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDaemonClient;

#[async_trait]
impl DaemonClient for NullDaemonClient {
    async fn is_reachable(&self) -> bool {
        false
    }

    async fn access_get(&self, _slugs: &[KeySlug]) -> Option<Vec<DaemonKey>> {
        None
    }

    async fn access_unlock(&self, _keys: &[DaemonKey]) -> bool {
        false
    }

    async fn access_relock(&self, _slugs: &[KeySlug]) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Vault adapter
// ---------------------------------------------------------------------------

/// [`Vault`] implementation over a [`DaemonClient`].
pub struct DaemonVault {
    client: std::sync::Arc<dyn DaemonClient>,
}

impl DaemonVault {
    pub fn new(client: std::sync::Arc<dyn DaemonClient>) -> Self {
        Self { client }
    }

    /// Cache a fully described key (with its mechanism recorded).  This is
    /// the write path the unlock flow uses; [`Vault::set`] exists for the
    /// generic surface and records the replica mechanism.
    pub async fn cache(&self, key: DaemonKey) -> Result<()> {
        let mut key = key;
        if key.expires_at.is_none() {
            key.expires_at = Some(Utc::now() + ChronoDuration::hours(DEFAULT_TTL_HOURS));
        }
        if self.client.access_unlock(std::slice::from_ref(&key)).await {
            Ok(())
        } else {
            Err(Error::ExternalTool {
                tool: "keyrack-daemon".into(),
                reason: "daemon refused or unreachable on write".into(),
            })
        }
    }
}

#[async_trait]
impl Vault for DaemonVault {
    fn kind(&self) -> VaultKind {
        VaultKind::OsDaemon
    }

    async fn is_unlocked(&self) -> bool {
        self.client.is_reachable().await
    }

    async fn unlock(&self, _passphrase: Option<&str>) -> Result<()> {
        if self.client.is_reachable().await {
            Ok(())
        } else {
            Err(Error::ExternalTool {
                tool: "keyrack-daemon".into(),
                reason: "daemon is not running".into(),
            })
        }
    }

    async fn get(&self, slug: &KeySlug, _exid: Option<&str>) -> Result<Option<String>> {
        let keys = self
            .client
            .access_get(std::slice::from_ref(slug))
            .await
            .unwrap_or_default();
        Ok(keys.into_iter().find(|k| &k.slug == slug).map(|k| k.secret))
    }

    async fn set(
        &self,
        slug: &KeySlug,
        secret: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        self.cache(DaemonKey {
            slug: slug.clone(),
            secret: secret.to_string(),
            mechanism: MechanismKind::PermanentViaReplica,
            expires_at,
        })
        .await?;
        Ok(None)
    }

    async fn del(&self, slug: &KeySlug) -> Result<()> {
        // Eviction failure is tolerated: an unreachable daemon holds nothing.
        let _ = self.client.access_relock(std::slice::from_ref(slug)).await;
        Ok(())
    }

    async fn relock(&self, slug: &KeySlug, _exid: Option<&str>) -> Result<()> {
        self.del(slug).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory daemon used by tests across the workspace.

    use std::sync::Mutex;

    use super::*;

    /// In-memory [`DaemonClient`] with a reachability switch.
    #[derive(Default)]
    pub struct MemoryDaemon {
        pub reachable: std::sync::atomic::AtomicBool,
        pub keys: Mutex<Vec<DaemonKey>>,
    }

    impl MemoryDaemon {
        pub fn reachable() -> Self {
            let daemon = Self::default();
            daemon
                .reachable
                .store(true, std::sync::atomic::Ordering::SeqCst);
            daemon
        }
    }

    #[async_trait]
    impl DaemonClient for MemoryDaemon {
        async fn is_reachable(&self) -> bool {
            self.reachable.load(std::sync::atomic::Ordering::SeqCst)
        }

        async fn access_get(&self, slugs: &[KeySlug]) -> Option<Vec<DaemonKey>> {
            if !self.is_reachable().await {
                return None;
            }
            let keys = self.keys.lock().unwrap();
            Some(
                keys.iter()
                    .filter(|k| slugs.contains(&k.slug))
                    .cloned()
                    .collect(),
            )
        }

        async fn access_unlock(&self, new_keys: &[DaemonKey]) -> bool {
            if !self.is_reachable().await {
                return false;
            }
            let mut keys = self.keys.lock().unwrap();
            for key in new_keys {
                keys.retain(|k| k.slug != key.slug);
                keys.push(key.clone());
            }
            true
        }

        async fn access_relock(&self, slugs: &[KeySlug]) -> bool {
            if !self.is_reachable().await {
                return false;
            }
            self.keys.lock().unwrap().retain(|k| !slugs.contains(&k.slug));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::MemoryDaemon;
    use super::*;

    fn slug(s: &str) -> KeySlug {
        KeySlug::parse(s).unwrap()
    }

    #[tokio::test]
    async fn unreachable_daemon_reads_as_not_found() {
        let vault = DaemonVault::new(Arc::new(MemoryDaemon::default()));
        assert!(!vault.is_unlocked().await);
        assert!(vault.get(&slug("acme.prod.K"), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_defaults_ttl_to_nine_hours() {
        let daemon = Arc::new(MemoryDaemon::reachable());
        let vault = DaemonVault::new(daemon.clone());
        let s = slug("acme.prod.K");
        vault.set(&s, "v", None).await.unwrap();

        let keys = daemon.keys.lock().unwrap();
        let expires = keys[0].expires_at.expect("ttl was defaulted");
        let delta = expires - Utc::now();
        assert!(delta > ChronoDuration::hours(8) && delta <= ChronoDuration::hours(9));
    }

    #[tokio::test]
    async fn caller_supplied_expiry_wins() {
        let daemon = Arc::new(MemoryDaemon::reachable());
        let vault = DaemonVault::new(daemon.clone());
        let s = slug("acme.prod.K");
        let custom = Utc::now() + ChronoDuration::minutes(5);
        vault.set(&s, "v", Some(custom)).await.unwrap();

        let keys = daemon.keys.lock().unwrap();
        assert_eq!(keys[0].expires_at, Some(custom));
    }

    #[tokio::test]
    async fn get_and_relock_roundtrip() {
        let vault = DaemonVault::new(Arc::new(MemoryDaemon::reachable()));
        let s = slug("acme.prod.K");
        vault.set(&s, "cached", None).await.unwrap();
        assert_eq!(vault.get(&s, None).await.unwrap().as_deref(), Some("cached"));

        vault.relock(&s, None).await.unwrap();
        assert!(vault.get(&s, None).await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn socket_client_treats_missing_socket_as_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let client = SocketDaemonClient::new(dir.path().join("daemon.sock"));
        assert!(!client.is_reachable().await);
        assert!(client.access_get(&[slug("acme.prod.K")]).await.is_none());
    }
}
