//! Vault unlocking and session-cache seeding.
//!
//! Resolution only ever reads the environment and the daemon, so opening
//! the locked vaults is a separate, explicit flow: unlock each vault the
//! selected keys need (once per vault, once per SSO profile), read the raw
//! values out, run them through their mechanisms to mint usable
//! credentials, and push the results into the daemon cache. After that the
//! resolver sees them without touching the vaults again.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use keyrack_core::{HostManifest, KeyHost, KeySlug, Result, VaultKind};
use keyrack_mechanisms::MechanismRegistry;
use keyrack_vaults::{DaemonClient, DaemonKey, DaemonVault, VaultRegistry};
use tracing::{info, warn};

/// What to unlock: one key, or every key the host manifest configures.
#[derive(Debug, Clone)]
pub enum UnlockTarget {
    Key(KeySlug),
    All,
}

/// Result of one unlock run.
#[derive(Debug, Default)]
pub struct UnlockReport {
    /// Vaults that are open after the run, including ones that already were.
    pub unlocked: Vec<VaultKind>,
    /// Slugs whose minted credentials now sit in the daemon cache.
    pub cached: Vec<KeySlug>,
    /// Keys that could not be seeded, with a human-readable reason.
    pub skipped: Vec<(KeySlug, String)>,
}

/// Opens vaults and seeds the daemon cache from them.
pub struct UnlockOrchestrator {
    registry: VaultRegistry,
    mechanisms: MechanismRegistry,
    daemon: Arc<dyn DaemonClient>,
    manifest: HostManifest,
}

impl UnlockOrchestrator {
    pub fn new(
        registry: VaultRegistry,
        mechanisms: MechanismRegistry,
        daemon: Arc<dyn DaemonClient>,
        manifest: HostManifest,
    ) -> Self {
        Self {
            registry,
            mechanisms,
            daemon,
            manifest,
        }
    }

    /// Unlock the vaults behind the targeted keys, then seed the daemon.
    ///
    /// Each distinct vault is unlocked at most once per run; an already
    /// unlocked vault is never re-prompted, which makes the whole flow
    /// idempotent. A key whose value cannot be read or minted is skipped
    /// with a reason rather than failing the run, so one broken backend
    /// does not hold the rest of the repo hostage.
    pub async fn unlock(
        &self,
        target: &UnlockTarget,
        passphrase: Option<&str>,
    ) -> Result<UnlockReport> {
        let hosts = self.targeted_hosts(target)?;
        let mut report = UnlockReport::default();

        // SSO vaults are per-profile, so the dedup key carries the exid.
        let mut opened: HashSet<(VaultKind, Option<String>)> = HashSet::new();
        for host in &hosts {
            let key = (host.vault, sso_profile(host));
            if !opened.insert(key) {
                continue;
            }
            let vault = self.registry.vault_for(host)?;
            if !vault.is_unlocked().await {
                vault.unlock(passphrase).await?;
                info!(vault = host.vault.as_str(), "vault unlocked");
            }
            if !report.unlocked.contains(&host.vault) {
                report.unlocked.push(host.vault);
            }
        }

        self.seed_daemon(&hosts, &mut report).await;
        Ok(report)
    }

    fn targeted_hosts(&self, target: &UnlockTarget) -> Result<Vec<KeyHost>> {
        match target {
            UnlockTarget::Key(slug) => {
                let host = self.manifest.host(slug).ok_or_else(|| {
                    keyrack_core::Error::NotConfigured {
                        slug: slug.to_string(),
                    }
                })?;
                Ok(vec![host.clone()])
            }
            UnlockTarget::All => Ok(self.manifest.hosts.values().cloned().collect()),
        }
    }

    /// Read each key from its now-open vault, mint a credential through its
    /// mechanism, and push it into the daemon cache.
    async fn seed_daemon(&self, hosts: &[KeyHost], report: &mut UnlockReport) {
        if !self.daemon.is_reachable().await {
            warn!("daemon unreachable, minted credentials will not outlive this process");
            for host in hosts {
                if !resolver_visible(host.vault) {
                    report
                        .skipped
                        .push((host.slug.clone(), "daemon unreachable".into()));
                }
            }
            return;
        }

        let daemon_vault = DaemonVault::new(self.daemon.clone());
        for host in hosts {
            // The resolver already reads these two directly.
            if resolver_visible(host.vault) {
                continue;
            }
            match self.mint(host).await {
                Ok(Some(key)) => match daemon_vault.cache(key).await {
                    Ok(()) => report.cached.push(host.slug.clone()),
                    Err(e) => report.skipped.push((host.slug.clone(), e.to_string())),
                },
                Ok(None) => report
                    .skipped
                    .push((host.slug.clone(), "vault holds no value".into())),
                Err(e) => {
                    warn!(slug = %host.slug, error = %e, "could not mint credential");
                    report.skipped.push((host.slug.clone(), e.to_string()));
                }
            }
        }
    }

    async fn mint(&self, host: &KeyHost) -> Result<Option<DaemonKey>> {
        let vault = self.registry.vault_for(host)?;
        let Some(raw) = vault.get(&host.slug, host.exid.as_deref()).await? else {
            return Ok(None);
        };
        let mechanism = self.mechanisms.mechanism(host.mechanism);
        let translated = mechanism.translate(&raw).await?;
        Ok(Some(DaemonKey {
            slug: host.slug.clone(),
            secret: translated.secret,
            mechanism: host.mechanism,
            expires_at: cap_expiry(translated.expires_at, host.max_duration_secs),
        }))
    }
}

/// Vaults the resolver reads without any unlock step.
fn resolver_visible(kind: VaultKind) -> bool {
    matches!(kind, VaultKind::OsEnvvar | VaultKind::OsDaemon)
}

fn sso_profile(host: &KeyHost) -> Option<String> {
    (host.vault == VaultKind::AwsIamSso).then(|| host.exid.clone().unwrap_or_default())
}

/// Clamp a minted credential's expiry to the key's configured ceiling.
fn cap_expiry(
    expires_at: Option<DateTime<Utc>>,
    max_duration_secs: Option<i64>,
) -> Option<DateTime<Utc>> {
    let ceiling = max_duration_secs.map(|secs| Utc::now() + ChronoDuration::seconds(secs));
    match (expires_at, ceiling) {
        (Some(e), Some(c)) => Some(e.min(c)),
        (e, c) => e.or(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_cap_takes_the_earlier_bound() {
        let soon = Utc::now() + ChronoDuration::minutes(5);
        let capped = cap_expiry(Some(soon), Some(3600)).unwrap();
        assert_eq!(capped, soon);

        let late = Utc::now() + ChronoDuration::hours(10);
        let capped = cap_expiry(Some(late), Some(60)).unwrap();
        assert!(capped < late);
    }

    #[test]
    fn expiry_cap_passes_through_when_one_side_missing() {
        assert!(cap_expiry(None, None).is_none());
        assert!(cap_expiry(None, Some(60)).is_some());
        let e = Utc::now() + ChronoDuration::minutes(1);
        assert_eq!(cap_expiry(Some(e), None), Some(e));
    }
}
