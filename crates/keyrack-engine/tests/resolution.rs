//! End-to-end resolution behavior over an in-memory daemon.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use keyrack_core::{
    GrantAttempt, HostManifest, KeySlug, MechanismKind, Lifetime, Protection, VaultKind,
};
use keyrack_engine::GrantResolver;
use keyrack_mechanisms::MechanismRegistry;
use keyrack_vaults::{DaemonClient, DaemonKey};

/// In-memory daemon stand-in.
#[derive(Default)]
struct FakeDaemon {
    reachable: AtomicBool,
    keys: Mutex<Vec<DaemonKey>>,
}

impl FakeDaemon {
    fn up() -> Arc<Self> {
        let daemon = Self::default();
        daemon.reachable.store(true, Ordering::SeqCst);
        Arc::new(daemon)
    }

    fn down() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn hold(&self, slug: &KeySlug, secret: &str, mechanism: MechanismKind) {
        self.keys.lock().unwrap().push(DaemonKey {
            slug: slug.clone(),
            secret: secret.into(),
            mechanism,
            expires_at: Some(Utc::now() + Duration::hours(1)),
        });
    }
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn access_get(&self, slugs: &[KeySlug]) -> Option<Vec<DaemonKey>> {
        if !self.is_reachable().await {
            return None;
        }
        let keys = self.keys.lock().unwrap();
        Some(keys.iter().filter(|k| slugs.contains(&k.slug)).cloned().collect())
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

fn slug(s: &str) -> KeySlug {
    KeySlug::parse(s).unwrap()
}

fn resolver(daemon: Arc<FakeDaemon>) -> GrantResolver {
    GrantResolver::new(daemon, MechanismRegistry::new())
}

fn set_env(name: &str, value: &str) {
    // SAFETY: tests use unique variable names and no other thread reads them.
    unsafe { std::env::set_var(name, value) }
}

#[tokio::test]
async fn environment_wins_over_daemon_cache() {
    let s = slug("acme.prod.RES_PRECEDENCE");
    set_env("RES_PRECEDENCE", "from-env");

    let daemon = FakeDaemon::up();
    daemon.hold(&s, "from-daemon", MechanismKind::PermanentViaReplica);

    let attempt = resolver(daemon).resolve(&s).await.unwrap();
    let GrantAttempt::Granted { grant } = attempt else {
        panic!("expected a grant, got {attempt:?}");
    };
    assert_eq!(grant.key.secret, "from-env");
    assert_eq!(grant.source.vault, VaultKind::OsEnvvar);
    assert_eq!(grant.key.grade.protection, Protection::Plaintext);
    assert_eq!(grant.key.grade.duration, Lifetime::Permanent);
}

#[tokio::test]
async fn daemon_cache_serves_when_env_is_empty() {
    let s = slug("acme.prod.RES_DAEMON_ONLY");
    let daemon = FakeDaemon::up();
    daemon.hold(&s, "ghs_cached_installation_token", MechanismKind::EphemeralViaGithubApp);

    let attempt = resolver(daemon).resolve(&s).await.unwrap();
    let GrantAttempt::Granted { grant } = attempt else {
        panic!("expected a grant, got {attempt:?}");
    };
    assert_eq!(grant.key.secret, "ghs_cached_installation_token");
    assert_eq!(grant.source.vault, VaultKind::OsDaemon);
    assert_eq!(grant.source.mechanism, MechanismKind::EphemeralViaGithubApp);
    assert_eq!(grant.key.grade.protection, Protection::Encrypted);
    assert_eq!(grant.key.grade.duration, Lifetime::Ephemeral);
}

#[tokio::test]
async fn personal_github_token_in_env_is_blocked() {
    let s = slug("acme.prod.RES_FIREWALL_GHP");
    let pat = format!("ghp_{}", "A".repeat(36));
    set_env("RES_FIREWALL_GHP", &pat);

    let attempt = resolver(FakeDaemon::down()).resolve(&s).await.unwrap();
    let GrantAttempt::Blocked { reasons, fix, .. } = attempt else {
        panic!("expected blocked, got {attempt:?}");
    };
    assert!(!reasons.is_empty());
    assert!(fix.contains("keyrack set"));
}

#[tokio::test]
async fn firewall_applies_to_cached_values_too() {
    let s = slug("acme.prod.RES_FIREWALL_CACHED");
    let daemon = FakeDaemon::up();
    let aws_key = format!("AKIA{}", "Q".repeat(16));
    daemon.hold(&s, &aws_key, MechanismKind::PermanentViaReplica);

    let attempt = resolver(daemon).resolve(&s).await.unwrap();
    assert!(matches!(attempt, GrantAttempt::Blocked { .. }), "got {attempt:?}");
}

#[tokio::test]
async fn miss_without_manifest_is_locked_with_unlock_fix() {
    let s = slug("acme.prod.RES_MISS");
    let attempt = resolver(FakeDaemon::down()).resolve(&s).await.unwrap();
    let GrantAttempt::Locked { fix, .. } = attempt else {
        panic!("expected locked, got {attempt:?}");
    };
    assert!(fix.contains("unlock"));
}

#[tokio::test]
async fn unreachable_daemon_degrades_to_locked_not_error() {
    let s = slug("acme.prod.RES_DAEMON_DOWN");
    let daemon = FakeDaemon::down();
    daemon.hold(&s, "would-be-served", MechanismKind::PermanentViaReplica);

    let attempt = resolver(daemon).resolve(&s).await.unwrap();
    assert!(matches!(attempt, GrantAttempt::Locked { .. }), "got {attempt:?}");
}

#[tokio::test]
async fn manifest_distinguishes_absent_from_locked() {
    let configured = slug("acme.prod.RES_CONFIGURED");
    let unconfigured = slug("acme.prod.RES_NOT_CONFIGURED");

    let mut manifest = HostManifest::default();
    manifest.findsert(
        &configured,
        VaultKind::OsSecure,
        MechanismKind::PermanentViaReplica,
        None,
    );

    let resolver = resolver(FakeDaemon::down()).with_manifest(manifest);
    assert!(matches!(
        resolver.resolve(&configured).await.unwrap(),
        GrantAttempt::Locked { .. }
    ));
    assert!(matches!(
        resolver.resolve(&unconfigured).await.unwrap(),
        GrantAttempt::Absent { .. }
    ));
}

#[tokio::test]
async fn resolve_all_keeps_slugs_independent() {
    let good = slug("acme.prod.RES_BATCH_GOOD");
    let bad = slug("acme.prod.RES_BATCH_BAD");
    let missing = slug("acme.prod.RES_BATCH_MISSING");
    set_env("RES_BATCH_GOOD", "fine");
    set_env("RES_BATCH_BAD", &format!("gho_{}", "B".repeat(36)));

    let attempts = resolver(FakeDaemon::down())
        .resolve_all(&[good, bad, missing], None)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(matches!(attempts[0], GrantAttempt::Granted { .. }));
    assert!(matches!(attempts[1], GrantAttempt::Blocked { .. }));
    assert!(matches!(attempts[2], GrantAttempt::Locked { .. }));
}

#[tokio::test]
async fn resolve_all_filters_by_environment() {
    let prod = slug("acme.prod.RES_ENV_FILTER");
    let stage = slug("acme.stage.RES_ENV_FILTER");

    let attempts = resolver(FakeDaemon::down())
        .resolve_all(&[prod.clone(), stage], Some("prod"))
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].slug(), &prod);
}
