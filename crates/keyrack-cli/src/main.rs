//! CLI entry point for keyrack.
//!
//! This binary provides the `keyrack` command with subcommands for
//! resolving grants, unlocking vaults, and configuring keys on this host.
//!
//! Exit-code contract: `locked`, `blocked`, and `absent` are ordinary
//! outcomes printed with their remediation and exit 0; only infrastructure
//! failures (unreadable manifest, broken external tool, bad arguments)
//! exit non-zero.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use keyrack_core::{
    Error, GrantAttempt, HostManifest, KeySlug, MechanismKind, RepoManifest, VaultKind,
    infer_grade,
};
use keyrack_engine::{GrantResolver, UnlockOrchestrator, UnlockTarget};
use keyrack_mechanisms::{MechanismRegistry, ValidateInput};
use keyrack_vaults::{
    DaemonClient, DaemonKey, DaemonVault, ManifestStore, RecipientIdentity, SecureSession, Vault,
    VaultRegistry, paths, session,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the recipient identity used to decrypt the
/// host manifest.
const IDENTITY_ENV: &str = "KEYRACK_IDENTITY";

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("warn");

    let cli = cli::Cli::parse();
    match cli.command {
        cli::Commands::Grant {
            slug,
            repo,
            env,
            manifest,
        } => {
            if repo {
                cmd_grant_repo(&manifest, env.as_deref()).await
            } else {
                let slug = slug.ok_or_else(|| anyhow!("a slug is required without --repo"))?;
                cmd_grant_one(&slug).await
            }
        }
        cli::Commands::Unlock { slug } => cmd_unlock(slug.as_deref()).await,
        cli::Commands::Set {
            slug,
            vault,
            mechanism,
            exid,
            value,
        } => cmd_set(&slug, &vault, &mechanism, exid, value).await,
        cli::Commands::Rm { slug } => cmd_rm(&slug).await,
        cli::Commands::List { env } => cmd_list(env.as_deref()).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: grant
// ---------------------------------------------------------------------------

async fn cmd_grant_one(slug: &str) -> Result<()> {
    let slug = KeySlug::parse(slug)?;
    let dir = paths::data_dir()?;
    let daemon = daemon_client(&dir);

    let mut resolver = GrantResolver::new(daemon, MechanismRegistry::new());
    // An identity available without prompting lets misses distinguish
    // "not configured" from "locked"; grant itself never prompts.
    if let Some(identity) = identity_from_env() {
        let store = ManifestStore::new(paths::manifest_file(&dir));
        if let Ok(Some(manifest)) = store.load(&identity).await {
            resolver = resolver.with_manifest(manifest);
        }
    }

    let attempt = resolver.resolve(&slug).await?;
    print_attempt(&attempt, false);
    Ok(())
}

async fn cmd_grant_repo(manifest_path: &str, env: Option<&str>) -> Result<()> {
    let repo = RepoManifest::load(std::path::Path::new(manifest_path))
        .with_context(|| format!("reading repo manifest {manifest_path}"))?;
    let slugs = match env {
        Some(env) => repo.slugs(env)?,
        None => repo.all_slugs()?,
    };
    if slugs.is_empty() {
        eprintln!("the repo manifest declares no keys for this selection");
        return Ok(());
    }

    let dir = paths::data_dir()?;
    let daemon = daemon_client(&dir);
    let mut resolver = GrantResolver::new(daemon, MechanismRegistry::new());
    if let Some(identity) = identity_from_env() {
        let store = ManifestStore::new(paths::manifest_file(&dir));
        if let Ok(Some(manifest)) = store.load(&identity).await {
            resolver = resolver.with_manifest(manifest);
        }
    }

    for attempt in resolver.resolve_all(&slugs, env).await? {
        print_attempt(&attempt, true);
    }
    Ok(())
}

/// Print one attempt.  Granted secrets go to stdout (`NAME=value` in batch
/// mode, the bare value otherwise); every other outcome goes to stderr with
/// its remediation, verbatim.
fn print_attempt(attempt: &GrantAttempt, batch: bool) {
    match attempt {
        GrantAttempt::Granted { grant } => {
            info!(
                slug = %grant.slug,
                vault = grant.source.vault.as_str(),
                mechanism = grant.source.mechanism.as_str(),
                grade = %grant.key.grade,
                "granted"
            );
            if batch {
                println!("{}={}", grant.slug.raw_name(), grant.key.secret);
            } else {
                println!("{}", grant.key.secret);
            }
        }
        GrantAttempt::Locked { message, fix, .. } => {
            eprintln!("{message}");
            eprintln!("  fix: {fix}");
        }
        GrantAttempt::Blocked {
            message,
            reasons,
            fix,
            ..
        } => {
            eprintln!("{message}");
            for reason in reasons {
                eprintln!("  - {reason}");
            }
            eprintln!("  fix: {fix}");
        }
        GrantAttempt::Absent { slug } => {
            eprintln!("{slug} is not configured on this host (see `keyrack set`)");
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: unlock
// ---------------------------------------------------------------------------

async fn cmd_unlock(slug: Option<&str>) -> Result<()> {
    let dir = paths::data_dir()?;
    let daemon = daemon_client(&dir);
    let identity = identity(true)?;

    let store = ManifestStore::new(paths::manifest_file(&dir));
    let Some(manifest) = store.load(&identity).await? else {
        bail!("no keys configured on this host yet (see `keyrack set`)");
    };

    let target = match slug {
        Some(s) => UnlockTarget::Key(KeySlug::parse(s)?),
        None => UnlockTarget::All,
    };

    let registry = VaultRegistry::new(&dir, SecureSession::new(), daemon.clone());
    let orchestrator =
        UnlockOrchestrator::new(registry, MechanismRegistry::new(), daemon, manifest);
    let report = orchestrator
        .unlock(&target, Some(&identity.passphrase))
        .await?;

    for vault in &report.unlocked {
        println!("unlocked {vault}");
    }
    println!(
        "{} credential(s) minted into the session daemon",
        report.cached.len()
    );
    for (slug, reason) in &report.skipped {
        eprintln!("skipped {slug}: {reason}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: set
// ---------------------------------------------------------------------------

async fn cmd_set(
    slug: &str,
    vault: &str,
    mechanism: &str,
    exid: Option<String>,
    value: Option<String>,
) -> Result<()> {
    let slug = KeySlug::parse(slug)?;
    let vault_kind =
        VaultKind::parse(vault).ok_or_else(|| anyhow!("unknown vault {vault:?}"))?;
    let mech_kind = MechanismKind::parse(mechanism)
        .ok_or_else(|| anyhow!("unknown mechanism {mechanism:?}"))?;

    let value = match value {
        Some(v) => v,
        // The SSO vault stores no secret; its value is the profile name.
        None if vault_kind == VaultKind::AwsIamSso => exid.clone().unwrap_or_default(),
        None => rpassword::prompt_password(format!("value for {slug}: "))?,
    };

    // Shape and firewall checks that need no network run before anything is
    // written; the SSO mechanism's source check calls out to AWS and is
    // deferred to unlock time instead.
    if mech_kind != MechanismKind::EphemeralViaAwsSso {
        let verdict = MechanismRegistry::new()
            .mechanism(mech_kind)
            .validate(ValidateInput::Source(&value))
            .await?;
        if !verdict.valid {
            for reason in &verdict.reason {
                eprintln!("  - {reason}");
            }
            bail!("refusing to store a value for {slug}");
        }
    }

    let dir = paths::data_dir()?;
    let daemon = daemon_client(&dir);
    let identity = identity(true)?;

    let session = SecureSession::new();
    session.store(&identity.passphrase);
    let registry = VaultRegistry::new(&dir, session, daemon.clone());
    let returned_exid =
        store_value(&registry, &daemon, &slug, vault_kind, mech_kind, &value, exid.as_deref())
            .await?;
    let exid = returned_exid.or(exid);

    let store = ManifestStore::new(paths::manifest_file(&dir));
    let mut manifest = store.load(&identity).await?.unwrap_or_else(|| HostManifest {
        recipients: vec![identity.id.clone()],
        ..Default::default()
    });
    let (_, outcome) = manifest.findsert(&slug, vault_kind, mech_kind, exid);
    if outcome.dirty() {
        store.save(&manifest, &identity).await?;
    }

    let grade = infer_grade(vault_kind, mech_kind);
    println!("{slug}: {} via {} [{grade}]", vault_kind, mech_kind);
    Ok(())
}

/// Write a value into its vault.  The daemon cache records the key's
/// configured mechanism so grants resolved from it carry correct provenance
/// and re-apply the right firewall; every other backend goes through the
/// generic trait surface.
async fn store_value(
    registry: &VaultRegistry,
    daemon: &Arc<dyn DaemonClient>,
    slug: &KeySlug,
    vault_kind: VaultKind,
    mech_kind: MechanismKind,
    value: &str,
    exid: Option<&str>,
) -> keyrack_core::Result<Option<String>> {
    if vault_kind == VaultKind::OsDaemon {
        DaemonVault::new(daemon.clone())
            .cache(DaemonKey {
                slug: slug.clone(),
                secret: value.to_string(),
                mechanism: mech_kind,
                expires_at: None,
            })
            .await?;
        return Ok(None);
    }
    let adapter = registry.vault(vault_kind, exid)?;
    adapter.set(slug, value, None).await
}

// ---------------------------------------------------------------------------
// Subcommand: rm
// ---------------------------------------------------------------------------

async fn cmd_rm(slug: &str) -> Result<()> {
    let slug = KeySlug::parse(slug)?;
    let dir = paths::data_dir()?;
    let daemon = daemon_client(&dir);
    let identity = identity(true)?;

    let store = ManifestStore::new(paths::manifest_file(&dir));
    let Some(mut manifest) = store.load(&identity).await? else {
        println!("{slug} is not configured on this host");
        return Ok(());
    };
    let Some(host) = manifest.remove(&slug) else {
        println!("{slug} is not configured on this host");
        return Ok(());
    };

    let registry = VaultRegistry::new(&dir, SecureSession::new(), daemon.clone());
    let adapter = registry.vault_for(&host)?;
    delete_stored_value(adapter.as_ref(), &slug).await?;

    // Evict any cached copy; an unreachable daemon holds nothing anyway.
    let _ = daemon.access_relock(std::slice::from_ref(&slug)).await;

    store.save(&manifest, &identity).await?;
    println!("removed {slug}");
    Ok(())
}

/// Delete a key's stored value.  Vaults that hold nothing of their own
/// (envvar, 1password) refuse `del`; removal there only forgets the routing,
/// so the manifest update must still go through.
async fn delete_stored_value(adapter: &dyn Vault, slug: &KeySlug) -> keyrack_core::Result<()> {
    match adapter.del(slug).await {
        Err(Error::UnsupportedOperation { vault, .. }) => {
            debug!(slug = %slug, vault = vault.as_str(), "vault stores nothing to delete");
            Ok(())
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: list
// ---------------------------------------------------------------------------

async fn cmd_list(env: Option<&str>) -> Result<()> {
    let dir = paths::data_dir()?;
    let identity = identity(true)?;

    let store = ManifestStore::new(paths::manifest_file(&dir));
    let Some(manifest) = store.load(&identity).await? else {
        println!("no keys configured on this host");
        return Ok(());
    };

    for host in manifest.hosts.values() {
        if let Some(env) = env {
            if host.slug.env() != env {
                continue;
            }
        }
        let grade = infer_grade(host.vault, host.mechanism);
        println!(
            "{}  {}  {}  [{grade}]",
            host.slug,
            host.vault.as_str(),
            host.mechanism.as_str()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// The daemon transport for this platform: unix socket where available,
/// otherwise a null client that resolves straight through to locked.
fn daemon_client(dir: &std::path::Path) -> Arc<dyn DaemonClient> {
    #[cfg(unix)]
    {
        Arc::new(keyrack_vaults::SocketDaemonClient::new(paths::daemon_socket(dir)))
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
        Arc::new(keyrack_vaults::NullDaemonClient)
    }
}

/// Recipient identity from the environment alone.  `None` when no
/// passphrase is available without prompting.
fn identity_from_env() -> Option<RecipientIdentity> {
    let passphrase = std::env::var(session::PASSPHRASE_ENV)
        .ok()
        .filter(|v| !v.is_empty())?;
    Some(RecipientIdentity::new(identity_id(), passphrase))
}

/// Recipient identity, prompting for the passphrase when the environment
/// does not carry one and `prompt` allows it.
fn identity(prompt: bool) -> Result<RecipientIdentity> {
    if let Some(identity) = identity_from_env() {
        return Ok(identity);
    }
    if !prompt {
        bail!(
            "no passphrase available; set {} or run interactively",
            session::PASSPHRASE_ENV
        );
    }
    let passphrase = rpassword::prompt_password("keyrack passphrase: ")?;
    if passphrase.is_empty() {
        bail!("an empty passphrase is not usable");
    }
    Ok(RecipientIdentity::new(identity_id(), passphrase))
}

fn identity_id() -> String {
    std::env::var(IDENTITY_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Default)]
    struct MemoryDaemon {
        reachable: AtomicBool,
        keys: Mutex<Vec<DaemonKey>>,
    }

    impl MemoryDaemon {
        fn up() -> Arc<Self> {
            let daemon = Self::default();
            daemon.reachable.store(true, Ordering::SeqCst);
            Arc::new(daemon)
        }
    }

    #[async_trait::async_trait]
    impl DaemonClient for MemoryDaemon {
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

    fn registry(dir: &std::path::Path, daemon: Arc<dyn DaemonClient>) -> VaultRegistry {
        VaultRegistry::new(dir, SecureSession::new(), daemon).without_prompt()
    }

    #[tokio::test]
    async fn storing_into_the_daemon_records_the_configured_mechanism() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = MemoryDaemon::up();
        let client: Arc<dyn DaemonClient> = daemon.clone();
        let registry = registry(dir.path(), client.clone());
        let s = slug("acme.prod.GH_APP");

        store_value(
            &registry,
            &client,
            &s,
            VaultKind::OsDaemon,
            MechanismKind::EphemeralViaGithubApp,
            r#"{"appId": 1}"#,
            None,
        )
        .await
        .unwrap();

        let keys = daemon.keys.lock().unwrap();
        assert_eq!(keys[0].mechanism, MechanismKind::EphemeralViaGithubApp);
    }

    #[tokio::test]
    async fn removing_a_key_from_a_read_only_vault_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), MemoryDaemon::up());
        let s = slug("acme.prod.OP_KEY");

        let mut manifest = HostManifest::default();
        manifest.findsert(
            &s,
            VaultKind::OnePassword,
            MechanismKind::PermanentViaReplica,
            Some("op://vault/item/field".into()),
        );
        let host = manifest.remove(&s).unwrap();

        // Items live in the external tool; forgetting the routing is enough.
        let adapter = registry.vault_for(&host).unwrap();
        delete_stored_value(adapter.as_ref(), &s).await.unwrap();
        assert!(manifest.host(&s).is_none());
    }

    #[tokio::test]
    async fn removal_still_deletes_values_a_vault_actually_stores() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), MemoryDaemon::up());
        let s = slug("acme.prod.DIRECT_KEY");

        let direct = registry.vault(VaultKind::OsDirect, None).unwrap();
        direct.set(&s, "stored", None).await.unwrap();

        delete_stored_value(direct.as_ref(), &s).await.unwrap();
        assert!(direct.get(&s, None).await.unwrap().is_none());
    }
}
