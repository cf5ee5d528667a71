//! Grant resolution.
//!
//! A grant request walks exactly two sources, in order: the process
//! environment, then the daemon session cache. Every other vault is
//! locked at rest and only becomes visible to the resolver after the
//! unlock orchestrator has copied its translated keys into the daemon.
//! Each candidate value passes through its mechanism's firewall before
//! it is handed out.

use std::sync::Arc;

use keyrack_core::{
    Grant, GrantAttempt, GrantSource, HostManifest, Key, KeySlug, MechanismKind, Result,
    VaultKind, infer_grade,
};
use keyrack_mechanisms::{MechanismRegistry, ValidateInput};
use keyrack_vaults::{DaemonClient, EnvvarVault, Vault};
use tracing::debug;

/// Resolves slugs into grant attempts.
///
/// The host manifest is optional: it lives encrypted on disk, so a
/// resolver running without an identity cannot read it. Without a
/// manifest every miss reports `locked` (the caller may simply not
/// have unlocked yet); with one, slugs the manifest does not mention
/// report `absent` instead.
pub struct GrantResolver {
    envvar: EnvvarVault,
    daemon: Arc<dyn DaemonClient>,
    mechanisms: MechanismRegistry,
    manifest: Option<HostManifest>,
}

impl GrantResolver {
    pub fn new(daemon: Arc<dyn DaemonClient>, mechanisms: MechanismRegistry) -> Self {
        Self {
            envvar: EnvvarVault,
            daemon,
            mechanisms,
            manifest: None,
        }
    }

    /// Attaches a decrypted host manifest, enabling `absent` outcomes.
    pub fn with_manifest(mut self, manifest: HostManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Resolves a single slug. Locked and blocked are outcomes, not
    /// errors; `Err` is reserved for infrastructure failures.
    pub async fn resolve(&self, slug: &KeySlug) -> Result<GrantAttempt> {
        if let Some(raw) = self.envvar.get(slug, None).await? {
            debug!(slug = %slug, vault = VaultKind::OsEnvvar.as_str(), "candidate found");
            return self
                .admit(slug, raw, VaultKind::OsEnvvar, MechanismKind::PermanentViaReplica, false)
                .await;
        }

        if self.daemon.is_reachable().await {
            let slugs = [slug.clone()];
            if let Some(keys) = self.daemon.access_get(&slugs).await {
                if let Some(key) = keys.into_iter().find(|k| k.slug == *slug) {
                    debug!(slug = %slug, vault = VaultKind::OsDaemon.as_str(), "candidate found");
                    return self
                        .admit(slug, key.secret, VaultKind::OsDaemon, key.mechanism, true)
                        .await;
                }
            }
        }

        if let Some(manifest) = &self.manifest {
            if manifest.host(slug).is_none() {
                return Ok(GrantAttempt::Absent { slug: slug.clone() });
            }
        }

        Ok(GrantAttempt::Locked {
            slug: slug.clone(),
            message: format!("no unlocked source holds a value for {slug}"),
            fix: format!("run `keyrack unlock {slug}` to open its vault for this session"),
        })
    }

    /// Resolves each slug independently, optionally restricted to one
    /// environment. One slug's outcome never affects another's.
    pub async fn resolve_all(
        &self,
        slugs: &[KeySlug],
        env: Option<&str>,
    ) -> Result<Vec<GrantAttempt>> {
        let mut attempts = Vec::with_capacity(slugs.len());
        for slug in slugs {
            if let Some(env) = env {
                if slug.env() != env {
                    continue;
                }
            }
            attempts.push(self.resolve(slug).await?);
        }
        Ok(attempts)
    }

    /// Runs a candidate value through its mechanism's firewall and
    /// either mints a grant or downgrades to `blocked`.
    async fn admit(
        &self,
        slug: &KeySlug,
        secret: String,
        vault: VaultKind,
        mechanism: MechanismKind,
        cached: bool,
    ) -> Result<GrantAttempt> {
        let adapter = self.mechanisms.mechanism(mechanism);
        let input = if cached {
            ValidateInput::Cached(&secret)
        } else {
            ValidateInput::Source(&secret)
        };
        let verdict = adapter.validate(input).await?;
        if !verdict.valid {
            let reasons = verdict.reason.into_iter().collect::<Vec<_>>();
            debug!(slug = %slug, vault = vault.as_str(), "candidate rejected by firewall");
            return Ok(GrantAttempt::Blocked {
                slug: slug.clone(),
                message: format!("a value for {slug} was found in {vault} but refused"),
                reasons,
                fix: format!(
                    "store a scoped credential for {slug} instead (see `keyrack set`)"
                ),
            });
        }
        let grade = infer_grade(vault, mechanism);
        Ok(GrantAttempt::Granted {
            grant: Grant {
                slug: slug.clone(),
                key: Key { secret, grade },
                source: GrantSource { vault, mechanism },
            },
        })
    }
}
