//! Vault lookup table.
//!
//! Adapters are selected by [`VaultKind`], not by subclassing: the registry
//! owns the shared state the backends need (data directory, secure session,
//! daemon client) and hands out one adapter per kind.  The SSO vault is the
//! one exception -- it is pinned to a profile, so it is constructed per key
//! from the key's exid.

use std::path::PathBuf;
use std::sync::Arc;

use keyrack_core::error::{Error, Result};
use keyrack_core::kinds::VaultKind;
use keyrack_core::manifest::KeyHost;

use crate::aws_sso::AwsSsoVault;
use crate::daemon::{DaemonClient, DaemonVault};
use crate::direct::DirectVault;
use crate::envvar::EnvvarVault;
use crate::onepassword::OnePasswordVault;
use crate::paths;
use crate::secure::SecureVault;
use crate::session::SecureSession;
use crate::traits::Vault;

/// Constructs vault adapters keyed by [`VaultKind`].
pub struct VaultRegistry {
    data_dir: PathBuf,
    session: SecureSession,
    daemon: Arc<dyn DaemonClient>,
    allow_prompt: bool,
}

impl VaultRegistry {
    /// Registry rooted at `data_dir`, sharing the given session and daemon
    /// client across all adapters it builds.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        session: SecureSession,
        daemon: Arc<dyn DaemonClient>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            session,
            daemon,
            allow_prompt: true,
        }
    }

    /// Disable interactive passphrase prompting for every adapter built by
    /// this registry (automation and tests).
    pub fn without_prompt(mut self) -> Self {
        self.allow_prompt = false;
        self
    }

    /// The secure session shared by this registry's adapters.
    pub fn session(&self) -> &SecureSession {
        &self.session
    }

    /// Build the adapter for a configured key, using its exid where the
    /// backend needs one.
    pub fn vault_for(&self, host: &KeyHost) -> Result<Arc<dyn Vault>> {
        self.vault(host.vault, host.exid.as_deref())
    }

    /// Build the adapter for a kind.  `exid` is required for `aws.iam.sso`
    /// (the profile name) and ignored by the other backends.
    pub fn vault(&self, kind: VaultKind, exid: Option<&str>) -> Result<Arc<dyn Vault>> {
        Ok(match kind {
            VaultKind::OsEnvvar => Arc::new(EnvvarVault),
            VaultKind::OsDirect => Arc::new(DirectVault::new(paths::direct_file(&self.data_dir))),
            VaultKind::OsSecure => {
                let vault =
                    SecureVault::new(paths::secure_dir(&self.data_dir), self.session.clone());
                Arc::new(if self.allow_prompt {
                    vault
                } else {
                    vault.without_prompt()
                })
            }
            VaultKind::OsDaemon => Arc::new(DaemonVault::new(self.daemon.clone())),
            VaultKind::OnePassword => Arc::new(OnePasswordVault),
            VaultKind::AwsIamSso => {
                let profile = exid.ok_or_else(|| Error::InvalidInput {
                    reason: "aws.iam.sso requires a profile name (exid)".into(),
                })?;
                Arc::new(AwsSsoVault::new(profile)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::testing::MemoryDaemon;

    fn registry(dir: &std::path::Path) -> VaultRegistry {
        VaultRegistry::new(dir, SecureSession::new(), Arc::new(MemoryDaemon::default()))
            .without_prompt()
    }

    #[test]
    fn builds_every_static_kind() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        for kind in [
            VaultKind::OsEnvvar,
            VaultKind::OsDirect,
            VaultKind::OsSecure,
            VaultKind::OsDaemon,
            VaultKind::OnePassword,
        ] {
            let vault = registry.vault(kind, None).unwrap();
            assert_eq!(vault.kind(), kind);
        }
    }

    #[test]
    fn sso_requires_a_profile() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(registry.vault(VaultKind::AwsIamSso, None).is_err());
        let vault = registry.vault(VaultKind::AwsIamSso, Some("acme-prod")).unwrap();
        assert_eq!(vault.kind(), VaultKind::AwsIamSso);
    }
}
