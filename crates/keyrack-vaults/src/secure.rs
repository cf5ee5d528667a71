//! os.secure -- one passphrase-encrypted file per slug.
//!
//! Each secret is sealed into its own blob (see [`crate::crypto::seal`])
//! under a directory of encrypted files.  Filenames are a truncated SHA-256
//! of the slug so key names are not leaked through the filesystem.
//!
//! The passphrase is obtained in priority order: explicit input, the
//! `KEYRACK_PASSPHRASE` environment fallback (so a chain of CLI invocations
//! in one shell session prompts once), then an interactive masked prompt.
//! Once obtained it is held only in the injected [`SecureSession`] for the
//! rest of the process.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use keyrack_core::error::{Error, Result};
use keyrack_core::kinds::VaultKind;
use keyrack_core::slug::KeySlug;

use crate::crypto;
use crate::session::SecureSession;
use crate::traits::Vault;

/// Length of the truncated slug hash used as a filename.
const NAME_LEN: usize = 16;

/// Encrypted-files vault.
pub struct SecureVault {
    dir: PathBuf,
    session: SecureSession,
    /// Whether `unlock` may fall back to an interactive masked prompt.
    /// Disabled in tests and non-tty automation.
    allow_prompt: bool,
}

impl SecureVault {
    /// Create a vault storing encrypted files under `dir`, sharing the given
    /// process-wide session.
    pub fn new(dir: impl Into<PathBuf>, session: SecureSession) -> Self {
        Self {
            dir: dir.into(),
            session,
            allow_prompt: true,
        }
    }

    /// Disable the interactive prompt fallback.
    pub fn without_prompt(mut self) -> Self {
        self.allow_prompt = false;
        self
    }

    /// Filename for a slug: truncated url-safe base64 of SHA-256, so the
    /// directory listing reveals nothing about key names.
    fn file_for(&self, slug: &KeySlug) -> PathBuf {
        let digest = Sha256::digest(slug.to_string().as_bytes());
        let mut name = URL_SAFE_NO_PAD.encode(digest);
        name.truncate(NAME_LEN);
        self.dir.join(format!("{name}.enc"))
    }

    /// Resolve the passphrase for a read/write without prompting.
    fn passphrase(&self) -> Result<String> {
        self.session.resolve().ok_or(Error::PassphraseRequired)
    }
}

#[async_trait]
impl Vault for SecureVault {
    fn kind(&self) -> VaultKind {
        VaultKind::OsSecure
    }

    async fn is_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    async fn unlock(&self, passphrase: Option<&str>) -> Result<()> {
        if self.session.is_unlocked() && passphrase.is_none() {
            return Ok(());
        }

        // Priority: explicit input, environment fallback, masked prompt.
        if let Some(explicit) = passphrase {
            self.session.store(explicit);
            return Ok(());
        }
        if let Some(from_env) = self.session.resolve() {
            self.session.store(from_env);
            return Ok(());
        }
        if !self.allow_prompt {
            return Err(Error::PassphraseRequired);
        }

        let prompted = tokio::task::spawn_blocking(|| {
            rpassword::prompt_password("keyrack passphrase: ")
        })
        .await
        .map_err(|e| Error::ExternalTool {
            tool: "prompt".into(),
            reason: e.to_string(),
        })??;

        if prompted.is_empty() {
            return Err(Error::PassphraseRequired);
        }
        self.session.store(prompted);
        Ok(())
    }

    async fn get(&self, slug: &KeySlug, _exid: Option<&str>) -> Result<Option<String>> {
        let passphrase = self.passphrase()?;
        let path = self.file_for(slug);

        let blob = match tokio::fs::read(&path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // A wrong passphrase is a crypto failure, not a miss.
        let plaintext = crypto::open(&blob, &passphrase)?;
        let secret = String::from_utf8(plaintext).map_err(|_| Error::Crypto {
            reason: "decrypted value is not valid UTF-8".into(),
        })?;
        debug!(slug = %slug, "decrypted secure entry");
        Ok(Some(secret))
    }

    async fn set(
        &self,
        slug: &KeySlug,
        secret: &str,
        _expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        let passphrase = self.passphrase()?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let blob = crypto::seal(secret.as_bytes(), &passphrase)?;
        tokio::fs::write(self.file_for(slug), blob).await?;
        debug!(slug = %slug, "wrote secure entry");
        Ok(None)
    }

    async fn del(&self, slug: &KeySlug) -> Result<()> {
        match tokio::fs::remove_file(self.file_for(slug)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug(s: &str) -> KeySlug {
        KeySlug::parse(s).unwrap()
    }

    fn vault_in(dir: &std::path::Path) -> (SecureVault, SecureSession) {
        let session = SecureSession::new();
        let vault = SecureVault::new(dir.join("secure"), session.clone()).without_prompt();
        (vault, session)
    }

    #[tokio::test]
    async fn locked_until_session_holds_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let (vault, session) = vault_in(dir.path());

        assert!(!vault.is_unlocked().await);
        let err = vault.get(&slug("acme.prod.K"), None).await.unwrap_err();
        assert!(matches!(err, Error::PassphraseRequired));

        session.store("pw");
        assert!(vault.is_unlocked().await);
    }

    #[tokio::test]
    async fn unlock_with_explicit_passphrase_then_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (vault, _session) = vault_in(dir.path());
        let s = slug("acme.prod.API_KEY");

        vault.unlock(Some("hunter2")).await.unwrap();
        vault.set(&s, "sealed-value", None).await.unwrap();
        assert_eq!(
            vault.get(&s, None).await.unwrap().as_deref(),
            Some("sealed-value")
        );
    }

    #[tokio::test]
    async fn wrong_passphrase_is_a_hard_failure_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let (vault, session) = vault_in(dir.path());
        let s = slug("acme.prod.API_KEY");

        vault.unlock(Some("right")).await.unwrap();
        vault.set(&s, "v", None).await.unwrap();

        session.store("wrong");
        let err = vault.get(&s, None).await.unwrap_err();
        assert!(matches!(err, Error::Crypto { .. }));
    }

    #[tokio::test]
    async fn filenames_do_not_leak_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let (vault, _session) = vault_in(dir.path());
        vault.unlock(Some("pw")).await.unwrap();
        vault
            .set(&slug("acme.prod.SUPER_SECRET_NAME"), "v", None)
            .await
            .unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path().join("secure")).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains("SUPER_SECRET_NAME"));
        assert!(names[0].ends_with(".enc"));
    }

    #[tokio::test]
    async fn del_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (vault, _session) = vault_in(dir.path());
        vault.unlock(Some("pw")).await.unwrap();

        let s = slug("acme.prod.K");
        vault.set(&s, "v", None).await.unwrap();
        vault.del(&s).await.unwrap();
        vault.del(&s).await.unwrap();
        assert!(vault.get(&s, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unlock_without_any_source_fails_when_prompt_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let (vault, _session) = vault_in(dir.path());
        let err = vault.unlock(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::PassphraseRequired | Error::ExternalTool { .. }
        ));
    }
}
