//! The vault capability contract.
//!
//! One [`Vault`] implementation exists per storage backend, and each
//! implements unlock/read/write/delete against exactly one medium.  Vaults
//! are stateless except for the os.secure vault's injected
//! [`SecureSession`](crate::session::SecureSession); all operations are
//! asynchronous because they perform file I/O, subprocess execution, or
//! local IPC.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keyrack_core::error::{Error, Result};
use keyrack_core::kinds::VaultKind;
use keyrack_core::slug::KeySlug;

/// A storage backend capable of holding a raw credential value.
#[async_trait]
pub trait Vault: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> VaultKind;

    /// Whether values can currently be read without further interaction.
    async fn is_unlocked(&self) -> bool;

    /// Make the vault readable, prompting or refreshing sessions as needed.
    ///
    /// Idempotent: unlocking an already-unlocked vault is a no-op and must
    /// not re-prompt.
    async fn unlock(&self, passphrase: Option<&str>) -> Result<()>;

    /// Read the raw stored value for a slug.  `exid` is the opaque external
    /// reference some vaults need (a password-manager item path, a cloud
    /// profile name).  Returns `None` when the vault holds no value.
    async fn get(&self, slug: &KeySlug, exid: Option<&str>) -> Result<Option<String>>;

    /// Store a value, optionally with an expiry.  Returns the external
    /// reference under which the value was filed, when the vault uses one.
    async fn set(
        &self,
        slug: &KeySlug,
        secret: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<String>>;

    /// Delete the stored value for a slug.  Deleting a missing value is not
    /// an error.
    async fn del(&self, slug: &KeySlug) -> Result<()>;

    /// Actively terminate whatever session backs this slug's value.  Vaults
    /// with nothing to relock accept the call as a no-op.
    async fn relock(&self, _slug: &KeySlug, _exid: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// The fixed failure for write operations on a read-only vault.
pub(crate) fn unsupported(vault: VaultKind, op: &'static str) -> Error {
    Error::UnsupportedOperation { vault, op }
}
