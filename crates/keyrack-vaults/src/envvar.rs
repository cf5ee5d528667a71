//! os.envvar -- read-only passthrough to the process environment.
//!
//! The value for `acme.prod.GITHUB_TOKEN` is whatever `$GITHUB_TOKEN` holds
//! in this process.  Always unlocked.  Writes are intentionally impossible
//! from inside the tool: the environment table belongs to the shell or the
//! CI runner, and `set`/`del` fail with a fixed error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use keyrack_core::error::Result;
use keyrack_core::kinds::VaultKind;
use keyrack_core::slug::KeySlug;

use crate::traits::{Vault, unsupported};

/// Environment-table vault.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvvarVault;

#[async_trait]
impl Vault for EnvvarVault {
    fn kind(&self) -> VaultKind {
        VaultKind::OsEnvvar
    }

    async fn is_unlocked(&self) -> bool {
        true
    }

    async fn unlock(&self, _passphrase: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn get(&self, slug: &KeySlug, _exid: Option<&str>) -> Result<Option<String>> {
        let value = std::env::var(slug.raw_name()).ok().filter(|v| !v.is_empty());
        debug!(slug = %slug, var = slug.raw_name(), found = value.is_some(), "envvar lookup");
        Ok(value)
    }

    async fn set(
        &self,
        _slug: &KeySlug,
        _secret: &str,
        _expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        Err(unsupported(VaultKind::OsEnvvar, "set"))
    }

    async fn del(&self, _slug: &KeySlug) -> Result<()> {
        Err(unsupported(VaultKind::OsEnvvar, "del"))
    }
}
