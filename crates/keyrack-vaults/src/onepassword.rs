//! 1password -- shell out to the `op` CLI.
//!
//! Items live in the user's 1Password account and are referenced by an
//! `op://vault/item/field` path carried as the key's `exid`.  keyrack never
//! manages items itself: `set`/`del` are unsupported and items must be
//! created or removed through the external tool.  A signed-in `op` session
//! is what "unlocked" means here, checked via `op whoami`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use keyrack_core::error::{Error, Result};
use keyrack_core::kinds::VaultKind;
use keyrack_core::slug::KeySlug;

use crate::proc::run_tool;
use crate::traits::{Vault, unsupported};

/// Name of the password-manager CLI binary.
pub const OP_CLI: &str = "op";

const OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Password-manager CLI vault.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnePasswordVault;

#[async_trait]
impl Vault for OnePasswordVault {
    fn kind(&self) -> VaultKind {
        VaultKind::OnePassword
    }

    async fn is_unlocked(&self) -> bool {
        match run_tool(OP_CLI, &["whoami"], OP_TIMEOUT).await {
            Ok(out) => out.success,
            Err(_) => false,
        }
    }

    async fn unlock(&self, _passphrase: Option<&str>) -> Result<()> {
        let out = run_tool(OP_CLI, &["whoami"], OP_TIMEOUT).await?;
        if out.success {
            Ok(())
        } else {
            // Signing in is interactive and belongs to the external tool.
            Err(Error::ExternalTool {
                tool: OP_CLI.to_string(),
                reason: format!(
                    "not signed in ({}); run `op signin` first",
                    out.stderr_first_line()
                ),
            })
        }
    }

    async fn get(&self, slug: &KeySlug, exid: Option<&str>) -> Result<Option<String>> {
        let Some(reference) = exid else {
            return Err(Error::InvalidInput {
                reason: format!("1password key {slug} has no item reference (exid)"),
            });
        };

        let out = run_tool(OP_CLI, &["read", reference], OP_TIMEOUT).await?;
        if !out.success {
            // Missing or inaccessible item reads as absent, not broken.
            debug!(slug = %slug, reference, "op read failed, treating as not found");
            return Ok(None);
        }
        Ok(Some(out.stdout_trimmed().to_string()))
    }

    async fn set(
        &self,
        _slug: &KeySlug,
        _secret: &str,
        _expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        Err(unsupported(VaultKind::OnePassword, "set"))
    }

    async fn del(&self, _slug: &KeySlug) -> Result<()> {
        Err(unsupported(VaultKind::OnePassword, "del"))
    }
}
