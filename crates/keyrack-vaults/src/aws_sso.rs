//! aws.iam.sso -- the "secret" is an AWS named profile.
//!
//! Nothing sensitive is stored by keyrack for this vault: the exid is the
//! profile name, and the actual session material lives in the AWS CLI's own
//! SSO cache.  Unlocking means having a live SSO session for the profile
//! (checked with the identity call, refreshed with a browser login);
//! relocking actively logs the session out rather than waiting for a
//! timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use keyrack_core::error::{Error, Result};
use keyrack_core::kinds::VaultKind;
use keyrack_core::slug::KeySlug;

use crate::aws;
use crate::traits::Vault;

/// SSO-profile vault, pinned to one profile per instance.
///
/// The resolver constructs one per configured key, using the key's exid as
/// the profile name.
pub struct AwsSsoVault {
    profile: String,
}

impl AwsSsoVault {
    /// Vault for the given named profile.
    ///
    /// # Errors
    ///
    /// Rejects syntactically invalid profile names up front so no CLI call
    /// ever runs with a malformed argument.
    pub fn new(profile: impl Into<String>) -> Result<Self> {
        let profile = profile.into();
        if !aws::valid_profile_name(&profile) {
            return Err(Error::InvalidInput {
                reason: format!("invalid AWS profile name {profile:?}"),
            });
        }
        Ok(Self { profile })
    }

    /// The profile this vault is pinned to.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// The profile a `set` call records: caller-supplied value, else this
    /// vault's own, shape-checked either way.
    fn resolve_profile<'a>(&'a self, secret: &'a str) -> Result<&'a str> {
        let profile = if secret.is_empty() { &self.profile } else { secret };
        if !aws::valid_profile_name(profile) {
            return Err(Error::InvalidInput {
                reason: format!("invalid AWS profile name {profile:?}"),
            });
        }
        Ok(profile)
    }

    /// Round-trip self-test: unlock, read, relock.  Run on first-time setup
    /// to prove the profile actually works end-to-end.
    pub async fn self_test(&self) -> Result<()> {
        self.unlock(None).await?;
        let slug = KeySlug::new("keyrack", "selftest", "PROFILE")?;
        let got = self.get(&slug, Some(&self.profile)).await?;
        if got.as_deref() != Some(self.profile.as_str()) {
            return Err(Error::ExternalTool {
                tool: aws::AWS_CLI.to_string(),
                reason: "self-test read returned an unexpected profile".into(),
            });
        }
        self.relock(&slug, Some(&self.profile)).await
    }
}

#[async_trait]
impl Vault for AwsSsoVault {
    fn kind(&self) -> VaultKind {
        VaultKind::AwsIamSso
    }

    async fn is_unlocked(&self) -> bool {
        match aws::caller_identity(&self.profile).await {
            Ok(out) => out.success,
            Err(_) => false,
        }
    }

    async fn unlock(&self, _passphrase: Option<&str>) -> Result<()> {
        // A live session needs nothing; an expired one gets a browser login.
        if self.is_unlocked().await {
            debug!(profile = %self.profile, "SSO session already valid");
            return Ok(());
        }

        info!(profile = %self.profile, "SSO session expired, starting browser login");
        let login = aws::sso_login(&self.profile).await?;
        if !login.success {
            return Err(Error::ExternalTool {
                tool: aws::AWS_CLI.to_string(),
                reason: format!("sso login failed: {}", login.stderr_first_line()),
            });
        }

        let check = aws::caller_identity(&self.profile).await?;
        if check.success {
            Ok(())
        } else {
            Err(Error::ExternalTool {
                tool: aws::AWS_CLI.to_string(),
                reason: format!(
                    "identity check still failing after login: {}",
                    check.stderr_first_line()
                ),
            })
        }
    }

    async fn get(&self, _slug: &KeySlug, exid: Option<&str>) -> Result<Option<String>> {
        // The stored "value" is the profile name itself; translation into
        // usable credentials is the SSO mechanism's job.
        Ok(Some(exid.unwrap_or(&self.profile).to_string()))
    }

    async fn set(
        &self,
        slug: &KeySlug,
        secret: &str,
        _expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        let profile = self.resolve_profile(secret)?.to_string();
        // First-time setup proves the profile works before it is recorded.
        Self::new(&profile)?.self_test().await?;
        info!(slug = %slug, profile, "SSO profile verified and recorded as exid");
        Ok(Some(profile))
    }

    async fn del(&self, _slug: &KeySlug) -> Result<()> {
        // Nothing stored locally; forgetting the exid happens in the manifest.
        Ok(())
    }

    async fn relock(&self, _slug: &KeySlug, exid: Option<&str>) -> Result<()> {
        let profile = exid.unwrap_or(&self.profile);
        let out = aws::sso_logout(profile).await?;
        if out.success {
            info!(profile, "SSO session logged out");
            Ok(())
        } else {
            Err(Error::ExternalTool {
                tool: aws::AWS_CLI.to_string(),
                reason: format!("sso logout failed: {}", out.stderr_first_line()),
            })
        }
    }
}
