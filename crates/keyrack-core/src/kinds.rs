//! Vault and mechanism identifiers.
//!
//! These two enums are the keys of the adapter lookup tables: every host
//! manifest entry names exactly one [`VaultKind`] (where the raw value lives)
//! and one [`MechanismKind`] (what policy and transformation apply to it).
//! The string forms are stable -- they appear in the encrypted host manifest
//! on disk and in the daemon protocol, so renaming a variant's string is a
//! breaking change.

use serde::{Deserialize, Serialize};

/// A storage backend capable of holding a raw credential value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VaultKind {
    /// Read-only passthrough to the process environment table.
    #[serde(rename = "os.envvar")]
    OsEnvvar,
    /// Plaintext JSON document on disk with per-entry expiry.
    #[serde(rename = "os.direct")]
    OsDirect,
    /// One passphrase-encrypted file per slug.
    #[serde(rename = "os.secure")]
    OsSecure,
    /// Delegation to the long-lived session daemon.
    #[serde(rename = "os.daemon")]
    OsDaemon,
    /// External password-manager CLI (`op`).
    #[serde(rename = "1password")]
    OnePassword,
    /// AWS named profile backed by an SSO session.
    #[serde(rename = "aws.iam.sso")]
    AwsIamSso,
}

impl VaultKind {
    /// All vault kinds, in resolution-irrelevant declaration order.
    pub const ALL: [VaultKind; 6] = [
        Self::OsEnvvar,
        Self::OsDirect,
        Self::OsSecure,
        Self::OsDaemon,
        Self::OnePassword,
        Self::AwsIamSso,
    ];

    /// The stable string form used in manifests and the daemon protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OsEnvvar => "os.envvar",
            Self::OsDirect => "os.direct",
            Self::OsSecure => "os.secure",
            Self::OsDaemon => "os.daemon",
            Self::OnePassword => "1password",
            Self::AwsIamSso => "aws.iam.sso",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "os.envvar" => Some(Self::OsEnvvar),
            "os.direct" => Some(Self::OsDirect),
            "os.secure" => Some(Self::OsSecure),
            "os.daemon" => Some(Self::OsDaemon),
            "1password" => Some(Self::OnePassword),
            "aws.iam.sso" => Some(Self::AwsIamSso),
            _ => None,
        }
    }
}

impl std::fmt::Display for VaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A policy + transformation family applied to a raw stored value,
/// independent of where it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MechanismKind {
    /// Identity transformation guarded by the long-lived-token firewall.
    #[serde(rename = "PERMANENT_VIA_REPLICA")]
    PermanentViaReplica,
    /// Mint a short-lived GitHub App installation token.
    #[serde(rename = "EPHEMERAL_VIA_GITHUB_APP")]
    EphemeralViaGithubApp,
    /// Export short-lived AWS session credentials for an SSO profile.
    #[serde(rename = "EPHEMERAL_VIA_AWS_SSO")]
    EphemeralViaAwsSso,
}

impl MechanismKind {
    /// All mechanism kinds.
    pub const ALL: [MechanismKind; 3] = [
        Self::PermanentViaReplica,
        Self::EphemeralViaGithubApp,
        Self::EphemeralViaAwsSso,
    ];

    /// The stable string form used in manifests and the daemon protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermanentViaReplica => "PERMANENT_VIA_REPLICA",
            Self::EphemeralViaGithubApp => "EPHEMERAL_VIA_GITHUB_APP",
            Self::EphemeralViaAwsSso => "EPHEMERAL_VIA_AWS_SSO",
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PERMANENT_VIA_REPLICA" => Some(Self::PermanentViaReplica),
            "EPHEMERAL_VIA_GITHUB_APP" => Some(Self::EphemeralViaGithubApp),
            "EPHEMERAL_VIA_AWS_SSO" => Some(Self::EphemeralViaAwsSso),
            _ => None,
        }
    }
}

impl std::fmt::Display for MechanismKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
