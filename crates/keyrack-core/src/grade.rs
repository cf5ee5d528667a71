//! Grade inference.
//!
//! A [`Grade`] is a derived label describing how well a credential is
//! protected at rest and how long a granted value lives.  It exists for
//! audit and display only -- enforcement happens in the mechanisms' firewall,
//! never here.  [`infer_grade`] is pure and total: no I/O, no failure mode,
//! and the grade is never stored or trusted from input.

use serde::{Deserialize, Serialize};

use crate::kinds::{MechanismKind, VaultKind};

/// How the raw value is protected at rest.  A property of the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protection {
    Plaintext,
    Encrypted,
}

/// How long a granted value lives.  A property of the mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// The stored value is handed out as-is and lives until rotated.
    Permanent,
    /// Every grant mints a fresh short-lived derived credential.
    Ephemeral,
}

/// Derived audit label for a resolved credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub protection: Protection,
    pub duration: Lifetime,
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let protection = match self.protection {
            Protection::Plaintext => "plaintext",
            Protection::Encrypted => "encrypted",
        };
        let duration = match self.duration {
            Lifetime::Permanent => "permanent",
            Lifetime::Ephemeral => "ephemeral",
        };
        write!(f, "{protection}/{duration}")
    }
}

/// Map a (vault, mechanism) pair to its grade.
///
/// os.envvar and os.direct hold values in plaintext; every other vault keeps
/// them encrypted or delegated to an external credential store (the SSO
/// vault's "secret" is a profile name whose session material lives in the
/// cloud CLI's own cache).  Replica-style mechanisms pass through permanent
/// values; the minting mechanisms always produce ephemeral ones.
pub fn infer_grade(vault: VaultKind, mechanism: MechanismKind) -> Grade {
    let protection = match vault {
        VaultKind::OsEnvvar | VaultKind::OsDirect => Protection::Plaintext,
        VaultKind::OsSecure
        | VaultKind::OsDaemon
        | VaultKind::OnePassword
        | VaultKind::AwsIamSso => Protection::Encrypted,
    };
    let duration = match mechanism {
        MechanismKind::PermanentViaReplica => Lifetime::Permanent,
        MechanismKind::EphemeralViaGithubApp | MechanismKind::EphemeralViaAwsSso => {
            Lifetime::Ephemeral
        }
    };
    Grade {
        protection,
        duration,
    }
}
