//! Grant outcomes.
//!
//! Resolving a slug produces exactly one [`GrantAttempt`] variant.  Callers
//! are expected to match exhaustively -- locked and blocked are legitimate,
//! recoverable states that automation must handle, not errors.  The
//! `message` and `fix` fields are written to be printed verbatim by CLI
//! surfaces.

use serde::{Deserialize, Serialize};

use crate::grade::Grade;
use crate::kinds::{MechanismKind, VaultKind};
use crate::slug::KeySlug;

/// A resolved secret value together with its derived audit grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    /// The usable (possibly freshly minted) secret value.
    pub secret: String,
    /// Derived label; never caller-supplied.
    pub grade: Grade,
}

/// Provenance of a grant: which vault supplied the raw value and which
/// mechanism translated and validated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSource {
    pub vault: VaultKind,
    pub mechanism: MechanismKind,
}

/// A successfully resolved, policy-passed credential plus provenance.
///
/// Immutable value constructed fresh on every resolution; the engine never
/// caches grants (only the daemon vault caches, out of process).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub slug: KeySlug,
    pub key: Key,
    pub source: GrantSource,
}

impl Grant {
    /// Deployment environment this grant belongs to (from the slug).
    pub fn env(&self) -> &str {
        self.slug.env()
    }

    /// Organisation this grant belongs to (from the slug).
    pub fn org(&self) -> &str {
        self.slug.org()
    }
}

/// The outcome of resolving one slug.  Exactly one case holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GrantAttempt {
    /// A usable value was found, translated, and passed the firewall.
    Granted { grant: Grant },

    /// The key is configured but no *unlocked* source holds a value.
    /// `fix` names the exact unlock command to run.
    Locked {
        slug: KeySlug,
        message: String,
        fix: String,
    },

    /// A value was found but rejected by the mechanism's firewall.
    Blocked {
        slug: KeySlug,
        message: String,
        reasons: Vec<String>,
        fix: String,
    },

    /// The key is not configured on this host at all.
    Absent { slug: KeySlug },
}

impl GrantAttempt {
    /// The slug this attempt was for, whatever the outcome.
    pub fn slug(&self) -> &KeySlug {
        match self {
            Self::Granted { grant } => &grant.slug,
            Self::Locked { slug, .. } | Self::Blocked { slug, .. } | Self::Absent { slug } => slug,
        }
    }

    /// The grant, if this attempt succeeded.
    pub fn granted(&self) -> Option<&Grant> {
        match self {
            Self::Granted { grant } => Some(grant),
            Self::Locked { .. } | Self::Blocked { .. } | Self::Absent { .. } => None,
        }
    }
}
