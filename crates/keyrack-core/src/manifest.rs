//! Host and repo manifest data types.
//!
//! The **host manifest** is the per-machine record of which (vault,
//! mechanism) each configured slug uses.  It contains no secrets -- only
//! routing metadata plus the opaque external reference (`exid`) some vaults
//! need (a password-manager item path, a cloud profile name).  It is
//! persisted encrypted; the envelope format lives in `keyrack-vaults`.
//!
//! The **repo manifest** is the plaintext, human-edited declaration of which
//! raw key names exist per deployment environment, checked into the
//! repository.  No secrets are permitted in it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kinds::{MechanismKind, VaultKind};
use crate::slug::KeySlug;

// ---------------------------------------------------------------------------
// Host manifest
// ---------------------------------------------------------------------------

/// One configured key on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHost {
    pub slug: KeySlug,
    pub vault: VaultKind,
    pub mechanism: MechanismKind,

    /// Opaque external reference the vault may need to locate the value.
    /// Never the secret itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exid: Option<String>,

    /// Upper bound, in seconds, on how long a minted credential may live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<i64>,

    /// Recipient identity a vault should encrypt this key's material to,
    /// when it differs from the manifest default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_recipient: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a [`HostManifest::findsert`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Findsert {
    /// No entry existed; one was inserted.
    Inserted,
    /// An identical entry existed; nothing changed, no write needed.
    Unchanged,
    /// An entry existed with different routing; it was updated in place.
    Updated,
}

impl Findsert {
    /// Whether the manifest needs to be written back to disk.
    pub fn dirty(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Per-machine manifest: trusted recipient identities plus one [`KeyHost`]
/// per configured slug.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostManifest {
    /// Identity ids that may decrypt this manifest.  More than one is
    /// supported so a person and a CI identity can share a manifest without
    /// per-recipient encrypted copies.
    #[serde(default)]
    pub recipients: Vec<String>,

    /// Configured keys, keyed by canonical slug string.
    #[serde(default)]
    pub hosts: BTreeMap<String, KeyHost>,
}

impl HostManifest {
    /// Look up the entry for a slug.
    pub fn host(&self, slug: &KeySlug) -> Option<&KeyHost> {
        self.hosts.get(&slug.to_string())
    }

    /// Insert-if-absent, return-if-identical, else update -- keyed on slug.
    ///
    /// Identity is judged on `(vault, mechanism, exid)`; an identical
    /// findsert returns the existing entry untouched (its timestamps keep
    /// their original values and [`Findsert::dirty`] reports no write).
    pub fn findsert(
        &mut self,
        slug: &KeySlug,
        vault: VaultKind,
        mechanism: MechanismKind,
        exid: Option<String>,
    ) -> (&KeyHost, Findsert) {
        let key = slug.to_string();
        let now = Utc::now();

        let outcome = match self.hosts.get_mut(&key) {
            None => {
                self.hosts.insert(
                    key.clone(),
                    KeyHost {
                        slug: slug.clone(),
                        vault,
                        mechanism,
                        exid,
                        max_duration_secs: None,
                        vault_recipient: None,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Findsert::Inserted
            }
            Some(existing)
                if existing.vault == vault
                    && existing.mechanism == mechanism
                    && existing.exid == exid =>
            {
                Findsert::Unchanged
            }
            Some(existing) => {
                existing.vault = vault;
                existing.mechanism = mechanism;
                existing.exid = exid;
                existing.updated_at = now;
                Findsert::Updated
            }
        };

        (&self.hosts[&key], outcome)
    }

    /// Remove the entry for a slug, returning it if it existed.
    pub fn remove(&mut self, slug: &KeySlug) -> Option<KeyHost> {
        self.hosts.remove(&slug.to_string())
    }

    /// The distinct set of vaults referenced by any configured key.
    pub fn distinct_vaults(&self) -> Vec<VaultKind> {
        let mut vaults: Vec<VaultKind> = self.hosts.values().map(|h| h.vault).collect();
        vaults.sort();
        vaults.dedup();
        vaults
    }
}

// ---------------------------------------------------------------------------
// Repo manifest
// ---------------------------------------------------------------------------

/// Plaintext, per-repository declaration of raw key names per environment.
///
/// On disk this is a TOML document:
///
/// ```toml
/// org = "acme"
///
/// [env]
/// prod = ["GITHUB_TOKEN", "API_KEY"]
/// stage = ["API_KEY"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoManifest {
    /// Organisation slug -- the first segment of every key slug this repo
    /// declares.
    pub org: String,

    /// Raw key names per deployment environment.
    #[serde(default)]
    pub env: BTreeMap<String, Vec<String>>,
}

impl RepoManifest {
    /// Parse a repo manifest from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a repo manifest file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Expand one environment's raw names into full slugs.
    ///
    /// Environments not declared in the manifest expand to an empty list.
    pub fn slugs(&self, env: &str) -> Result<Vec<KeySlug>> {
        let Some(names) = self.env.get(env) else {
            return Ok(Vec::new());
        };
        names
            .iter()
            .map(|name| KeySlug::new(&self.org, env, name))
            .collect()
    }

    /// Expand every declared environment into full slugs, environments in
    /// sorted order.
    pub fn all_slugs(&self) -> Result<Vec<KeySlug>> {
        let mut out = Vec::new();
        for env in self.env.keys() {
            out.extend(self.slugs(env)?);
        }
        Ok(out)
    }
}
