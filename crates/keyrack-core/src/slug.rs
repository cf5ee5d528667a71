//! Namespaced key identifiers.
//!
//! A [`KeySlug`] is the stable identifier `org.env.rawName` under which a
//! credential is known everywhere in keyrack: in the host manifest, in vault
//! storage, and in grant outcomes.  It is parsed positionally on `.` -- the
//! first segment is the org, the second the deployment environment, and the
//! remainder is the raw key name, which may itself contain dots
//! (`acme.prod.SERVICE.TOKEN` has raw name `SERVICE.TOKEN`).

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Canonical `org.env.rawName` identifier for a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySlug {
    org: String,
    env: String,
    raw_name: String,
}

impl KeySlug {
    /// Construct a slug from its three components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlug`] if any component is empty or if the
    /// org/env components contain a `.` (which would change how the slug
    /// re-parses).
    pub fn new(
        org: impl Into<String>,
        env: impl Into<String>,
        raw_name: impl Into<String>,
    ) -> Result<Self> {
        let org = org.into();
        let env = env.into();
        let raw_name = raw_name.into();

        let rebuilt = format!("{org}.{env}.{raw_name}");
        for (label, value) in [("org", &org), ("env", &env)] {
            if value.is_empty() {
                return Err(Error::InvalidSlug {
                    input: rebuilt.clone(),
                    reason: format!("{label} segment is empty"),
                });
            }
            if value.contains('.') {
                return Err(Error::InvalidSlug {
                    input: rebuilt.clone(),
                    reason: format!("{label} segment must not contain '.'"),
                });
            }
        }
        if raw_name.is_empty() {
            return Err(Error::InvalidSlug {
                input: rebuilt,
                reason: "raw name segment is empty".into(),
            });
        }

        Ok(Self { org, env, raw_name })
    }

    /// Parse a slug string positionally: first segment org, second env,
    /// remainder (dots included) the raw key name.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.splitn(3, '.');
        let (Some(org), Some(env), Some(raw_name)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidSlug {
                input: input.to_string(),
                reason: "expected org.env.rawName".into(),
            });
        };
        Self::new(org, env, raw_name)
    }

    /// The organisation segment.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// The deployment environment segment.
    pub fn env(&self) -> &str {
        &self.env
    }

    /// The raw key name (e.g. the environment variable name it maps to).
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }
}

impl fmt::Display for KeySlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.org, self.env, self.raw_name)
    }
}

impl FromStr for KeySlug {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Slugs serialize as their canonical string form so stored documents stay
// human-inspectable.
impl Serialize for KeySlug {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeySlug {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}
