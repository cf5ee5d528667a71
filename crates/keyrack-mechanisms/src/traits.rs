//! The mechanism capability contract.
//!
//! A mechanism is the policy + transformation applied to a raw stored value,
//! independent of where it is stored.  `validate` is the firewall: the
//! resolution engine re-runs it against every value it is about to grant,
//! whichever vault supplied it.  `translate` turns the raw stored value into
//! the usable one, possibly minting a short-lived derived credential over
//! the network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use keyrack_core::error::Result;
use keyrack_core::kinds::MechanismKind;

/// What is being validated: the raw stored value, or a value that has
/// already been translated (e.g. read back from the session daemon's cache).
#[derive(Debug, Clone, Copy)]
pub enum ValidateInput<'a> {
    /// The raw value as stored in a vault.
    Source(&'a str),
    /// An already-translated value from a cache.
    Cached(&'a str),
}

impl<'a> ValidateInput<'a> {
    /// The value under inspection, whichever form it is in.
    pub fn value(&self) -> &'a str {
        match self {
            Self::Source(v) | Self::Cached(v) => v,
        }
    }
}

/// Verdict of a firewall check.
#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    pub reason: Option<String>,
}

impl Validation {
    /// The value passed.
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    /// The value was rejected, with a human-readable reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// A translated, usable credential value.
#[derive(Debug, Clone)]
pub struct Translated {
    pub secret: String,
    /// When the minted credential stops working, for ephemeral mechanisms.
    pub expires_at: Option<DateTime<Utc>>,
}

/// A policy + transformation family.
#[async_trait]
pub trait Mechanism: Send + Sync {
    /// Which family this is.
    fn kind(&self) -> MechanismKind;

    /// The firewall.  Returns a verdict; hard failures (broken external
    /// tool) propagate as errors, while "this credential is not acceptable"
    /// is a rejected verdict.
    async fn validate(&self, input: ValidateInput<'_>) -> Result<Validation>;

    /// Turn the raw stored value into a usable one.  May shell out or make
    /// network calls; ephemeral mechanisms report an expiry.
    async fn translate(&self, secret: &str) -> Result<Translated>;
}
