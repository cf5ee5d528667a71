//! Core data model for the keyrack credential-grant engine.
//!
//! This crate holds the pure, I/O-free vocabulary shared by every other
//! keyrack crate:
//!
//! - [`slug`] -- the `org.env.rawName` key identifier.
//! - [`kinds`] -- the vault and mechanism enums adapters are keyed on.
//! - [`grade`] -- derived protection/duration labels and [`grade::infer_grade`].
//! - [`grant`] -- the [`grant::GrantAttempt`] outcome union.
//! - [`manifest`] -- host and repo manifest records, including the idempotent
//!   findsert.
//! - [`error`] -- the unified hard-failure type.

pub mod error;
pub mod grade;
pub mod grant;
pub mod kinds;
pub mod manifest;
pub mod slug;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{Error, Result};
pub use grade::{Grade, Lifetime, Protection, infer_grade};
pub use grant::{Grant, GrantAttempt, GrantSource, Key};
pub use kinds::{MechanismKind, VaultKind};
pub use manifest::{Findsert, HostManifest, KeyHost, RepoManifest};
pub use slug::KeySlug;
