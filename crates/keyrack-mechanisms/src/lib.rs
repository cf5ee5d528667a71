//! Mechanism adapters for the keyrack credential-grant engine.
//!
//! A mechanism is the policy + transformation half of a credential: its
//! `validate` is the firewall applied to every granted value, its
//! `translate` turns the raw stored value into a usable (possibly freshly
//! minted, short-lived) one.
//!
//! - [`replica`] -- identity passthrough guarded by the long-lived-token
//!   firewall.
//! - [`github_app`] -- GitHub App installation token minting.
//! - [`aws_sso`] -- AWS SSO session-credential export.

pub mod aws_sso;
pub mod github_app;
pub mod registry;
pub mod replica;
pub mod traits;

pub use registry::MechanismRegistry;
pub use replica::firewall_reasons;
pub use traits::{Mechanism, Translated, ValidateInput, Validation};
