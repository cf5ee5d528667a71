//! Vault backends for the keyrack credential-grant engine.
//!
//! A vault is a storage backend capable of holding one raw credential value
//! per slug.  Six backends implement the [`traits::Vault`] contract:
//!
//! - [`envvar`] -- read-only passthrough to the process environment.
//! - [`direct`] -- plaintext JSON document with lazy expiry eviction.
//! - [`secure`] -- one passphrase-encrypted file per slug.
//! - [`daemon`] -- delegation to the long-lived session daemon.
//! - [`onepassword`] -- the external password-manager CLI.
//! - [`aws_sso`] -- AWS named profiles backed by SSO sessions.
//!
//! Supporting modules: [`crypto`] (ring primitives), [`session`] (the
//! injectable in-memory passphrase), [`manifest_store`] (encrypted
//! multi-recipient persistence for the host manifest), [`proc`] (bounded
//! subprocess execution), [`aws`] (shared AWS CLI wrappers), [`paths`]
//! (on-disk layout), and [`registry`] (the kind → adapter lookup table).

pub mod aws;
pub mod aws_sso;
pub mod crypto;
pub mod daemon;
pub mod direct;
pub mod envvar;
pub mod manifest_store;
pub mod onepassword;
pub mod paths;
pub mod proc;
pub mod registry;
pub mod secure;
pub mod session;
pub mod traits;

pub use daemon::{DaemonClient, DaemonKey, DaemonVault, NullDaemonClient};
pub use envvar::EnvvarVault;
pub use manifest_store::{ManifestStore, RecipientIdentity};
pub use registry::VaultRegistry;
pub use session::SecureSession;
pub use traits::Vault;

#[cfg(unix)]
pub use daemon::SocketDaemonClient;
