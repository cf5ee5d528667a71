//! Unified error type for keyrack.
//!
//! Every library crate in the workspace surfaces hard failures through
//! [`Error`].  Two expected credential states are deliberately *not* part of
//! this taxonomy: a key that is merely locked (no unlocked source holds it)
//! and a key that is blocked by the firewall are returned as
//! [`GrantAttempt`](crate::grant::GrantAttempt) variants, never as errors.
//! An `Error` always means something the operator has to fix out of band:
//! a misconfiguration, a broken external tool, or corrupted state on disk.

use crate::kinds::VaultKind;

/// Unified hard-failure type for the keyrack workspace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // -- Configuration errors -----------------------------------------------
    /// The operation is not supported by this vault (e.g. `set` on os.envvar).
    /// Indicates a programming or configuration error, never a runtime
    /// credential state.
    #[error("vault {vault} does not support {op}")]
    UnsupportedOperation { vault: VaultKind, op: &'static str },

    /// The slug is referenced but has no entry in the host manifest.
    /// Distinct from "locked": locked implies configured-but-inaccessible.
    #[error("key {slug} is not configured on this host")]
    NotConfigured { slug: String },

    /// A slug string did not parse as `org.env.rawName`.
    #[error("invalid key slug {input:?}: {reason}")]
    InvalidSlug { input: String, reason: String },

    /// A caller-supplied value failed shape validation (profile names,
    /// recipient ids, and similar non-secret inputs).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    // -- External tool errors -----------------------------------------------
    /// A subprocess or network collaborator failed in a way that cannot be
    /// read as "session expired" or "item not found".
    #[error("{tool} failed: {reason}")]
    ExternalTool { tool: String, reason: String },

    /// A subprocess or network call exceeded its bounded timeout.
    #[error("{tool} timed out")]
    Timeout { tool: String },

    // -- Crypto / storage errors --------------------------------------------
    /// Encryption, decryption, or key derivation failed.  A wrong passphrase
    /// surfaces here (authentication failure on decrypt), not as a miss.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },

    /// A passphrase was required but none was supplied, cached, or available
    /// via the environment fallback, and no prompt is possible.
    #[error("passphrase required but not available")]
    PassphraseRequired,

    /// The host manifest (or a vault's on-disk document) failed to parse.
    #[error("manifest corrupt: {reason}")]
    ManifestCorrupt { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// Filesystem I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error (repo manifest).
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
