//! In-process secure session state.
//!
//! The os.secure vault needs its passphrase for every read and write in the
//! same process, but must only prompt once.  [`SecureSession`] is the single
//! memory location that holds it: an explicit, injectable object owned by the
//! CLI's top-level context, so tests can run with isolated sessions in
//! parallel instead of sharing a module-level global.
//!
//! Concurrent CLI invocations are separate processes and never share this
//! state; the [`PASSPHRASE_ENV`] fallback variable is what carries a
//! passphrase across a chain of commands in one shell session.

use std::sync::{Arc, Mutex};

/// Environment variable consulted when no passphrase is cached in memory.
pub const PASSPHRASE_ENV: &str = "KEYRACK_PASSPHRASE";

/// Process-lifetime passphrase holder for the os.secure vault.
#[derive(Debug, Clone, Default)]
pub struct SecureSession {
    passphrase: Arc<Mutex<Option<String>>>,
}

impl SecureSession {
    /// Create an empty session (no passphrase cached).
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a passphrase for the rest of the process lifetime.
    pub fn store(&self, passphrase: impl Into<String>) {
        let mut guard = self.passphrase.lock().expect("session mutex poisoned");
        *guard = Some(passphrase.into());
    }

    /// Drop the cached passphrase.
    pub fn clear(&self) {
        let mut guard = self.passphrase.lock().expect("session mutex poisoned");
        *guard = None;
    }

    /// The cached passphrase, if one is held in memory.
    pub fn cached(&self) -> Option<String> {
        self.passphrase
            .lock()
            .expect("session mutex poisoned")
            .clone()
    }

    /// Resolve a passphrase without prompting: in-memory cache first, then
    /// the [`PASSPHRASE_ENV`] fallback.
    pub fn resolve(&self) -> Option<String> {
        self.cached()
            .or_else(|| std::env::var(PASSPHRASE_ENV).ok().filter(|v| !v.is_empty()))
    }

    /// Whether a passphrase is available without prompting.
    pub fn is_unlocked(&self) -> bool {
        self.resolve().is_some()
    }
}
