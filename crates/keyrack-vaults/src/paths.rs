//! On-disk layout for keyrack's per-user state.

use std::path::PathBuf;

use keyrack_core::error::{Error, Result};

/// Environment variable overriding the keyrack data directory.
pub const HOME_ENV: &str = "KEYRACK_HOME";

/// Resolve the keyrack data directory.
///
/// `KEYRACK_HOME` wins when set; otherwise the platform data directory
/// (`~/.local/share/keyrack` on Linux) is used.  The directory is created
/// if missing.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var(HOME_ENV) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => dirs::data_dir()
            .ok_or_else(|| Error::InvalidInput {
                reason: "no platform data directory; set KEYRACK_HOME".into(),
            })?
            .join("keyrack"),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path of the plaintext os.direct document inside `dir`.
pub fn direct_file(dir: &std::path::Path) -> PathBuf {
    dir.join("direct.json")
}

/// Directory holding the os.secure per-slug encrypted files inside `dir`.
pub fn secure_dir(dir: &std::path::Path) -> PathBuf {
    dir.join("secure")
}

/// Path of the encrypted host manifest inside `dir`.
pub fn manifest_file(dir: &std::path::Path) -> PathBuf {
    dir.join("hosts.enc")
}

/// Path of the session daemon's unix socket inside `dir`.
pub fn daemon_socket(dir: &std::path::Path) -> PathBuf {
    dir.join("daemon.sock")
}
