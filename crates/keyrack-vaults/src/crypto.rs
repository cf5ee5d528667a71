//! Passphrase-based encryption primitives using the `ring` crate.
//!
//! keyrack encrypts with AES-256-GCM under keys derived from a passphrase
//! with PBKDF2-HMAC-SHA256.  Two surfaces are built on top of the raw
//! primitives:
//!
//! - **Sealed blobs**: self-contained `[salt][nonce][ciphertext+tag]` byte
//!   strings, one per stored secret (the os.secure vault).
//! - **Raw-key operations**: encrypt/decrypt under a caller-held 256-bit key,
//!   used by the host-manifest store to wrap a random data key once per
//!   recipient.
//!
//! # Security Notes
//!
//! - Nonces are generated randomly per encryption.  With 96-bit nonces the
//!   collision probability is negligible for up to ~2^32 encryptions under
//!   one key.
//! - PBKDF2 iteration count is 600,000 per the OWASP recommendation for
//!   HMAC-SHA256.

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use keyrack_core::error::{Error, Result};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 32;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// PBKDF2 iteration count for HMAC-SHA256.
const PBKDF2_ITERATIONS: u32 = 600_000;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

fn crypto_err(reason: impl Into<String>) -> Error {
    Error::Crypto {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing operations.  Since we
/// generate a fresh random nonce per call, this wrapper ensures each sealing
/// key is used exactly once.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Raw-key operations
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under a 256-bit `key`, returning `(nonce, ciphertext)`
/// where the ciphertext includes the 16-byte authentication tag.
pub fn encrypt_with_key(plaintext: &[u8], key: &[u8]) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    if key.len() != KEY_LEN {
        return Err(crypto_err(format!(
            "key must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| crypto_err("failed to generate random nonce"))?;

    let unbound = UnboundKey::new(AEAD_ALG, key)
        .map_err(|_| crypto_err("failed to create AES-256-GCM key"))?;
    let mut sealing = SealingKey::new(unbound, SingleNonce::new(nonce_bytes));

    // `ring` encrypts in place and appends the authentication tag.
    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| crypto_err("seal_in_place failed"))?;

    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext` (tag included) under `key` with the given `nonce`.
///
/// # Errors
///
/// Returns [`Error::Crypto`] if the key is wrong or the ciphertext was
/// tampered with -- a wrong passphrase always surfaces here, never as a miss.
pub fn decrypt_with_key(
    nonce: &[u8; NONCE_LEN_BYTES],
    ciphertext: &[u8],
    key: &[u8],
) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(crypto_err(format!(
            "key must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }

    let unbound = UnboundKey::new(AEAD_ALG, key)
        .map_err(|_| crypto_err("failed to create AES-256-GCM key"))?;
    let mut opening = aead::OpeningKey::new(unbound, SingleNonce::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| crypto_err("authentication failed -- wrong passphrase or corrupted data"))?;

    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from `passphrase` and a known `salt`.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let iterations =
        std::num::NonZeroU32::new(PBKDF2_ITERATIONS).expect("PBKDF2_ITERATIONS is non-zero");
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        PBKDF2_ALG,
        iterations,
        salt,
        passphrase.as_bytes(),
        &mut key,
    );
    key
}

/// Generate `len` cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| crypto_err("failed to generate random bytes"))?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Sealed blobs
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `passphrase` into a self-contained blob:
///
/// ```text
/// [32 bytes: PBKDF2 salt]
/// [12 bytes: AES-256-GCM nonce]
/// [remaining: ciphertext + 16-byte tag]
/// ```
pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let salt = random_bytes(SALT_LEN)?;
    let key = derive_key(passphrase, &salt);
    let (nonce, ciphertext) = encrypt_with_key(plaintext, &key)?;

    let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN_BYTES + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`seal`].
pub fn open(blob: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    if blob.len() < SALT_LEN + NONCE_LEN_BYTES + TAG_LEN {
        return Err(crypto_err("encrypted blob too short"));
    }
    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce_slice, ciphertext) = rest.split_at(NONCE_LEN_BYTES);

    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_slice);

    let key = derive_key(passphrase, salt);
    decrypt_with_key(&nonce, ciphertext, &key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let blob = seal(b"hello keyrack", "passphrase").unwrap();
        let plaintext = open(&blob, "passphrase").unwrap();
        assert_eq!(plaintext, b"hello keyrack");
    }

    #[test]
    fn open_with_wrong_passphrase_fails() {
        let blob = seal(b"secret", "right").unwrap();
        assert!(open(&blob, "wrong").is_err());
    }

    #[test]
    fn open_tampered_blob_fails() {
        let mut blob = seal(b"secret", "pass").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(open(&blob, "pass").is_err());
    }

    #[test]
    fn open_truncated_blob_fails() {
        assert!(open(&[0u8; 10], "pass").is_err());
    }

    #[test]
    fn raw_key_roundtrip() {
        let key = random_bytes(KEY_LEN).unwrap();
        let (nonce, ciphertext) = encrypt_with_key(b"payload", &key).unwrap();
        let plaintext = decrypt_with_key(&nonce, &ciphertext, &key).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn wrong_key_length_rejected() {
        assert!(encrypt_with_key(b"x", &[0u8; 16]).is_err());
    }

    #[test]
    fn derive_key_deterministic() {
        let salt = [7u8; SALT_LEN];
        assert_eq!(derive_key("p", &salt), derive_key("p", &salt));
        assert_ne!(derive_key("p", &salt), derive_key("q", &salt));
    }
}
