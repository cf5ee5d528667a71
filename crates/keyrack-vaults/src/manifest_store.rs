//! Encrypted, multi-recipient persistence for the host manifest.
//!
//! The manifest is serialized to JSON and encrypted under a random 256-bit
//! data key; the data key is wrapped once per trusted recipient under a
//! KEK derived from that recipient's passphrase.  Any listed recipient can
//! therefore decrypt the single file -- a person and a CI identity can share
//! one manifest without per-recipient encrypted copies, and adding a
//! recipient only rewraps the data key.
//!
//! File layout (JSON envelope, binary fields base64):
//!
//! ```json
//! {
//!   "version": 1,
//!   "recipients": [
//!     { "id": "alice", "salt": "...", "nonce": "...", "wrapped_key": "..." }
//!   ],
//!   "nonce": "...",
//!   "ciphertext": "..."
//! }
//! ```

use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keyrack_core::error::{Error, Result};
use keyrack_core::manifest::HostManifest;

use crate::crypto;

/// One identity that may decrypt the manifest.
#[derive(Debug, Clone)]
pub struct RecipientIdentity {
    pub id: String,
    pub passphrase: String,
}

impl RecipientIdentity {
    pub fn new(id: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            passphrase: passphrase.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecipientWrap {
    id: String,
    salt: String,
    nonce: String,
    wrapped_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    recipients: Vec<RecipientWrap>,
    nonce: String,
    ciphertext: String,
}

const ENVELOPE_VERSION: u32 = 1;

/// Encrypted key-value store holding exactly one [`HostManifest`].
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Store persisting to `path` (conventionally `hosts.enc` in the keyrack
    /// data directory).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Decrypt and return the manifest, or `None` if no manifest exists yet.
    ///
    /// # Errors
    ///
    /// [`Error::Crypto`] when the identity matches no recipient wrap (wrong
    /// passphrase or unknown id), [`Error::ManifestCorrupt`] on a damaged
    /// envelope.
    pub async fn load(&self, identity: &RecipientIdentity) -> Result<Option<HostManifest>> {
        let Some(envelope) = self.read_envelope().await? else {
            return Ok(None);
        };
        let data_key = unwrap_data_key(&envelope, identity)?;

        let nonce = decode_nonce(&envelope.nonce)?;
        let ciphertext = decode(&envelope.ciphertext)?;
        let plaintext = crypto::decrypt_with_key(&nonce, &ciphertext, &data_key)?;

        let manifest = serde_json::from_slice(&plaintext).map_err(|e| Error::ManifestCorrupt {
            reason: format!("manifest payload: {e}"),
        })?;
        debug!(recipient = %identity.id, "decrypted host manifest");
        Ok(Some(manifest))
    }

    /// Encrypt and persist the manifest.
    ///
    /// When an envelope already exists the data key is reused so every
    /// existing recipient wrap stays valid; otherwise a fresh data key is
    /// generated and wrapped for `identity`.
    pub async fn save(&self, manifest: &HostManifest, identity: &RecipientIdentity) -> Result<()> {
        let (data_key, recipients) = match self.read_envelope().await? {
            Some(envelope) => {
                let key = unwrap_data_key(&envelope, identity)?;
                (key, envelope.recipients)
            }
            None => {
                let key_bytes = crypto::random_bytes(crypto::KEY_LEN)?;
                let mut key = [0u8; crypto::KEY_LEN];
                key.copy_from_slice(&key_bytes);
                let wrap = wrap_data_key(&key, identity)?;
                (key, vec![wrap])
            }
        };

        self.write_envelope(manifest, &data_key, recipients).await
    }

    /// Wrap the data key for an additional recipient and record it in the
    /// manifest's recipient list.  `identity` must already be a recipient.
    pub async fn add_recipient(
        &self,
        identity: &RecipientIdentity,
        new: &RecipientIdentity,
    ) -> Result<()> {
        let envelope = self.read_envelope().await?.ok_or_else(|| Error::ManifestCorrupt {
            reason: "cannot add a recipient before the manifest exists".into(),
        })?;
        let data_key = unwrap_data_key(&envelope, identity)?;

        let mut manifest = self
            .load(identity)
            .await?
            .unwrap_or_default();
        if !manifest.recipients.contains(&new.id) {
            manifest.recipients.push(new.id.clone());
        }

        let mut recipients: Vec<RecipientWrap> = envelope
            .recipients
            .into_iter()
            .filter(|r| r.id != new.id)
            .collect();
        recipients.push(wrap_data_key(&data_key, new)?);

        self.write_envelope(&manifest, &data_key, recipients).await?;
        info!(recipient = %new.id, "added manifest recipient");
        Ok(())
    }

    async fn read_envelope(&self) -> Result<Option<Envelope>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| Error::ManifestCorrupt {
                    reason: format!("{}: {e}", self.path.display()),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_envelope(
        &self,
        manifest: &HostManifest,
        data_key: &[u8; crypto::KEY_LEN],
        recipients: Vec<RecipientWrap>,
    ) -> Result<()> {
        let plaintext = serde_json::to_vec(manifest)?;
        let (nonce, ciphertext) = crypto::encrypt_with_key(&plaintext, data_key)?;

        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            recipients,
            nonce: B64.encode(nonce),
            ciphertext: B64.encode(ciphertext),
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&envelope)?).await?;
        Ok(())
    }
}

fn wrap_data_key(
    data_key: &[u8; crypto::KEY_LEN],
    recipient: &RecipientIdentity,
) -> Result<RecipientWrap> {
    let salt = crypto::random_bytes(crypto::SALT_LEN)?;
    let kek = crypto::derive_key(&recipient.passphrase, &salt);
    let (nonce, wrapped) = crypto::encrypt_with_key(data_key, &kek)?;
    Ok(RecipientWrap {
        id: recipient.id.clone(),
        salt: B64.encode(salt),
        nonce: B64.encode(nonce),
        wrapped_key: B64.encode(wrapped),
    })
}

/// Try the wrap whose id matches first, then every other wrap, so a renamed
/// identity with the right passphrase still gets in.
fn unwrap_data_key(
    envelope: &Envelope,
    identity: &RecipientIdentity,
) -> Result<[u8; crypto::KEY_LEN]> {
    let mut ordered: Vec<&RecipientWrap> = envelope.recipients.iter().collect();
    ordered.sort_by_key(|r| r.id != identity.id);

    for wrap in ordered {
        let salt = decode(&wrap.salt)?;
        let nonce = decode_nonce(&wrap.nonce)?;
        let wrapped = decode(&wrap.wrapped_key)?;
        let kek = crypto::derive_key(&identity.passphrase, &salt);

        if let Ok(key) = crypto::decrypt_with_key(&nonce, &wrapped, &kek) {
            if key.len() == crypto::KEY_LEN {
                let mut out = [0u8; crypto::KEY_LEN];
                out.copy_from_slice(&key);
                return Ok(out);
            }
        }
    }

    Err(Error::Crypto {
        reason: format!("no recipient wrap matches identity {:?}", identity.id),
    })
}

fn decode(field: &str) -> Result<Vec<u8>> {
    B64.decode(field).map_err(|e| Error::ManifestCorrupt {
        reason: format!("bad base64 in envelope: {e}"),
    })
}

fn decode_nonce(field: &str) -> Result<[u8; crypto::NONCE_LEN_BYTES]> {
    let bytes = decode(field)?;
    bytes.try_into().map_err(|_| Error::ManifestCorrupt {
        reason: "nonce has wrong length".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrack_core::kinds::{MechanismKind, VaultKind};
    use keyrack_core::slug::KeySlug;

    fn sample_manifest(recipient: &str) -> HostManifest {
        let mut manifest = HostManifest {
            recipients: vec![recipient.to_string()],
            ..Default::default()
        };
        manifest.findsert(
            &KeySlug::parse("acme.prod.API_KEY").unwrap(),
            VaultKind::OsSecure,
            MechanismKind::PermanentViaReplica,
            None,
        );
        manifest
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hosts.enc"));
        let alice = RecipientIdentity::new("alice", "pw-a");
        assert!(store.load(&alice).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hosts.enc"));
        let alice = RecipientIdentity::new("alice", "pw-a");

        store.save(&sample_manifest("alice"), &alice).await.unwrap();
        let loaded = store.load(&alice).await.unwrap().unwrap();
        assert_eq!(loaded.hosts.len(), 1);
        assert!(loaded.hosts.contains_key("acme.prod.API_KEY"));
    }

    #[tokio::test]
    async fn wrong_passphrase_cannot_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hosts.enc"));
        let alice = RecipientIdentity::new("alice", "pw-a");
        store.save(&sample_manifest("alice"), &alice).await.unwrap();

        let intruder = RecipientIdentity::new("alice", "wrong");
        assert!(matches!(
            store.load(&intruder).await.unwrap_err(),
            Error::Crypto { .. }
        ));
    }

    #[tokio::test]
    async fn second_recipient_can_decrypt_after_rewrap() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hosts.enc"));
        let alice = RecipientIdentity::new("alice", "pw-a");
        let ci = RecipientIdentity::new("ci", "pw-ci");

        store.save(&sample_manifest("alice"), &alice).await.unwrap();
        store.add_recipient(&alice, &ci).await.unwrap();

        let via_ci = store.load(&ci).await.unwrap().unwrap();
        assert!(via_ci.recipients.contains(&"ci".to_string()));
        assert_eq!(via_ci.hosts.len(), 1);

        // The original identity still works.
        assert!(store.load(&alice).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_by_one_recipient_stays_readable_by_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("hosts.enc"));
        let alice = RecipientIdentity::new("alice", "pw-a");
        let ci = RecipientIdentity::new("ci", "pw-ci");

        store.save(&sample_manifest("alice"), &alice).await.unwrap();
        store.add_recipient(&alice, &ci).await.unwrap();

        // CI updates the manifest; alice must still be able to read it.
        let mut manifest = store.load(&ci).await.unwrap().unwrap();
        manifest.findsert(
            &KeySlug::parse("acme.prod.SECOND").unwrap(),
            VaultKind::OsDirect,
            MechanismKind::PermanentViaReplica,
            None,
        );
        store.save(&manifest, &ci).await.unwrap();

        let via_alice = store.load(&alice).await.unwrap().unwrap();
        assert_eq!(via_alice.hosts.len(), 2);
    }
}
