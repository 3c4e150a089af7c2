//! Field-level encryption of sensitive personal data.
//!
//! # Responsibilities
//! - Encrypt attribute values before the persistence layer writes them
//! - Decrypt them after read, failing closed on any integrity error
//! - Rotate, migrate and purge key versions
//!
//! # Design Decisions
//! - AES-256-GCM with a fresh random 96-bit nonce from the OS RNG per call
//! - The key version is bound as associated data, so relabelling fails authentication
//! - The key ring is swapped atomically; readers never block on rotation

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use arc_swap::ArcSwap;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::secrets::CIPHER_KEY_LEN;
use crate::config::KeyMaterial;
use crate::crypto::keyring::{KeyRing, KeyState};
use crate::error::{ConfigurationFailure, IntegrityFailure, ReasonCode, SecurityError, ValidationError};
use crate::observability::metrics;

pub const NONCE_LEN: usize = 12;
const AAD_PREFIX: &[u8] = b"csec.field.v";

/// Cipher failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Tag verification failed or the key version is not retained.
    #[error("decryption failed for key version {key_version}")]
    Decryption { key_version: u32 },

    #[error("unknown key version {0}")]
    UnknownKeyVersion(u32),

    #[error("key version {0} is read-only")]
    ReadOnlyKey(u32),

    #[error("key version {0} already exists")]
    DuplicateKeyVersion(u32),

    #[error("key version {0} is active and cannot be purged")]
    ActiveKey(u32),

    #[error("encryption failed")]
    Encryption,

    #[error("malformed encrypted field")]
    Malformed,
}

impl From<CipherError> for SecurityError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Decryption { key_version } => {
                IntegrityFailure::Decryption { key_version }.into()
            }
            CipherError::Malformed => {
                ValidationError::malformed("encrypted_field", ReasonCode::InvalidFormat).into()
            }
            CipherError::UnknownKeyVersion(v) => ConfigurationFailure::UnknownKeyVersion(v).into(),
            CipherError::ReadOnlyKey(v) => ConfigurationFailure::ReadOnlyKey(v).into(),
            other => ConfigurationFailure::Invalid(other.to_string()).into(),
        }
    }
}

/// One encrypted attribute value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "EncryptedFieldWire", try_from = "EncryptedFieldWire")]
pub struct EncryptedField {
    /// Ciphertext followed by the 16-byte GCM tag.
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub key_version: u32,
}

impl EncryptedField {
    /// Single-column form: `v<version>.<nonce>.<ciphertext>` (base64url).
    pub fn to_compact(&self) -> String {
        format!(
            "v{}.{}.{}",
            self.key_version,
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext)
        )
    }

    pub fn from_compact(encoded: &str) -> Result<Self, CipherError> {
        let mut parts = encoded.splitn(3, '.');
        let (Some(version), Some(nonce), Some(ciphertext)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CipherError::Malformed);
        };
        let key_version = version
            .strip_prefix('v')
            .and_then(|v| v.parse().ok())
            .ok_or(CipherError::Malformed)?;
        let nonce = URL_SAFE_NO_PAD
            .decode(nonce)
            .map_err(|_| CipherError::Malformed)?;
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|_| CipherError::Malformed)?;
        Ok(Self {
            nonce: nonce.as_slice().try_into().map_err(|_| CipherError::Malformed)?,
            ciphertext,
            key_version,
        })
    }
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedField")
            .field("key_version", &self.key_version)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct EncryptedFieldWire {
    key_version: u32,
    nonce: String,
    ciphertext: String,
}

impl From<EncryptedField> for EncryptedFieldWire {
    fn from(field: EncryptedField) -> Self {
        Self {
            key_version: field.key_version,
            nonce: BASE64.encode(field.nonce),
            ciphertext: BASE64.encode(&field.ciphertext),
        }
    }
}

impl TryFrom<EncryptedFieldWire> for EncryptedField {
    type Error = CipherError;

    fn try_from(wire: EncryptedFieldWire) -> Result<Self, Self::Error> {
        let nonce = BASE64.decode(wire.nonce).map_err(|_| CipherError::Malformed)?;
        Ok(Self {
            nonce: nonce.as_slice().try_into().map_err(|_| CipherError::Malformed)?,
            ciphertext: BASE64.decode(wire.ciphertext).map_err(|_| CipherError::Malformed)?,
            key_version: wire.key_version,
        })
    }
}

/// Authenticated symmetric encryption for sensitive fields.
pub struct CipherService {
    ring: ArcSwap<KeyRing>,
}

impl CipherService {
    pub fn new(material: &KeyMaterial) -> Self {
        let ring = KeyRing::from_material(material);
        tracing::info!(
            active_version = ring.active_version(),
            versions = ring.versions().len(),
            "Cipher key ring loaded"
        );
        Self {
            ring: ArcSwap::from_pointee(ring),
        }
    }

    pub fn active_version(&self) -> u32 {
        self.ring.load().active_version()
    }

    pub fn key_versions(&self) -> Vec<(u32, KeyState)> {
        self.ring.load().versions()
    }

    /// Encrypt under an explicit key version, which must be the active one.
    pub fn encrypt(&self, plaintext: &[u8], key_version: u32) -> Result<EncryptedField, CipherError> {
        let ring = self.ring.load();
        let key = ring.encryption_key(key_version)?;
        seal(key, key_version, plaintext)
    }

    /// Encrypt under the active key version.
    pub fn encrypt_active(&self, plaintext: &[u8]) -> Result<EncryptedField, CipherError> {
        let ring = self.ring.load();
        let version = ring.active_version();
        seal(ring.encryption_key(version)?, version, plaintext)
    }

    pub fn decrypt(&self, field: &EncryptedField) -> Result<Vec<u8>, CipherError> {
        let ring = self.ring.load();
        let result = match ring.decryption_key(field.key_version) {
            Some(key) => open(key, field),
            None => Err(CipherError::Decryption {
                key_version: field.key_version,
            }),
        };
        if result.is_err() {
            tracing::error!(key_version = field.key_version, "Field decryption failed integrity check");
            metrics::record_decrypt_failure();
        }
        result
    }

    pub fn encrypt_str(&self, plaintext: &str) -> Result<EncryptedField, CipherError> {
        self.encrypt_active(plaintext.as_bytes())
    }

    pub fn decrypt_str(&self, field: &EncryptedField) -> Result<String, CipherError> {
        let bytes = self.decrypt(field)?;
        String::from_utf8(bytes).map_err(|_| CipherError::Malformed)
    }

    /// Install a new active key; the previous active version becomes read-only.
    pub fn rotate(&self, version: u32, key: [u8; CIPHER_KEY_LEN]) -> Result<(), CipherError> {
        let current = self.ring.load_full();
        let next = current.rotated(version, key)?;
        let previous = self.ring.compare_and_swap(&current, Arc::new(next));
        if !Arc::ptr_eq(&*previous, &current) {
            // Lost a race with another rotation; the caller retries with fresh state.
            return Err(CipherError::DuplicateKeyVersion(version));
        }
        tracing::info!(
            active_version = version,
            previous_version = current.active_version(),
            "Cipher key rotated"
        );
        Ok(())
    }

    /// Re-encrypt a field under the active key, if it is not already.
    pub fn reencrypt(&self, field: &EncryptedField) -> Result<EncryptedField, CipherError> {
        if field.key_version == self.active_version() {
            return Ok(field.clone());
        }
        let plaintext = zeroize::Zeroizing::new(self.decrypt(field)?);
        self.encrypt_active(&plaintext)
    }

    /// Drop a read-only key once every ciphertext under it has been migrated.
    pub fn purge(&self, version: u32) -> Result<(), CipherError> {
        let current = self.ring.load_full();
        let next = current.purged(version)?;
        let previous = self.ring.compare_and_swap(&current, Arc::new(next));
        if !Arc::ptr_eq(&*previous, &current) {
            return Err(CipherError::UnknownKeyVersion(version));
        }
        tracing::info!(purged_version = version, "Cipher key purged");
        Ok(())
    }
}

fn aad(key_version: u32) -> Vec<u8> {
    let mut aad = AAD_PREFIX.to_vec();
    aad.extend_from_slice(&key_version.to_be_bytes());
    aad
}

fn seal(key: &[u8; CIPHER_KEY_LEN], key_version: u32, plaintext: &[u8]) -> Result<EncryptedField, CipherError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::Encryption)?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let aad = aad(key_version);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CipherError::Encryption)?;
    Ok(EncryptedField {
        ciphertext,
        nonce,
        key_version,
    })
}

fn open(key: &[u8; CIPHER_KEY_LEN], field: &EncryptedField) -> Result<Vec<u8>, CipherError> {
    let failure = CipherError::Decryption {
        key_version: field.key_version,
    };
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| failure.clone())?;
    let aad = aad(field.key_version);
    cipher
        .decrypt(
            Nonce::from_slice(&field.nonce),
            Payload {
                msg: &field.ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| failure)
}
