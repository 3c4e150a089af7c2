//! Versioned cipher keys.
//!
//! # States
//! - Active: the single version used for new encryptions
//! - ReadOnly: older versions kept to decrypt historical ciphertexts
//!
//! ```text
//! rotate(v2):  v1 Active  → v1 ReadOnly, v2 Active
//! purge(v1):   v1 ReadOnly → removed (after migration is confirmed)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use zeroize::Zeroizing;

use crate::config::secrets::{CipherKey, CIPHER_KEY_LEN};
use crate::config::KeyMaterial;
use crate::crypto::cipher::CipherError;

/// Usage state of one key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Active,
    ReadOnly,
}

/// Immutable snapshot of all key versions. Rotation builds a new ring.
#[derive(Clone)]
pub struct KeyRing {
    keys: BTreeMap<u32, CipherKey>,
    active: u32,
}

impl KeyRing {
    pub fn from_material(material: &KeyMaterial) -> Self {
        let keys = material
            .cipher_keys()
            .map(|(version, key)| (version, Zeroizing::new(*key)))
            .collect();
        Self {
            keys,
            active: material.active_cipher_version(),
        }
    }

    pub fn active_version(&self) -> u32 {
        self.active
    }

    /// Key for encryption; only the active version qualifies.
    pub fn encryption_key(&self, version: u32) -> Result<&[u8; CIPHER_KEY_LEN], CipherError> {
        let key = self
            .keys
            .get(&version)
            .ok_or(CipherError::UnknownKeyVersion(version))?;
        if version != self.active {
            return Err(CipherError::ReadOnlyKey(version));
        }
        Ok(&**key)
    }

    /// Key for decryption; any retained version qualifies.
    pub fn decryption_key(&self, version: u32) -> Option<&[u8; CIPHER_KEY_LEN]> {
        self.keys.get(&version).map(|key| &**key)
    }

    /// New ring with `version` active and the previous active version read-only.
    pub fn rotated(&self, version: u32, key: [u8; CIPHER_KEY_LEN]) -> Result<Self, CipherError> {
        let key = Zeroizing::new(key);
        if self.keys.contains_key(&version) {
            return Err(CipherError::DuplicateKeyVersion(version));
        }
        let mut next = self.clone();
        next.keys.insert(version, key);
        next.active = version;
        Ok(next)
    }

    /// New ring without `version`. The active key cannot be purged.
    pub fn purged(&self, version: u32) -> Result<Self, CipherError> {
        if version == self.active {
            return Err(CipherError::ActiveKey(version));
        }
        if !self.keys.contains_key(&version) {
            return Err(CipherError::UnknownKeyVersion(version));
        }
        let mut next = self.clone();
        next.keys.remove(&version);
        Ok(next)
    }

    pub fn versions(&self) -> Vec<(u32, KeyState)> {
        self.keys
            .keys()
            .map(|v| {
                let state = if *v == self.active {
                    KeyState::Active
                } else {
                    KeyState::ReadOnly
                };
                (*v, state)
            })
            .collect()
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("versions", &self.keys.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .finish()
    }
}
