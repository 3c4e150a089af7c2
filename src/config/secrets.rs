//! Process-wide key material.
//!
//! # Security
//! - Secrets are loaded ONLY from environment variables, once at startup
//! - Secrets are never logged or serialized (`Debug` is redacted)
//! - All buffers are zeroized when the `KeyMaterial` is dropped

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::ConfigurationFailure;

/// HMAC secret for session token signatures (base64).
pub const SIGNING_SECRET_ENV: &str = "CSEC_SIGNING_SECRET";
/// Cipher key set: `<version>:<base64 key>` entries separated by commas.
pub const CIPHER_KEYS_ENV: &str = "CSEC_CIPHER_KEYS";
/// Version of the key used for new encryptions.
pub const CIPHER_ACTIVE_VERSION_ENV: &str = "CSEC_CIPHER_ACTIVE_VERSION";
/// Bearer key for the operator API.
pub const ADMIN_API_KEY_ENV: &str = "CSEC_ADMIN_API_KEY";

pub const MIN_SIGNING_SECRET_LEN: usize = 32;
pub const CIPHER_KEY_LEN: usize = 32;
const MIN_ADMIN_KEY_LEN: usize = 16;

/// A 256-bit cipher key.
pub type CipherKey = Zeroizing<[u8; CIPHER_KEY_LEN]>;

/// Secrets handed to component constructors at startup.
pub struct KeyMaterial {
    signing_secret: Zeroizing<Vec<u8>>,
    cipher_keys: BTreeMap<u32, CipherKey>,
    active_cipher_version: u32,
    admin_api_key: Option<Zeroizing<String>>,
}

impl KeyMaterial {
    /// Assemble key material, checking sizes and the active version.
    pub fn new(
        signing_secret: Vec<u8>,
        cipher_keys: BTreeMap<u32, [u8; CIPHER_KEY_LEN]>,
        active_cipher_version: u32,
    ) -> Result<Self, ConfigurationFailure> {
        let cipher_keys = cipher_keys
            .into_iter()
            .map(|(version, key)| (version, Zeroizing::new(key)))
            .collect();
        Self::from_parts(Zeroizing::new(signing_secret), cipher_keys, active_cipher_version)
    }

    fn from_parts(
        signing_secret: Zeroizing<Vec<u8>>,
        cipher_keys: BTreeMap<u32, CipherKey>,
        active_cipher_version: u32,
    ) -> Result<Self, ConfigurationFailure> {
        if signing_secret.len() < MIN_SIGNING_SECRET_LEN {
            return Err(ConfigurationFailure::InvalidSecret {
                name: SIGNING_SECRET_ENV,
                reason: format!("must be at least {} bytes", MIN_SIGNING_SECRET_LEN),
            });
        }
        if cipher_keys.is_empty() {
            return Err(ConfigurationFailure::MissingSecret(CIPHER_KEYS_ENV));
        }
        if !cipher_keys.contains_key(&active_cipher_version) {
            return Err(ConfigurationFailure::UnknownKeyVersion(active_cipher_version));
        }

        Ok(Self {
            signing_secret,
            cipher_keys,
            active_cipher_version,
            admin_api_key: None,
        })
    }

    /// Attach the operator API key.
    pub fn with_admin_api_key(mut self, key: String) -> Result<Self, ConfigurationFailure> {
        let key = Zeroizing::new(key);
        if key.len() < MIN_ADMIN_KEY_LEN {
            return Err(ConfigurationFailure::InvalidSecret {
                name: ADMIN_API_KEY_ENV,
                reason: format!("must be at least {} characters", MIN_ADMIN_KEY_LEN),
            });
        }
        self.admin_api_key = Some(key);
        Ok(self)
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationFailure> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationFailure>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signing_b64 = Zeroizing::new(
            lookup(SIGNING_SECRET_ENV).ok_or(ConfigurationFailure::MissingSecret(SIGNING_SECRET_ENV))?,
        );
        let signing_secret = Zeroizing::new(
            BASE64
                .decode(signing_b64.trim())
                .map_err(|e| invalid(SIGNING_SECRET_ENV, e.to_string()))?,
        );

        let encoded_keys = Zeroizing::new(
            lookup(CIPHER_KEYS_ENV).ok_or(ConfigurationFailure::MissingSecret(CIPHER_KEYS_ENV))?,
        );
        let cipher_keys = parse_cipher_keys(&encoded_keys)?;

        let active = lookup(CIPHER_ACTIVE_VERSION_ENV)
            .ok_or(ConfigurationFailure::MissingSecret(CIPHER_ACTIVE_VERSION_ENV))?;
        let active: u32 = active
            .trim()
            .parse()
            .map_err(|_| invalid(CIPHER_ACTIVE_VERSION_ENV, "not an integer".into()))?;

        let material = Self::from_parts(signing_secret, cipher_keys, active)?;
        match lookup(ADMIN_API_KEY_ENV) {
            Some(key) => material.with_admin_api_key(key),
            None => Ok(material),
        }
    }

    pub fn signing_secret(&self) -> &[u8] {
        &self.signing_secret
    }

    pub fn cipher_keys(&self) -> impl Iterator<Item = (u32, &[u8; CIPHER_KEY_LEN])> {
        self.cipher_keys.iter().map(|(version, key)| (*version, &**key))
    }

    pub fn active_cipher_version(&self) -> u32 {
        self.active_cipher_version
    }

    pub fn admin_api_key(&self) -> Option<&str> {
        self.admin_api_key.as_deref().map(String::as_str)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("signing_secret", &"<redacted>")
            .field("cipher_versions", &self.cipher_keys.keys().collect::<Vec<_>>())
            .field("active_cipher_version", &self.active_cipher_version)
            .field("admin_api_key", &self.admin_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Generate a fresh random 256-bit key.
pub fn generate_key() -> [u8; CIPHER_KEY_LEN] {
    let mut key = [0u8; CIPHER_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

fn parse_cipher_keys(encoded: &str) -> Result<BTreeMap<u32, CipherKey>, ConfigurationFailure> {
    let mut keys = BTreeMap::new();
    for entry in encoded.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (version, encoded) = entry
            .split_once(':')
            .ok_or_else(|| invalid(CIPHER_KEYS_ENV, "expected <version>:<base64 key>".into()))?;
        let version: u32 = version
            .trim()
            .parse()
            .map_err(|_| invalid(CIPHER_KEYS_ENV, "key version is not an integer".into()))?;
        let raw = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| invalid(CIPHER_KEYS_ENV, e.to_string()))?,
        );
        if raw.len() != CIPHER_KEY_LEN {
            return Err(invalid(
                CIPHER_KEYS_ENV,
                format!("key version {} must be {} bytes", version, CIPHER_KEY_LEN),
            ));
        }
        let mut key: CipherKey = Zeroizing::new([0u8; CIPHER_KEY_LEN]);
        key.copy_from_slice(&raw);
        if keys.insert(version, key).is_some() {
            return Err(invalid(
                CIPHER_KEYS_ENV,
                format!("duplicate key version {}", version),
            ));
        }
    }
    Ok(keys)
}

fn invalid(name: &'static str, reason: String) -> ConfigurationFailure {
    ConfigurationFailure::InvalidSecret { name, reason }
}
