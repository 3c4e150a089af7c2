//! Password hashing and verification.
//!
//! # Design Decisions
//! - Argon2id, per-call random salt, PHC string stores salt and cost
//! - `algorithm_version` names the configured cost profile; a credential
//!   hashed under another profile is re-hashed after its next successful login
//! - Verification is constant-time and never errors on mismatch
//! - Unknown users are verified against a decoy so both paths cost the same

use std::fmt;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use crate::config::CredentialConfig;
use crate::error::{ConfigurationFailure, ReasonCode, SecurityResult, ValidationError};
use crate::principal::UserId;
use crate::security::validator::validate_password_input;

pub const MIN_PASSWORD_LEN: usize = 8;

/// A stored password hash. The hash is irreversible.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user_id: UserId,
    password_hash: String,
    algorithm_version: u16,
}

impl Credential {
    /// Rebuild a credential read back from the user store.
    pub fn from_stored(user_id: UserId, password_hash: String, algorithm_version: u16) -> Self {
        Self {
            user_id,
            password_hash,
            algorithm_version,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn algorithm_version(&self) -> u16 {
        self.algorithm_version
    }

    /// PHC string for the user store to persist.
    pub fn stored_hash(&self) -> &str {
        &self.password_hash
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("password_hash", &"<redacted>")
            .field("algorithm_version", &self.algorithm_version)
            .finish()
    }
}

/// Result of a verification that may also upgrade the stored hash.
#[derive(Debug)]
pub enum VerifyOutcome {
    Rejected,
    Verified {
        /// Present when the credential was re-hashed under the current profile.
        upgraded: Option<Credential>,
    },
}

impl VerifyOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerifyOutcome::Verified { .. })
    }
}

/// Check the minimum password policy.
pub fn check_password_policy(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::WeakPassword(ReasonCode::TooShort));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::WeakPassword(ReasonCode::MissingDigit));
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(ValidationError::WeakPassword(ReasonCode::MissingUppercase));
    }
    Ok(())
}

/// Owns password hashing for every tenant.
pub struct CredentialManager {
    hasher: Argon2<'static>,
    algorithm_version: u16,
    decoy: Credential,
}

impl CredentialManager {
    pub fn new(config: &CredentialConfig) -> Result<Self, ConfigurationFailure> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| ConfigurationFailure::Invalid(format!("argon2 parameters: {}", e)))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let decoy_password: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let decoy_hash = hash_with(&hasher, &decoy_password)
            .map_err(|e| ConfigurationFailure::Invalid(format!("argon2 self-test: {}", e)))?;

        Ok(Self {
            hasher,
            algorithm_version: config.algorithm_version,
            decoy: Credential::from_stored(UserId::new(), decoy_hash, config.algorithm_version),
        })
    }

    pub fn algorithm_version(&self) -> u16 {
        self.algorithm_version
    }

    /// Hash a new password after enforcing the policy.
    pub fn hash(&self, user_id: UserId, password: &str) -> SecurityResult<Credential> {
        validate_password_input(password)?;
        check_password_policy(password)?;
        self.hash_unchecked(user_id, password)
    }

    /// Constant-time verification; any failure, including a malformed stored hash, is `false`.
    pub fn verify(&self, password: &str, credential: &Credential) -> bool {
        let Ok(parsed) = PasswordHash::new(&credential.password_hash) else {
            tracing::warn!(user_id = %credential.user_id, "Stored password hash is malformed");
            return false;
        };
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn the same work as a real verification for a user that does not exist.
    pub fn verify_decoy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.decoy);
        false
    }

    pub fn needs_rehash(&self, credential: &Credential) -> bool {
        credential.algorithm_version != self.algorithm_version
    }

    /// Verify and, on success, re-hash under the current cost profile if needed.
    pub fn verify_and_upgrade(&self, password: &str, credential: &Credential) -> VerifyOutcome {
        if !self.verify(password, credential) {
            return VerifyOutcome::Rejected;
        }
        if !self.needs_rehash(credential) {
            return VerifyOutcome::Verified { upgraded: None };
        }

        // The password predates the current profile; keep it even if it fails today's policy.
        match self.hash_unchecked(credential.user_id, password) {
            Ok(upgraded) => {
                tracing::info!(
                    user_id = %credential.user_id,
                    from_version = credential.algorithm_version,
                    to_version = self.algorithm_version,
                    "Credential re-hashed"
                );
                VerifyOutcome::Verified {
                    upgraded: Some(upgraded),
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %credential.user_id, error = %e, "Credential re-hash failed");
                VerifyOutcome::Verified { upgraded: None }
            }
        }
    }

    fn hash_unchecked(&self, user_id: UserId, password: &str) -> SecurityResult<Credential> {
        let password_hash = hash_with(&self.hasher, password)
            .map_err(|e| ConfigurationFailure::Invalid(format!("argon2: {}", e)))?;
        Ok(Credential {
            user_id,
            password_hash,
            algorithm_version: self.algorithm_version,
        })
    }
}

fn hash_with(hasher: &Argon2<'_>, password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(hasher.hash_password(password.as_bytes(), &salt)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityError;

    fn cheap(version: u16) -> CredentialConfig {
        CredentialConfig {
            algorithm_version: version,
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let manager = CredentialManager::new(&cheap(1)).unwrap();
        let user = UserId::new();
        let credential = manager.hash(user, "Correct1Horse").unwrap();

        assert_eq!(credential.user_id(), user);
        assert!(credential.stored_hash().starts_with("$argon2id$"));
        assert!(manager.verify("Correct1Horse", &credential));
        assert!(!manager.verify("Correct1Horsf", &credential));
        assert!(!manager.verify("", &credential));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let manager = CredentialManager::new(&cheap(1)).unwrap();
        let user = UserId::new();
        let a = manager.hash(user, "Same1Password").unwrap();
        let b = manager.hash(user, "Same1Password").unwrap();
        assert_ne!(a.stored_hash(), b.stored_hash());
        assert!(manager.verify("Same1Password", &a));
        assert!(manager.verify("Same1Password", &b));
    }

    #[test]
    fn test_policy_reasons() {
        let manager = CredentialManager::new(&cheap(1)).unwrap();
        let cases = [
            ("Sh0rt", ReasonCode::TooShort),
            ("NoDigitsHere", ReasonCode::MissingDigit),
            ("lowercase123", ReasonCode::MissingUppercase),
        ];
        for (password, reason) in cases {
            match manager.hash(UserId::new(), password) {
                Err(SecurityError::Validation(ValidationError::WeakPassword(r))) => assert_eq!(r, reason),
                other => panic!("expected weak password for {password}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_hash_never_panics() {
        let manager = CredentialManager::new(&cheap(1)).unwrap();
        let broken = Credential::from_stored(UserId::new(), "not-a-phc-string".into(), 1);
        assert!(!manager.verify("Anything1A", &broken));
    }

    #[test]
    fn test_lazy_rehash_on_version_change() {
        let old = CredentialManager::new(&cheap(1)).unwrap();
        let credential = old.hash(UserId::new(), "Upgrade1Me").unwrap();

        let mut next = cheap(2);
        next.iterations = 2;
        let current = CredentialManager::new(&next).unwrap();
        assert!(current.needs_rehash(&credential));

        // Wrong password: nothing happens.
        assert!(matches!(
            current.verify_and_upgrade("Wrong1Password", &credential),
            VerifyOutcome::Rejected
        ));

        match current.verify_and_upgrade("Upgrade1Me", &credential) {
            VerifyOutcome::Verified { upgraded: Some(upgraded) } => {
                assert_eq!(upgraded.algorithm_version(), 2);
                assert_eq!(upgraded.user_id(), credential.user_id());
                assert!(current.verify("Upgrade1Me", &upgraded));
                assert!(!current.needs_rehash(&upgraded));
            }
            other => panic!("expected upgraded credential, got {other:?}"),
        }
    }

    #[test]
    fn test_decoy_always_fails() {
        let manager = CredentialManager::new(&cheap(1)).unwrap();
        assert!(!manager.verify_decoy("Whatever123A"));
    }

    #[test]
    fn test_debug_redacts_hash() {
        let manager = CredentialManager::new(&cheap(1)).unwrap();
        let credential = manager.hash(UserId::new(), "Redact1This").unwrap();
        assert!(!format!("{credential:?}").contains("argon2"));
    }
}
