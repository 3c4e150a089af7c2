//! Signed session tokens.
//!
//! # Responsibilities
//! - Issue access and refresh tokens for a `TenantPrincipal`
//! - Validate access tokens: signature, then expiry, then revocation
//! - Single-use refresh rotation with reuse detection
//!
//! # Design Decisions
//! - HS256 with a process-wide secret from `KeyMaterial`
//! - Expiry is checked against the injected clock, never the library's
//! - Every token descends from a login "family"; reuse of a rotated-out
//!   refresh token revokes the whole family
//!
//! ```text
//! Issued → Valid → Expired
//!                → Revoked
//! ```

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::revocation::{RevocationReason, RevocationSet};
use crate::clock::Clock;
use crate::config::{KeyMaterial, TokenConfig};
use crate::error::{AuthFailure, ConfigurationFailure, SecurityResult};
use crate::observability::metrics;
use crate::principal::{Role, TenantId, TenantPrincipal, UserId};
use crate::security::validator::validate_token_shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    jti: Uuid,
    sub: UserId,
    tid: TenantId,
    role: Role,
    kind: TokenKind,
    fam: Uuid,
    iss: String,
    iat: u64,
    exp: u64,
}

impl Claims {
    fn principal(&self) -> TenantPrincipal {
        TenantPrincipal::new(self.tid, self.sub, self.role)
    }
}

/// An issued token. The signature travels inside `encoded`.
#[derive(Clone)]
pub struct SessionToken {
    id: Uuid,
    family: Uuid,
    subject: TenantPrincipal,
    issued_at: u64,
    expires_at: u64,
    kind: TokenKind,
    encoded: String,
}

impl SessionToken {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn family(&self) -> Uuid {
        self.family
    }

    pub fn subject(&self) -> &TenantPrincipal {
        &self.subject
    }

    /// Unix seconds.
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// Unix seconds.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Compact wire form handed to the client.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn lifetime_secs(&self) -> u64 {
        self.expires_at.saturating_sub(self.issued_at)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .field("kind", &self.kind)
            .field("expires_at", &self.expires_at)
            .field("encoded", &"<redacted>")
            .finish()
    }
}

/// Access and refresh token from the same family.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: SessionToken,
    pub refresh: SessionToken,
}

pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
    revoked: RevocationSet,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(config: &TokenConfig, keys: &KeyMaterial, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(keys.signing_secret()),
            decoding: DecodingKey::from_secret(keys.signing_secret()),
            validation,
            issuer: config.issuer.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            revoked: RevocationSet::new(),
            clock,
        }
    }

    /// Issue a single token starting a new family.
    pub fn issue(&self, principal: &TenantPrincipal, kind: TokenKind) -> SecurityResult<SessionToken> {
        self.issue_in_family(principal, kind, Uuid::new_v4())
    }

    /// Issue an access/refresh pair for a fresh login.
    pub fn issue_pair(&self, principal: &TenantPrincipal) -> SecurityResult<TokenPair> {
        self.pair_in_family(principal, Uuid::new_v4())
    }

    /// Validate an access token and return its principal.
    pub fn validate(&self, token: &str) -> Result<TenantPrincipal, AuthFailure> {
        let claims = self.decode(token)?;
        self.check_expiry(&claims)?;
        if claims.kind != TokenKind::Access {
            tracing::warn!(token_id = %claims.jti, "Refresh token presented as access token");
            return Err(AuthFailure::TokenInvalid);
        }
        if self.revoked.is_family_revoked(&claims.fam) || self.revoked.token_status(&claims.jti).is_some() {
            return Err(AuthFailure::TokenRevoked);
        }
        Ok(claims.principal())
    }

    /// Exchange a refresh token for a new pair. The presented token is consumed.
    ///
    /// A second use fails with `RefreshTokenReused` and revokes the family.
    pub fn refresh(&self, refresh_token: &str) -> SecurityResult<TokenPair> {
        let claims = self.decode(refresh_token)?;
        self.check_expiry(&claims)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AuthFailure::TokenInvalid.into());
        }
        if self.revoked.is_family_revoked(&claims.fam) {
            return Err(AuthFailure::TokenRevoked.into());
        }

        match self.revoked.claim_rotation(claims.jti, claims.exp) {
            Ok(()) => {}
            Err(RevocationReason::Revoked) => return Err(AuthFailure::TokenRevoked.into()),
            Err(RevocationReason::Rotated) => {
                self.revoke_family_id(claims.fam);
                tracing::warn!(
                    tenant_id = %claims.tid,
                    user_id = %claims.sub,
                    token_id = %claims.jti,
                    "Refresh token reuse detected, family revoked"
                );
                return Err(AuthFailure::RefreshTokenReused.into());
            }
        }

        let pair = self.pair_in_family(&claims.principal(), claims.fam)?;
        metrics::record_revoked_tokens(self.revoked.len());
        Ok(pair)
    }

    /// Revoke one token until its own expiry. Expired tokens need no entry.
    pub fn revoke(&self, token: &str) -> Result<(), AuthFailure> {
        let claims = self.decode(token)?;
        if self.clock.now_secs() < claims.exp {
            self.revoked.revoke(claims.jti, claims.exp);
            metrics::record_revoked_tokens(self.revoked.len());
        }
        Ok(())
    }

    /// Revoke every token descending from the same login as `token`.
    pub fn revoke_family(&self, token: &str) -> Result<(), AuthFailure> {
        let claims = self.decode(token)?;
        self.revoke_family_id(claims.fam);
        Ok(())
    }

    /// Signature-checked subject of a token, ignoring expiry and revocation.
    ///
    /// For attributing audit records of failed refreshes only.
    pub fn subject_of(&self, token: &str) -> Option<TenantPrincipal> {
        self.decode(token).ok().map(|claims| claims.principal())
    }

    /// Drop revocation entries whose tokens have expired.
    pub fn purge_expired(&self) -> usize {
        let removed = self.revoked.purge_expired(self.clock.now_secs());
        metrics::record_revoked_tokens(self.revoked.len());
        removed
    }

    pub fn revoked_entries(&self) -> usize {
        self.revoked.len()
    }

    fn revoke_family_id(&self, family: Uuid) {
        let until = self
            .clock
            .now_secs()
            .saturating_add(self.access_ttl_secs.max(self.refresh_ttl_secs));
        self.revoked.revoke_family(family, until);
        metrics::record_revoked_tokens(self.revoked.len());
    }

    fn pair_in_family(&self, principal: &TenantPrincipal, family: Uuid) -> SecurityResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue_in_family(principal, TokenKind::Access, family)?,
            refresh: self.issue_in_family(principal, TokenKind::Refresh, family)?,
        })
    }

    fn issue_in_family(
        &self,
        principal: &TenantPrincipal,
        kind: TokenKind,
        family: Uuid,
    ) -> SecurityResult<SessionToken> {
        let issued_at = self.clock.now_secs();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            jti: Uuid::new_v4(),
            sub: principal.user_id(),
            tid: principal.tenant_id(),
            role: principal.role(),
            kind,
            fam: family,
            iss: self.issuer.clone(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl),
        };

        let encoded = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ConfigurationFailure::Invalid(format!("token signing: {}", e)))?;

        Ok(SessionToken {
            id: claims.jti,
            family,
            subject: principal.clone(),
            issued_at,
            expires_at: claims.exp,
            kind,
            encoded,
        })
    }

    fn decode(&self, token: &str) -> Result<Claims, AuthFailure> {
        validate_token_shape(token).map_err(|_| AuthFailure::TokenInvalid)?;
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AuthFailure::TokenInvalid
            })
    }

    fn check_expiry(&self, claims: &Claims) -> Result<(), AuthFailure> {
        if self.clock.now_secs() >= claims.exp {
            return Err(AuthFailure::TokenExpired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::SecurityError;

    const START_MS: u64 = 1_700_000_000_000;

    fn keys(secret: u8) -> KeyMaterial {
        KeyMaterial::new(vec![secret; 32], BTreeMap::from([(1, [1u8; 32])]), 1).unwrap()
    }

    fn manager() -> (TokenManager, ManualClock) {
        let clock = ManualClock::new(START_MS);
        let config = TokenConfig {
            issuer: "test-issuer".into(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 86_400,
        };
        (TokenManager::new(&config, &keys(7), Arc::new(clock.clone())), clock)
    }

    fn principal() -> TenantPrincipal {
        TenantPrincipal::new(TenantId::new(), UserId::new(), Role::Editor)
    }

    #[test]
    fn test_issue_and_validate() {
        let (tokens, _) = manager();
        let who = principal();
        let token = tokens.issue(&who, TokenKind::Access).unwrap();

        assert_eq!(token.kind(), TokenKind::Access);
        assert_eq!(token.lifetime_secs(), 900);
        assert_eq!(tokens.validate(token.encoded()).unwrap(), who);
    }

    #[test]
    fn test_oversized_lifetime_saturates_instead_of_wrapping() {
        let clock = ManualClock::new(START_MS);
        let config = TokenConfig {
            issuer: "test-issuer".into(),
            access_ttl_secs: u64::MAX,
            refresh_ttl_secs: u64::MAX,
        };
        let tokens = TokenManager::new(&config, &keys(7), Arc::new(clock));
        let token = tokens.issue(&principal(), TokenKind::Access).unwrap();

        assert_eq!(token.expires_at(), u64::MAX);
        assert!(token.expires_at() > token.issued_at());
    }

    #[test]
    fn test_expired_rejected_even_with_valid_signature() {
        let (tokens, clock) = manager();
        let token = tokens.issue(&principal(), TokenKind::Access).unwrap();

        clock.advance_secs(899);
        assert!(tokens.validate(token.encoded()).is_ok());
        clock.advance_secs(1);
        assert_eq!(tokens.validate(token.encoded()), Err(AuthFailure::TokenExpired));
    }

    #[test]
    fn test_foreign_signature_invalid() {
        let (tokens, clock) = manager();
        let config = TokenConfig {
            issuer: "test-issuer".into(),
            ..TokenConfig::default()
        };
        let other = TokenManager::new(&config, &keys(8), Arc::new(clock));
        let forged = other.issue(&principal(), TokenKind::Access).unwrap();
        assert_eq!(tokens.validate(forged.encoded()), Err(AuthFailure::TokenInvalid));
        assert_eq!(tokens.validate("garbage"), Err(AuthFailure::TokenInvalid));
    }

    #[test]
    fn test_refresh_token_not_valid_for_requests() {
        let (tokens, _) = manager();
        let pair = tokens.issue_pair(&principal()).unwrap();
        assert_eq!(tokens.validate(pair.refresh.encoded()), Err(AuthFailure::TokenInvalid));
    }

    #[test]
    fn test_revoked_before_expiry() {
        let (tokens, _) = manager();
        let token = tokens.issue(&principal(), TokenKind::Access).unwrap();
        tokens.revoke(token.encoded()).unwrap();
        assert_eq!(tokens.validate(token.encoded()), Err(AuthFailure::TokenRevoked));
    }

    #[test]
    fn test_refresh_is_single_use_and_reuse_kills_family() {
        let (tokens, _) = manager();
        let who = principal();
        let first = tokens.issue_pair(&who).unwrap();

        let second = tokens.refresh(first.refresh.encoded()).unwrap();
        assert_eq!(second.access.family(), first.access.family());
        assert_eq!(tokens.validate(second.access.encoded()).unwrap(), who);

        match tokens.refresh(first.refresh.encoded()) {
            Err(SecurityError::Auth(AuthFailure::RefreshTokenReused)) => {}
            other => panic!("expected reuse detection, got {other:?}"),
        }

        // Everything from that login is now dead, including the legitimately rotated pair.
        assert_eq!(tokens.validate(second.access.encoded()), Err(AuthFailure::TokenRevoked));
        assert!(matches!(
            tokens.refresh(second.refresh.encoded()),
            Err(SecurityError::Auth(AuthFailure::TokenRevoked))
        ));
    }

    #[test]
    fn test_access_token_cannot_refresh() {
        let (tokens, _) = manager();
        let pair = tokens.issue_pair(&principal()).unwrap();
        assert!(matches!(
            tokens.refresh(pair.access.encoded()),
            Err(SecurityError::Auth(AuthFailure::TokenInvalid))
        ));
    }

    #[test]
    fn test_revocation_entries_expire_with_token() {
        let (tokens, clock) = manager();
        let token = tokens.issue(&principal(), TokenKind::Access).unwrap();
        tokens.revoke(token.encoded()).unwrap();
        assert_eq!(tokens.revoked_entries(), 1);

        clock.advance_secs(900);
        assert_eq!(tokens.purge_expired(), 1);
        assert_eq!(tokens.revoked_entries(), 0);
        // Still unusable: expiry is terminal.
        assert_eq!(tokens.validate(token.encoded()), Err(AuthFailure::TokenExpired));
    }

    #[test]
    fn test_subject_of_ignores_expiry() {
        let (tokens, clock) = manager();
        let who = principal();
        let token = tokens.issue(&who, TokenKind::Refresh).unwrap();
        clock.advance_secs(100_000);
        assert_eq!(tokens.subject_of(token.encoded()), Some(who));
        assert_eq!(tokens.subject_of("a.b.c"), None);
    }

    #[test]
    fn test_debug_redacts_encoded() {
        let (tokens, _) = manager();
        let token = tokens.issue(&principal(), TokenKind::Access).unwrap();
        assert!(!format!("{token:?}").contains(token.encoded()));
    }
}
