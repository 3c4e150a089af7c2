//! Authentication flows.
//!
//! # Data Flow
//! ```text
//! login / refresh / password change:
//!     → rate_limit (deny before any credential work)
//!     → validator
//!     → credentials (blocking pool)
//!     → tokens
//!     → audit (acknowledged before the flow returns)
//! ```
//!
//! # Design Decisions
//! - Callers see one generic failure for unknown user and wrong password
//! - Argon2 and audit appends run on the blocking pool
//! - Refresh-token reuse is audited as a possible compromise

use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::audit::{AuditAction, AuditEvent, AuditLogger, AuditRecord};
use crate::auth::credentials::{CredentialManager, VerifyOutcome};
use crate::auth::directory::{UserAccount, UserDirectory};
use crate::auth::tokens::{TokenManager, TokenPair};
use crate::error::{AuthFailure, SecurityError, SecurityResult};
use crate::observability::metrics;
use crate::principal::{Role, TenantId, TenantPrincipal, UserId};
use crate::security::validator::{
    sanitize_text, validate_password_input, validate_token_shape, validate_username,
};
use crate::security::{RateLimiter, RouteClass};

const USER_ENTITY: &str = "user";
const SESSION_ENTITY: &str = "session";
const UNKNOWN_USER_ENTITY: &str = "unknown_user";

pub struct AuthService {
    limiter: Arc<RateLimiter>,
    credentials: Arc<CredentialManager>,
    tokens: Arc<TokenManager>,
    audit: Arc<AuditLogger>,
    directory: Arc<dyn UserDirectory>,
}

impl AuthService {
    pub fn new(
        limiter: Arc<RateLimiter>,
        credentials: Arc<CredentialManager>,
        tokens: Arc<TokenManager>,
        audit: Arc<AuditLogger>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            limiter,
            credentials,
            tokens,
            audit,
            directory,
        }
    }

    /// Exchange a username and password for a token pair.
    ///
    /// `client_key` identifies the caller for rate limiting, usually its address.
    pub async fn login(
        &self,
        client_key: &str,
        tenant_id: TenantId,
        username: &str,
        password: &str,
    ) -> SecurityResult<TokenPair> {
        if let Err(denied) = self.limiter.check(client_key, RouteClass::Login).into_result() {
            metrics::record_auth_attempt("login", "rate_limited");
            return Err(denied.into());
        }
        validate_username(username)?;
        validate_password_input(password)?;

        let account = self.directory.find(tenant_id, username);
        let outcome = {
            let credentials = self.credentials.clone();
            let password = Zeroizing::new(password.to_owned());
            let stored = account.as_ref().map(|a| a.credential.clone());
            blocking(move || {
                Ok(match stored {
                    Some(credential) => credentials.verify_and_upgrade(&password, &credential),
                    None => {
                        credentials.verify_decoy(&password);
                        VerifyOutcome::Rejected
                    }
                })
            })
            .await?
        };

        let (account, upgraded) = match (account, outcome) {
            (Some(account), VerifyOutcome::Verified { upgraded }) => (account, upgraded),
            (account, _) => {
                tracing::warn!(tenant_id = %tenant_id, client = %client_key, "Login failed");
                metrics::record_auth_attempt("login", "failure");
                self.audit_login_failure(tenant_id, account.as_ref(), username, client_key)
                    .await?;
                return Err(AuthFailure::BadCredentials.into());
            }
        };

        if let Some(upgraded) = upgraded {
            self.directory.update_credential(tenant_id, upgraded);
        }

        let principal = account.principal;
        let pair = self.tokens.issue_pair(&principal)?;
        self.audit(
            AuditEvent::new(
                tenant_id,
                AuditAction::LoginSuccess.as_str(),
                SESSION_ENTITY,
                pair.access.family().to_string(),
            )
            .with_actor(principal.user_id()),
        )
        .await?;

        metrics::record_auth_attempt("login", "success");
        tracing::info!(tenant_id = %tenant_id, user_id = %principal.user_id(), "Login succeeded");
        Ok(pair)
    }

    /// Rotate a refresh token into a new pair.
    pub async fn refresh(&self, client_key: &str, refresh_token: &str) -> SecurityResult<TokenPair> {
        if let Err(denied) = self.limiter.check(client_key, RouteClass::TokenRefresh).into_result() {
            metrics::record_auth_attempt("refresh", "rate_limited");
            return Err(denied.into());
        }
        validate_token_shape(refresh_token)?;

        match self.tokens.refresh(refresh_token) {
            Ok(pair) => {
                let principal = pair.access.subject().clone();
                self.audit(
                    AuditEvent::new(
                        principal.tenant_id(),
                        AuditAction::TokenRefreshed.as_str(),
                        SESSION_ENTITY,
                        pair.access.family().to_string(),
                    )
                    .with_actor(principal.user_id()),
                )
                .await?;
                metrics::record_auth_attempt("refresh", "success");
                Ok(pair)
            }
            Err(SecurityError::Auth(AuthFailure::RefreshTokenReused)) => {
                metrics::record_auth_attempt("refresh", "reused");
                if let Some(principal) = self.tokens.subject_of(refresh_token) {
                    self.audit(
                        AuditEvent::new(
                            principal.tenant_id(),
                            AuditAction::RefreshTokenReused.as_str(),
                            USER_ENTITY,
                            principal.user_id().to_string(),
                        )
                        .with_actor(principal.user_id())
                        .with_after(json!({ "client": client_key, "family_revoked": true })),
                    )
                    .await?;
                }
                Err(AuthFailure::RefreshTokenReused.into())
            }
            Err(other) => {
                metrics::record_auth_attempt("refresh", "failure");
                Err(other)
            }
        }
    }

    /// Validate an access token for a request.
    pub fn authenticate(&self, access_token: &str) -> Result<TenantPrincipal, AuthFailure> {
        self.tokens.validate(access_token)
    }

    /// End the session the access token belongs to, refresh token included.
    pub async fn logout(&self, principal: &TenantPrincipal, access_token: &str) -> SecurityResult<()> {
        self.tokens.revoke_family(access_token)?;
        self.tokens.revoke(access_token)?;
        self.audit(
            AuditEvent::new(
                principal.tenant_id(),
                AuditAction::Logout.as_str(),
                USER_ENTITY,
                principal.user_id().to_string(),
            )
            .with_actor(principal.user_id()),
        )
        .await?;
        Ok(())
    }

    /// Replace the caller's password. The current session is ended.
    pub async fn change_password(
        &self,
        principal: &TenantPrincipal,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> SecurityResult<()> {
        let key = format!("user:{}", principal.user_id());
        if let Err(denied) = self.limiter.check(&key, RouteClass::PasswordReset).into_result() {
            metrics::record_auth_attempt("password_change", "rate_limited");
            return Err(denied.into());
        }
        validate_password_input(current_password)?;
        validate_password_input(new_password)?;

        let Some(account) = self.directory.find_by_id(principal.tenant_id(), principal.user_id()) else {
            metrics::record_auth_attempt("password_change", "failure");
            return Err(AuthFailure::BadCredentials.into());
        };

        let credentials = self.credentials.clone();
        let current = Zeroizing::new(current_password.to_owned());
        let next = Zeroizing::new(new_password.to_owned());
        let user_id = principal.user_id();
        let stored = account.credential;
        let replacement = blocking(move || {
            if !credentials.verify(&current, &stored) {
                return Ok(None);
            }
            credentials.hash(user_id, &next).map(Some)
        })
        .await?;

        let Some(replacement) = replacement else {
            tracing::warn!(user_id = %principal.user_id(), "Password change rejected");
            metrics::record_auth_attempt("password_change", "failure");
            return Err(AuthFailure::BadCredentials.into());
        };

        self.directory.update_credential(principal.tenant_id(), replacement);
        self.tokens.revoke_family(access_token)?;
        self.audit(
            AuditEvent::new(
                principal.tenant_id(),
                AuditAction::PasswordChanged.as_str(),
                USER_ENTITY,
                principal.user_id().to_string(),
            )
            .with_actor(principal.user_id()),
        )
        .await?;
        metrics::record_auth_attempt("password_change", "success");
        Ok(())
    }

    /// Create an account with an initial password.
    pub async fn provision_user(
        &self,
        tenant_id: TenantId,
        username: &str,
        password: &str,
        role: Role,
        actor_id: Option<UserId>,
    ) -> SecurityResult<TenantPrincipal> {
        validate_username(username)?;
        validate_password_input(password)?;

        let user_id = UserId::new();
        let credentials = self.credentials.clone();
        let password = Zeroizing::new(password.to_owned());
        let credential = blocking(move || credentials.hash(user_id, &password)).await?;

        let principal = TenantPrincipal::new(tenant_id, user_id, role);
        self.directory.insert(UserAccount {
            principal: principal.clone(),
            username: username.to_string(),
            credential,
        })?;

        let mut event = AuditEvent::new(
            tenant_id,
            AuditAction::UserProvisioned.as_str(),
            USER_ENTITY,
            user_id.to_string(),
        )
        .with_after(json!({ "username": username.to_ascii_lowercase(), "role": role }));
        event.actor_id = actor_id;
        self.audit(event).await?;

        tracing::info!(tenant_id = %tenant_id, user_id = %user_id, role = %role, "User provisioned");
        Ok(principal)
    }

    /// Failed logins land in the tenant's chain only for tenants that have accounts.
    ///
    /// The attempted name goes into the snapshot; the entity id is its digest so
    /// the record never depends on the length or content of caller input.
    async fn audit_login_failure(
        &self,
        tenant_id: TenantId,
        account: Option<&UserAccount>,
        username: &str,
        client_key: &str,
    ) -> SecurityResult<()> {
        let event = match account {
            Some(account) => AuditEvent::new(
                tenant_id,
                AuditAction::LoginFailure.as_str(),
                USER_ENTITY,
                account.principal.user_id().to_string(),
            )
            .with_after(json!({ "client": client_key })),
            None if self.directory.has_tenant(tenant_id) => {
                let normalized = username.to_ascii_lowercase();
                AuditEvent::new(
                    tenant_id,
                    AuditAction::LoginFailure.as_str(),
                    UNKNOWN_USER_ENTITY,
                    hex::encode(Sha256::digest(normalized.as_bytes())),
                )
                .with_after(json!({ "client": client_key, "username": sanitize_text(&normalized) }))
            }
            None => {
                tracing::warn!(tenant_id = %tenant_id, client = %client_key, "Login attempted for unknown tenant");
                metrics::record_auth_attempt("login", "unknown_tenant");
                return Ok(());
            }
        };
        self.audit(event).await.map(|_| ())
    }

    async fn audit(&self, event: AuditEvent) -> SecurityResult<AuditRecord> {
        let audit = self.audit.clone();
        blocking(move || audit.record(event)).await
    }
}

async fn blocking<T, F>(f: F) -> SecurityResult<T>
where
    F: FnOnce() -> SecurityResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "Blocking task failed");
        SecurityError::Internal(e.to_string())
    })?
}
