//! Lookup of user accounts by tenant and login name.
//!
//! The production user store lives outside this crate; the in-memory
//! directory backs tests and single-node deployments.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::auth::credentials::Credential;
use crate::error::{ReasonCode, ValidationError};
use crate::principal::{TenantId, TenantPrincipal, UserId};

#[derive(Debug, Clone)]
pub struct UserAccount {
    pub principal: TenantPrincipal,
    pub username: String,
    pub credential: Credential,
}

pub trait UserDirectory: Send + Sync {
    fn find(&self, tenant_id: TenantId, username: &str) -> Option<UserAccount>;

    fn find_by_id(&self, tenant_id: TenantId, user_id: UserId) -> Option<UserAccount>;

    /// Whether any account exists under `tenant_id`.
    fn has_tenant(&self, tenant_id: TenantId) -> bool;

    /// Add an account. Login names are unique per tenant.
    fn insert(&self, account: UserAccount) -> Result<(), ValidationError>;

    /// Replace the stored credential of an existing account.
    fn update_credential(&self, tenant_id: TenantId, credential: Credential) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Login names compare case-insensitively.
fn normalize(username: &str) -> String {
    username.to_ascii_lowercase()
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    accounts: DashMap<(TenantId, String), UserAccount>,
    tenants: DashMap<TenantId, usize>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find(&self, tenant_id: TenantId, username: &str) -> Option<UserAccount> {
        self.accounts
            .get(&(tenant_id, normalize(username)))
            .map(|entry| entry.value().clone())
    }

    fn find_by_id(&self, tenant_id: TenantId, user_id: UserId) -> Option<UserAccount> {
        self.accounts
            .iter()
            .find(|entry| entry.key().0 == tenant_id && entry.value().principal.user_id() == user_id)
            .map(|entry| entry.value().clone())
    }

    fn has_tenant(&self, tenant_id: TenantId) -> bool {
        self.tenants.contains_key(&tenant_id)
    }

    fn insert(&self, account: UserAccount) -> Result<(), ValidationError> {
        let tenant_id = account.principal.tenant_id();
        match self.accounts.entry((tenant_id, normalize(&account.username))) {
            Entry::Occupied(_) => return Err(ValidationError::malformed("username", ReasonCode::Conflict)),
            Entry::Vacant(slot) => {
                slot.insert(account);
            }
        }
        *self.tenants.entry(tenant_id).or_insert(0) += 1;
        Ok(())
    }

    fn update_credential(&self, tenant_id: TenantId, credential: Credential) -> bool {
        let user_id = credential.user_id();
        let Some(mut entry) = self
            .accounts
            .iter_mut()
            .find(|entry| entry.key().0 == tenant_id && entry.value().principal.user_id() == user_id)
        else {
            return false;
        };
        entry.value_mut().credential = credential;
        true
    }

    fn len(&self) -> usize {
        self.accounts.len()
    }
}
