//! Revocation bookkeeping for otherwise stateless tokens.
//!
//! Entries live until the revoked token's own expiry, so the set is bounded
//! by the number of tokens issued within one refresh lifetime.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Why a token id is in the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    /// Explicitly revoked (logout, password change, family kill).
    Revoked,
    /// Consumed by a single-use refresh rotation.
    Rotated,
}

#[derive(Debug, Clone, Copy)]
struct RevokedToken {
    until_secs: u64,
    reason: RevocationReason,
}

#[derive(Debug, Default)]
pub struct RevocationSet {
    tokens: DashMap<Uuid, RevokedToken>,
    families: DashMap<Uuid, u64>,
}

impl RevocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke one token id. A rotation mark already present is kept.
    pub fn revoke(&self, token_id: Uuid, until_secs: u64) {
        self.tokens.entry(token_id).or_insert(RevokedToken {
            until_secs,
            reason: RevocationReason::Revoked,
        });
    }

    /// Revoke every token of a login session until `until_secs`.
    pub fn revoke_family(&self, family: Uuid, until_secs: u64) {
        self.families
            .entry(family)
            .and_modify(|until| *until = (*until).max(until_secs))
            .or_insert(until_secs);
    }

    /// Atomically mark a refresh token as consumed.
    ///
    /// Fails with the existing reason if the id was already revoked or rotated.
    pub fn claim_rotation(&self, token_id: Uuid, until_secs: u64) -> Result<(), RevocationReason> {
        match self.tokens.entry(token_id) {
            Entry::Occupied(existing) => Err(existing.get().reason),
            Entry::Vacant(slot) => {
                slot.insert(RevokedToken {
                    until_secs,
                    reason: RevocationReason::Rotated,
                });
                Ok(())
            }
        }
    }

    pub fn token_status(&self, token_id: &Uuid) -> Option<RevocationReason> {
        self.tokens.get(token_id).map(|entry| entry.reason)
    }

    pub fn is_family_revoked(&self, family: &Uuid) -> bool {
        self.families.contains_key(family)
    }

    /// Drop entries whose tokens have expired anyway. Returns the number removed.
    pub fn purge_expired(&self, now_secs: u64) -> usize {
        let before = self.len();
        self.tokens.retain(|_, entry| entry.until_secs > now_secs);
        self.families.retain(|_, until| *until > now_secs);
        before.saturating_sub(self.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len() + self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
