//! Hash-chained audit logger.
//!
//! # Responsibilities
//! - Validate and append records, one chain per tenant
//! - Replay a chain from genesis and report the first broken link
//! - Record corrections as new records; never rewrite history
//!
//! # Design Decisions
//! - One mutex per tenant guards the chain tail; tenants append in parallel
//! - The tail advances only after the store acknowledged the append
//! - A broken chain is reported and counted, never repaired
//!
//! # Data Flow
//! ```text
//! record(event)
//!     → validator (identifiers, entity id, snapshots)
//!     → tenant lock → tail (loaded from store on first use)
//!     → hash(prev_hash ‖ content) → store.append → tail = new record
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::audit::record::{AuditAction, AuditEvent, AuditRecord, GENESIS_HASH};
use crate::audit::store::AuditStore;
use crate::clock::Clock;
use crate::error::{IntegrityFailure, ReasonCode, SecurityResult, StorageError, ValidationError};
use crate::observability::metrics;
use crate::principal::{TenantId, UserId};
use crate::security::validator::{validate_entity_id, validate_identifier, validate_snapshot};

#[derive(Debug, Clone)]
struct ChainTail {
    next_sequence: u64,
    last_hash: String,
}

impl ChainTail {
    fn genesis() -> Self {
        Self {
            next_sequence: 0,
            last_hash: GENESIS_HASH.to_string(),
        }
    }
}

type TailSlot = Arc<Mutex<Option<ChainTail>>>;

/// What is wrong with a broken link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainFault {
    /// Sequence gap, duplicate or reordered record.
    SequenceMismatch { expected: u64, found: u64 },
    /// `prev_hash` does not match the preceding record's hash.
    PrevHashMismatch,
    /// Stored hash does not match the record's content.
    ContentHashMismatch,
    /// Record filed under another tenant.
    TenantMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub index: u64,
    pub record_id: Uuid,
    pub fault: ChainFault,
}

/// Outcome of replaying one tenant's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub tenant_id: TenantId,
    pub records_checked: u64,
    pub first_broken: Option<BrokenLink>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken.is_none()
    }
}

pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    tails: DashMap<TenantId, TailSlot>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            tails: DashMap::new(),
            clock,
        }
    }

    /// Validate, chain and durably append one record.
    pub fn record(&self, event: AuditEvent) -> SecurityResult<AuditRecord> {
        self.append(event, None)
    }

    /// Append a correction of `original_id`. The original stays untouched.
    pub fn record_correction(
        &self,
        tenant_id: TenantId,
        original_id: Uuid,
        actor_id: Option<UserId>,
        corrected: Value,
    ) -> SecurityResult<AuditRecord> {
        let original = self
            .store
            .scan(tenant_id)?
            .into_iter()
            .find(|r| r.id == original_id)
            .ok_or_else(|| ValidationError::malformed("corrects", ReasonCode::UnknownReference))?;

        let mut event = AuditEvent::new(
            tenant_id,
            AuditAction::Correction.as_str(),
            original.entity_type,
            original.entity_id,
        )
        .with_after(corrected);
        event.actor_id = actor_id;
        event.before = original.after;

        self.append(event, Some(original_id))
    }

    /// Replay a tenant's chain from genesis.
    pub fn verify_chain(&self, tenant_id: TenantId) -> SecurityResult<ChainVerification> {
        let records = self.store.scan(tenant_id)?;
        let first_broken = find_first_break(tenant_id, &records)?;

        if let Some(broken) = &first_broken {
            metrics::record_chain_break();
            tracing::error!(
                tenant_id = %tenant_id,
                index = broken.index,
                record_id = %broken.record_id,
                fault = ?broken.fault,
                "Audit chain broken"
            );
        } else {
            tracing::debug!(tenant_id = %tenant_id, records = records.len(), "Audit chain intact");
        }

        Ok(ChainVerification {
            tenant_id,
            records_checked: records.len() as u64,
            first_broken,
        })
    }

    /// Like `verify_chain`, but a break is an `IntegrityFailure`.
    pub fn ensure_chain_intact(&self, tenant_id: TenantId) -> SecurityResult<u64> {
        let verification = self.verify_chain(tenant_id)?;
        match verification.first_broken {
            None => Ok(verification.records_checked),
            Some(broken) => Err(IntegrityFailure::ChainBroken {
                tenant_id,
                index: broken.index,
            }
            .into()),
        }
    }

    pub fn records(&self, tenant_id: TenantId) -> SecurityResult<Vec<AuditRecord>> {
        Ok(self.store.scan(tenant_id)?)
    }

    /// Every record about one entity, corrections included, in chain order.
    pub fn entity_history(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        entity_id: &str,
    ) -> SecurityResult<Vec<AuditRecord>> {
        Ok(self
            .store
            .scan(tenant_id)?
            .into_iter()
            .filter(|r| r.entity_type == entity_type && r.entity_id == entity_id)
            .collect())
    }

    pub fn tenants(&self) -> SecurityResult<Vec<TenantId>> {
        Ok(self.store.tenants()?)
    }

    fn append(&self, event: AuditEvent, corrects: Option<Uuid>) -> SecurityResult<AuditRecord> {
        validate_identifier("action", &event.action)?;
        validate_identifier("entity_type", &event.entity_type)?;
        validate_entity_id(&event.entity_id)?;
        if let Some(before) = &event.before {
            validate_snapshot("before", before)?;
        }
        if let Some(after) = &event.after {
            validate_snapshot("after", after)?;
        }

        let slot = self.tails.entry(event.tenant_id).or_default().clone();
        let mut tail = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let current = match tail.as_ref() {
            Some(current) => current.clone(),
            None => self.load_tail(event.tenant_id)?,
        };

        let mut record = AuditRecord {
            id: Uuid::new_v4(),
            tenant_id: event.tenant_id,
            sequence: current.next_sequence,
            actor_id: event.actor_id,
            timestamp_ms: self.clock.now_millis(),
            action: event.action,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            before: event.before,
            after: event.after,
            corrects,
            prev_hash: current.last_hash,
            record_hash: String::new(),
        };
        record.record_hash = record.compute_hash().map_err(StorageError::from)?;

        if let Err(e) = self.store.append(&record) {
            // The store may hold part or all of the record; re-read the tail next time.
            *tail = None;
            tracing::error!(
                tenant_id = %record.tenant_id,
                sequence = record.sequence,
                error = %e,
                "Audit append failed"
            );
            return Err(e.into());
        }
        *tail = Some(ChainTail {
            next_sequence: record.sequence + 1,
            last_hash: record.record_hash.clone(),
        });
        drop(tail);

        metrics::record_audit_record();
        tracing::info!(
            tenant_id = %record.tenant_id,
            sequence = record.sequence,
            action = %record.action,
            entity_type = %record.entity_type,
            "Audit record appended"
        );
        Ok(record)
    }

    fn load_tail(&self, tenant_id: TenantId) -> Result<ChainTail, StorageError> {
        let records = self.store.scan(tenant_id)?;
        Ok(match records.last() {
            Some(last) => ChainTail {
                next_sequence: last.sequence + 1,
                last_hash: last.record_hash.clone(),
            },
            None => ChainTail::genesis(),
        })
    }
}

fn find_first_break(tenant_id: TenantId, records: &[AuditRecord]) -> Result<Option<BrokenLink>, StorageError> {
    let mut expected_prev = GENESIS_HASH;
    for (index, record) in records.iter().enumerate() {
        let index = index as u64;
        let fault = if record.tenant_id != tenant_id {
            Some(ChainFault::TenantMismatch)
        } else if record.sequence != index {
            Some(ChainFault::SequenceMismatch {
                expected: index,
                found: record.sequence,
            })
        } else if record.prev_hash != expected_prev {
            Some(ChainFault::PrevHashMismatch)
        } else if record.compute_hash()? != record.record_hash {
            Some(ChainFault::ContentHashMismatch)
        } else {
            None
        };

        if let Some(fault) = fault {
            return Ok(Some(BrokenLink {
                index,
                record_id: record.id,
                fault,
            }));
        }
        expected_prev = record.record_hash.as_str();
    }
    Ok(None)
}
