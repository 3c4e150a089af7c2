//! Durable audit storage.
//!
//! # Responsibilities
//! - Append a record and acknowledge only once it is durable
//! - Scan one tenant's records in insertion order
//!
//! # Design Decisions
//! - Stores never validate or repair chains; that is the logger's job
//! - JSON-lines, one file per tenant, `sync_data` after every append

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::audit::record::AuditRecord;
use crate::error::StorageError;
use crate::principal::TenantId;

/// Append-only record storage.
pub trait AuditStore: Send + Sync {
    /// Persist one record. Returns only after the record is durable.
    fn append(&self, record: &AuditRecord) -> Result<(), StorageError>;

    /// All records of a tenant, ordered by insertion.
    fn scan(&self, tenant_id: TenantId) -> Result<Vec<AuditRecord>, StorageError>;

    /// Tenants with at least one record.
    fn tenants(&self) -> Result<Vec<TenantId>, StorageError>;
}

/// Process-local store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    chains: DashMap<TenantId, Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modify stored records out of band, as an attacker with storage access would.
    #[cfg(test)]
    pub fn tamper<F>(&self, tenant_id: TenantId, f: F)
    where
        F: FnOnce(&mut Vec<AuditRecord>),
    {
        let mut chain = self.chains.entry(tenant_id).or_default();
        f(chain.value_mut());
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        self.chains
            .entry(record.tenant_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn scan(&self, tenant_id: TenantId) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(self
            .chains
            .get(&tenant_id)
            .map(|chain| chain.value().clone())
            .unwrap_or_default())
    }

    fn tenants(&self) -> Result<Vec<TenantId>, StorageError> {
        let mut tenants: Vec<TenantId> = self
            .chains
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect();
        tenants.sort();
        Ok(tenants)
    }
}

/// One `<tenant>.jsonl` file per tenant under a directory.
#[derive(Debug, Clone)]
pub struct JsonlAuditStore {
    directory: PathBuf,
}

impl JsonlAuditStore {
    /// Open (and create if needed) the store directory.
    pub fn open(directory: impl AsRef<Path>) -> Result<Self, StorageError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        tracing::info!(directory = %directory.display(), "Audit store opened");
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, tenant_id: TenantId) -> PathBuf {
        self.directory.join(format!("{}.jsonl", tenant_id))
    }
}

impl AuditStore for JsonlAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(record.tenant_id))?;
        let committed = file.metadata()?.len();

        if let Err(e) = file.write_all(&line).and_then(|()| file.sync_data()) {
            // Drop a partial or unsynced line so the file still ends on a record boundary.
            if let Err(rollback) = file.set_len(committed).and_then(|()| file.sync_data()) {
                tracing::error!(
                    tenant_id = %record.tenant_id,
                    error = %rollback,
                    "Failed to roll back audit append"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn scan(&self, tenant_id: TenantId) -> Result<Vec<AuditRecord>, StorageError> {
        let path = self.path_for(tenant_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                tracing::error!(
                    tenant_id = %tenant_id,
                    line = index + 1,
                    error = %e,
                    "Unreadable audit record"
                );
                StorageError::Corrupt {
                    tenant_id,
                    line: index + 1,
                }
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn tenants(&self) -> Result<Vec<TenantId>, StorageError> {
        let mut tenants = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(tenant) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                tenants.push(tenant);
            }
        }
        tenants.sort();
        Ok(tenants)
    }
}
