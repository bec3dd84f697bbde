//! Pending-share store, the durable handoff for shares that arrive while no receiver is open.
//!
//! Records are written once by the interception path, read and retired once by the
//! reconciliation path, and otherwise swept after the expiry window.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::share::models::{PendingShareRecord, ShareId};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or reached. Callers may fall back to
    /// delivery paths that do not need the store.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed store for [`PendingShareRecord`]s. All access is single-key except the sweep.
#[async_trait]
pub trait PendingShareStore: Send + Sync {
    /// Upserts by `record.id`.
    async fn put(&self, record: PendingShareRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &ShareId) -> Result<Option<PendingShareRecord>, StoreError>;

    /// Removes the record; absent ids are not an error.
    async fn delete(&self, id: &ShareId) -> Result<(), StoreError>;

    /// Removes and returns the record in one step. Of any number of concurrent
    /// callers for the same id, at most one gets `Some`.
    async fn take(&self, id: &ShareId) -> Result<Option<PendingShareRecord>, StoreError>;

    /// Deletes every record older than `now - max_age`, returning how many were removed.
    async fn sweep_expired(&self, max_age: Duration) -> Result<usize, StoreError>;
}

/// Runs [`PendingShareStore::sweep_expired`] and swallows any failure.
/// Sweeping is hygiene only and must never fail the caller.
pub async fn sweep_best_effort(store: &dyn PendingShareStore, max_age: Duration) -> usize {
    match store.sweep_expired(max_age).await {
        Ok(0) => 0,
        Ok(removed) => {
            info!(removed, "Swept expired pending shares");
            removed
        }
        Err(e) => {
            warn!(error = %e, "Pending-share sweep failed; continuing");
            0
        }
    }
}

pub(crate) fn expiry_cutoff(max_age: Duration) -> chrono::DateTime<Utc> {
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(max_age)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
}

/// In-process store. Survives receiver reloads but not server restarts.
#[derive(Default)]
pub struct MemoryShareStore {
    records: RwLock<HashMap<ShareId, PendingShareRecord>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl PendingShareStore for MemoryShareStore {
    async fn put(&self, record: PendingShareRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &ShareId) -> Result<Option<PendingShareRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &ShareId) -> Result<(), StoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn take(&self, id: &ShareId) -> Result<Option<PendingShareRecord>, StoreError> {
        Ok(self.records.write().await.remove(id))
    }

    async fn sweep_expired(&self, max_age: Duration) -> Result<usize, StoreError> {
        let cutoff = expiry_cutoff(max_age);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.timestamp >= cutoff);
        Ok(before - records.len())
    }
}
