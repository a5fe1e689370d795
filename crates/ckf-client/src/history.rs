//! Durable, append/update record of user transactions.
//!
//! Records are kept most-recent-first and persisted synchronously after
//! every mutation. Ids are client-generated and monotonic, seeded from the
//! highest persisted id so they stay unique across reloads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use ckf_common::{Asset, RecordStatus, TransactionKind, TransactionRecord};

use crate::error::ClientError;
use crate::storage::KvStore;

const HISTORY_KEY: &str = "transaction_history";

/// Partial update applied to an existing record by id.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub status: Option<RecordStatus>,
    pub amount: Option<u128>,
    pub tx_hash: Option<String>,
}

impl RecordPatch {
    pub fn status(status: RecordStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_amount(mut self, amount: u128) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Local history store backed by a durable key-value store.
pub struct HistoryStore {
    store: Arc<dyn KvStore>,
    records: RwLock<Vec<TransactionRecord>>,
    next_id: AtomicU64,
}

impl HistoryStore {
    /// Load the persisted collection; absent or corrupt storage starts empty.
    pub fn load(store: Arc<dyn KvStore>) -> Self {
        let records: Vec<TransactionRecord> = match store.get(HISTORY_KEY) {
            Ok(Some(text)) => match serde_json::from_str(&text) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Corrupt transaction history, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read transaction history, starting empty");
                Vec::new()
            }
        };

        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        debug!(records = records.len(), next_id, "Transaction history loaded");

        Self {
            store,
            records: RwLock::new(records),
            next_id: AtomicU64::new(next_id),
        }
    }

    /// Append a new record, most-recent-first. Returns its id.
    pub fn add_record(
        &self,
        kind: TransactionKind,
        asset: Asset,
        amount: u128,
        tx_hash: Option<String>,
        status: RecordStatus,
    ) -> Result<u64, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = TransactionRecord {
            id,
            kind,
            asset,
            amount,
            tx_hash,
            status,
            timestamp: Utc::now().to_rfc3339(),
        };

        let mut records = self.records.write();
        records.insert(0, record);
        self.persist(&records)?;
        debug!(id, kind = %kind, asset = %asset, "Transaction recorded");
        Ok(id)
    }

    /// Merge a patch into the record matching `id`; no-op if absent.
    pub fn update_record(&self, id: u64, patch: RecordPatch) -> Result<(), ClientError> {
        let mut records = self.records.write();
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            debug!(id, "Update for unknown record ignored");
            return Ok(());
        };

        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(amount) = patch.amount {
            record.amount = amount;
        }
        if let Some(tx_hash) = patch.tx_hash {
            record.tx_hash = Some(tx_hash);
        }

        self.persist(&records)
    }

    /// Snapshot of all records, most-recent-first.
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.read().clone()
    }

    /// Most recent record carrying the given transaction hash.
    pub fn find_by_tx_hash(&self, tx_hash: &str) -> Option<TransactionRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.tx_hash.as_deref() == Some(tx_hash))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Explicitly drop all records. The only way the collection is destroyed.
    pub fn clear(&self) -> Result<(), ClientError> {
        let mut records = self.records.write();
        records.clear();
        self.persist(&records)
    }

    fn persist(&self, records: &[TransactionRecord]) -> Result<(), ClientError> {
        let text = serde_json::to_string(records)
            .map_err(|e| crate::storage::StorageError::Serde(e.to_string()))?;
        self.store.put(HISTORY_KEY, &text)?;
        Ok(())
    }
}
