//! Sled-backed persistence for spot transactions and the offline queue.
//!
//! | Tree | Key | Value |
//! |---|---|---|
//! | `transaction` | `tx_id` bytes (16) | bincode [`Transaction`] |
//! | `queue` | big-endian `queued_at` + `tx_id` bytes | bincode [`QueueEntry`] |
//!
//! The queue key is ordered by `queued_at` first so iteration yields FIFO
//! order directly from the tree's natural key ordering.

use std::path::Path;

use crate::error::TransactionsError;
use crate::types::{QueueEntry, Transaction, TransactionId};

pub struct TransactionDb {
    transaction: sled::Tree,
    queue: sled::Tree,
}

fn queue_key(queued_at: i64, tx_id: &TransactionId) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&queued_at.to_be_bytes());
    key[8..].copy_from_slice(tx_id.as_bytes());
    key
}

impl TransactionDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransactionsError> {
        let db = sled::open(path).map_err(|e| TransactionsError::Storage(e.to_string()))?;
        let transaction = db
            .open_tree("transaction")
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        let queue = db
            .open_tree("queue")
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        Ok(Self { transaction, queue })
    }

    pub fn get(&self, id: &TransactionId) -> Result<Option<Transaction>, TransactionsError> {
        let raw = self
            .transaction
            .get(id.as_bytes())
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        raw.map(|bytes| {
            bincode::deserialize(&bytes)
                .map_err(|e| TransactionsError::Serialization(e.to_string()))
        })
        .transpose()
    }

    pub fn put(&self, tx: &Transaction) -> Result<(), TransactionsError> {
        let bytes = bincode::serialize(tx)
            .map_err(|e| TransactionsError::Serialization(e.to_string()))?;
        self.transaction
            .insert(tx.id.as_bytes(), bytes)
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn enqueue(&self, entry: &QueueEntry) -> Result<(), TransactionsError> {
        let key = queue_key(entry.queued_at, &entry.tx_id);
        let bytes = bincode::serialize(entry)
            .map_err(|e| TransactionsError::Serialization(e.to_string()))?;
        self.queue
            .insert(&key[..], bytes)
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn remove_from_queue(
        &self,
        queued_at: i64,
        tx_id: &TransactionId,
    ) -> Result<(), TransactionsError> {
        let key = queue_key(queued_at, tx_id);
        self.queue
            .remove(&key[..])
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All queued entries, oldest `queued_at` first.
    pub fn iter_queue(&self) -> Result<Vec<QueueEntry>, TransactionsError> {
        let mut out = Vec::new();
        for kv in self.queue.iter() {
            let (_, value) = kv.map_err(|e| TransactionsError::Storage(e.to_string()))?;
            out.push(
                bincode::deserialize(&value)
                    .map_err(|e| TransactionsError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), TransactionsError> {
        self.transaction
            .flush()
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        self.queue
            .flush()
            .map_err(|e| TransactionsError::Storage(e.to_string()))?;
        Ok(())
    }
}
