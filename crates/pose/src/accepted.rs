//! Accepted-receipt log (§4.12): the aggregator's input queue. Every receipt
//! that clears `accept_receipt` is appended here under its epoch so a later
//! `build_and_submit_batch` call has something to fold into a Merkle batch.
//! Same shape as [`crate::replay::ReplayRegistry`]: an in-memory index backed
//! by an optional persistent store, so a restart before an epoch finalizes
//! doesn't lose receipts the aggregator hasn't collected yet.

use std::collections::HashMap;
use std::sync::Arc;

use coc_common::{EpochId, ReceiptMessage};
use coc_storage::{KvStore, StoreError};
use parking_lot::RwLock;

const KEY_PREFIX: &[u8] = b"R/";

fn storage_key(epoch_id: EpochId, challenge_id: coc_common::H256) -> Vec<u8> {
    let mut k = KEY_PREFIX.to_vec();
    k.extend_from_slice(&epoch_id.to_be_bytes());
    k.extend_from_slice(challenge_id.as_bytes());
    k
}

pub struct AcceptedReceiptLog {
    store: Option<Arc<dyn KvStore>>,
    by_epoch: RwLock<HashMap<EpochId, Vec<ReceiptMessage>>>,
}

impl AcceptedReceiptLog {
    pub fn in_memory() -> Self {
        Self { store: None, by_epoch: RwLock::new(HashMap::new()) }
    }

    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store: Some(store), by_epoch: RwLock::new(HashMap::new()) }
    }

    /// Loads every persisted receipt under the `R/` prefix into the in-memory
    /// per-epoch index. Call once at startup, before any epoch is finalized.
    pub async fn load(&self) -> Result<(), StoreError> {
        let Some(store) = &self.store else { return Ok(()) };
        let entries = store.iterate_prefix(KEY_PREFIX).await?;
        let mut by_epoch = self.by_epoch.write();
        for (k, v) in entries {
            let epoch_bytes = k
                .get(KEY_PREFIX.len()..KEY_PREFIX.len() + 8)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| StoreError::Serialization("malformed accepted-receipt key".into()))?;
            let epoch_id = EpochId::from_be_bytes(epoch_bytes);
            let receipt: ReceiptMessage =
                serde_json::from_slice(&v).map_err(|e| StoreError::Serialization(e.to_string()))?;
            by_epoch.entry(epoch_id).or_default().push(receipt);
        }
        Ok(())
    }

    /// Appends an already-accepted receipt under `epoch_id`. Durable if a
    /// backing store is configured; always updates the in-memory index.
    pub async fn record(&self, epoch_id: EpochId, receipt: ReceiptMessage) -> Result<(), StoreError> {
        if let Some(store) = &self.store {
            let key = storage_key(epoch_id, receipt.challenge_id);
            let value = serde_json::to_vec(&receipt).map_err(|e| StoreError::Serialization(e.to_string()))?;
            store.put(key, value).await?;
        }
        self.by_epoch.write().entry(epoch_id).or_default().push(receipt);
        Ok(())
    }

    /// Returns a snapshot of every receipt accepted for `epoch_id`, in
    /// acceptance order. Does not remove them — the aggregator may retry a
    /// batch submission against the same receipt set.
    pub fn receipts_for_epoch(&self, epoch_id: EpochId) -> Vec<ReceiptMessage> {
        self.by_epoch.read().get(&epoch_id).cloned().unwrap_or_default()
    }

    /// Drops an epoch's receipts from the in-memory index and, if a store is
    /// configured, its persisted entries — called once the epoch's batch has
    /// been finalized and the dispute window has closed (§4.8, §4.12).
    pub async fn clear_epoch(&self, epoch_id: EpochId) -> Result<(), StoreError> {
        let removed = self.by_epoch.write().remove(&epoch_id).unwrap_or_default();
        if let Some(store) = &self.store {
            for receipt in &removed {
                store.delete(storage_key(epoch_id, receipt.challenge_id)).await?;
            }
        }
        Ok(())
    }

    pub fn epoch_count(&self, epoch_id: EpochId) -> usize {
        self.by_epoch.read().get(&epoch_id).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coc_common::H256;

    fn receipt(n: u64) -> ReceiptMessage {
        ReceiptMessage {
            challenge_id: H256::from_low_u64_be(n),
            node_id: H256::from_low_u64_be(1),
            response_at_ms: n,
            response_body: vec![],
            node_sig: vec![0u8; 65],
        }
    }

    #[tokio::test]
    async fn records_and_lists_by_epoch() {
        let log = AcceptedReceiptLog::in_memory();
        log.record(5, receipt(1)).await.unwrap();
        log.record(5, receipt(2)).await.unwrap();
        log.record(6, receipt(3)).await.unwrap();

        assert_eq!(log.receipts_for_epoch(5).len(), 2);
        assert_eq!(log.receipts_for_epoch(6).len(), 1);
        assert_eq!(log.receipts_for_epoch(7).len(), 0);
    }

    #[tokio::test]
    async fn clear_epoch_drops_its_receipts_only() {
        let log = AcceptedReceiptLog::in_memory();
        log.record(5, receipt(1)).await.unwrap();
        log.record(6, receipt(2)).await.unwrap();

        log.clear_epoch(5).await.unwrap();

        assert_eq!(log.epoch_count(5), 0);
        assert_eq!(log.epoch_count(6), 1);
    }
}
