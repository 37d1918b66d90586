//! Block & log index (C4, §4.4): four logical tables keyed by byte prefix
//! over the KV store — `B/<u64>` blocks, `T/<H256>` tx/receipt pairs,
//! `A/<addr>/<u64>/<u32>` address history, `L/<u64>/<u32>/<u32>` logs.

use std::sync::Arc;

use coc_common::{Address, Block, Log, Receipt, H256};

use crate::error::StoreError;
use crate::kv::{KvStore, WriteOp};

pub const MAX_LOG_BLOCK_RANGE: u64 = 10_000;
pub const MAX_LOG_RESULTS: usize = 10_000;

fn block_key(number: u64) -> Vec<u8> {
    let mut k = b"B/".to_vec();
    k.extend_from_slice(&number.to_be_bytes());
    k
}

fn block_hash_key(hash: H256) -> Vec<u8> {
    let mut k = b"H/".to_vec();
    k.extend_from_slice(hash.as_bytes());
    k
}

fn tx_key(hash: H256) -> Vec<u8> {
    let mut k = b"T/".to_vec();
    k.extend_from_slice(hash.as_bytes());
    k
}

fn address_key(addr: Address, block_number: u64, tx_index: u32) -> Vec<u8> {
    let mut k = b"A/".to_vec();
    k.extend_from_slice(addr.as_bytes());
    k.extend_from_slice(&block_number.to_be_bytes());
    k.extend_from_slice(&tx_index.to_be_bytes());
    k
}

fn address_prefix(addr: Address) -> Vec<u8> {
    let mut k = b"A/".to_vec();
    k.extend_from_slice(addr.as_bytes());
    k
}

fn log_key(block_number: u64, tx_index: u32, log_index: u32) -> Vec<u8> {
    let mut k = b"L/".to_vec();
    k.extend_from_slice(&block_number.to_be_bytes());
    k.extend_from_slice(&tx_index.to_be_bytes());
    k.extend_from_slice(&log_index.to_be_bytes());
    k
}

fn log_range_prefix(block_number: u64) -> Vec<u8> {
    let mut k = b"L/".to_vec();
    k.extend_from_slice(&block_number.to_be_bytes());
    k
}

/// A `(rawTx, receipt, blockNumber)` tuple, as stored under `T/<txHash>`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TxRecord {
    pub raw_tx: coc_common::RawTransaction,
    pub receipt: Receipt,
    pub block_number: u64,
}

/// A log-query filter (`eth_getLogs` semantics, §4.4 / §4.10).
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    /// `None` = any address. Non-empty = OR-set.
    pub addresses: Option<Vec<Address>>,
    /// Per-position filter: `None` = wildcard, `Some(set)` = OR-set at that position. Max 4 positions.
    pub topics: Vec<Option<Vec<H256>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("block range too large: {0} blocks, max {MAX_LOG_BLOCK_RANGE}")]
    RangeTooLarge(u64),
    #[error("too many topic filter positions: {0}, max 4")]
    TooManyTopics(usize),
    #[error("malformed index record: {0}")]
    Decode(String),
}

pub struct BlockIndex {
    store: Arc<dyn KvStore>,
}

impl BlockIndex {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn put_block(&self, block: &Block) -> Result<(), IndexError> {
        let value =
            serde_json::to_vec(block).map_err(|e| IndexError::Decode(e.to_string()))?;
        self.store
            .batch_write(vec![
                WriteOp::Put(block_key(block.number), value),
                WriteOp::Put(block_hash_key(block.hash), block.number.to_be_bytes().to_vec()),
            ])
            .await?;
        Ok(())
    }

    pub async fn get_block(&self, number: u64) -> Result<Option<Block>, IndexError> {
        match self.store.get(&block_key(number)).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(|e| IndexError::Decode(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub async fn get_block_by_hash(&self, hash: H256) -> Result<Option<Block>, IndexError> {
        match self.store.get(&block_hash_key(hash)).await? {
            Some(bytes) => {
                if bytes.len() != 8 {
                    return Err(IndexError::Decode("malformed block hash index entry".into()));
                }
                let number = u64::from_be_bytes(bytes.try_into().unwrap());
                self.get_block(number).await
            }
            None => Ok(None),
        }
    }

    /// Atomically stores a block, its receipts, the per-tx record, the
    /// address-history entries and the per-log entries for one applied block.
    pub async fn put_applied_block(
        &self,
        block: &Block,
        receipts: &[Receipt],
    ) -> Result<(), IndexError> {
        let mut ops = Vec::new();

        ops.push(WriteOp::Put(
            block_key(block.number),
            serde_json::to_vec(block).map_err(|e| IndexError::Decode(e.to_string()))?,
        ));
        ops.push(WriteOp::Put(
            block_hash_key(block.hash),
            block.number.to_be_bytes().to_vec(),
        ));

        for (tx_index, (tx, receipt)) in block.txs.iter().zip(receipts.iter()).enumerate() {
            let record = TxRecord {
                raw_tx: tx.clone(),
                receipt: receipt.clone(),
                block_number: block.number,
            };
            ops.push(WriteOp::Put(
                tx_key(tx.hash),
                serde_json::to_vec(&record).map_err(|e| IndexError::Decode(e.to_string()))?,
            ));
            ops.push(WriteOp::Put(
                address_key(tx.from, block.number, tx_index as u32),
                tx.hash.as_bytes().to_vec(),
            ));
            if let Some(to) = tx.to {
                ops.push(WriteOp::Put(
                    address_key(to, block.number, tx_index as u32),
                    tx.hash.as_bytes().to_vec(),
                ));
            }
            for log in &receipt.logs {
                ops.push(WriteOp::Put(
                    log_key(block.number, tx_index as u32, log.log_index),
                    serde_json::to_vec(log).map_err(|e| IndexError::Decode(e.to_string()))?,
                ));
            }
        }

        self.store.batch_write(ops).await?;
        Ok(())
    }

    pub async fn get_tx(&self, hash: H256) -> Result<Option<TxRecord>, IndexError> {
        match self.store.get(&tx_key(hash)).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(|e| IndexError::Decode(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Address transaction history, most-recent-first when `reverse` is set,
    /// capped at `limit`.
    pub async fn get_address_history(
        &self,
        address: Address,
        reverse: bool,
        limit: usize,
    ) -> Result<Vec<H256>, IndexError> {
        let mut entries = self.store.iterate_prefix(&address_prefix(address)).await?;
        if reverse {
            entries.reverse();
        }
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(_, v)| H256::from_slice(&v))
            .collect())
    }

    /// `eth_getLogs` (§4.4, §4.10): inclusive `[fromBlock, toBlock]` range
    /// scan over the `L/` prefix, post-filtered by address and topics.
    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, IndexError> {
        let span = filter.to_block.saturating_sub(filter.from_block) + 1;
        if span > MAX_LOG_BLOCK_RANGE {
            return Err(IndexError::RangeTooLarge(span));
        }
        if filter.topics.len() > 4 {
            return Err(IndexError::TooManyTopics(filter.topics.len()));
        }

        let mut out = Vec::new();
        for block_number in filter.from_block..=filter.to_block {
            let entries = self.store.iterate_prefix(&log_range_prefix(block_number)).await?;
            for (_, value) in entries {
                let log: Log =
                    serde_json::from_slice(&value).map_err(|e| IndexError::Decode(e.to_string()))?;
                if !matches_filter(&log, filter) {
                    continue;
                }
                out.push(log);
                if out.len() >= MAX_LOG_RESULTS {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }
}

fn matches_filter(log: &Log, filter: &LogFilter) -> bool {
    if let Some(addresses) = &filter.addresses {
        if !addresses.contains(&log.address) {
            return false;
        }
    }
    for (position, topic_filter) in filter.topics.iter().enumerate() {
        let Some(wanted) = topic_filter else { continue };
        match log.topics.get(position) {
            Some(actual) if wanted.contains(actual) => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryStore;

    fn sample_log(address: Address, topic: H256, block_number: u64, log_index: u32) -> Log {
        Log {
            address,
            topics: vec![topic],
            data: vec![],
            block_number,
            block_hash: H256::zero(),
            tx_hash: H256::zero(),
            log_index,
            tx_index: 0,
        }
    }

    #[tokio::test]
    async fn filters_by_address_and_topic() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let index = BlockIndex::new(store.clone());

        let a1 = Address::from_low_u64_be(1);
        let a2 = Address::from_low_u64_be(2);
        let t1 = H256::from_low_u64_be(1);

        store
            .put(
                log_key(5, 0, 0),
                serde_json::to_vec(&sample_log(a1, t1, 5, 0)).unwrap(),
            )
            .await
            .unwrap();
        store
            .put(
                log_key(5, 1, 1),
                serde_json::to_vec(&sample_log(a2, t1, 5, 1)).unwrap(),
            )
            .await
            .unwrap();
        store
            .put(
                log_key(5, 2, 2),
                serde_json::to_vec(&sample_log(a1, t1, 5, 2)).unwrap(),
            )
            .await
            .unwrap();

        let filter = LogFilter {
            from_block: 5,
            to_block: 5,
            addresses: Some(vec![a1]),
            topics: vec![Some(vec![t1])],
        };
        let logs = index.get_logs(&filter).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.address == a1));
    }

    #[tokio::test]
    async fn rejects_oversized_block_range() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let index = BlockIndex::new(store);
        let filter = LogFilter {
            from_block: 0,
            to_block: MAX_LOG_BLOCK_RANGE,
            addresses: None,
            topics: vec![],
        };
        assert!(matches!(
            index.get_logs(&filter).await,
            Err(IndexError::RangeTooLarge(_))
        ));
    }
}
