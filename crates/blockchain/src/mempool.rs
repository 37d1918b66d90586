//! Mempool (C5, §4.5): nonce-ordered, gas-priority transaction pool with
//! pending-nonce tracking. Thread-safe via an internal lock (§5); reads and
//! writes are both served from the same `parking_lot::RwLock` since mempool
//! operations never suspend on external I/O.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;

use coc_common::{Address, MempoolEntry, RawTransaction, H256, U256};

use crate::error::MempoolError;

#[derive(Debug, Default, Clone)]
pub struct MempoolStats {
    pub pending_count: usize,
    pub sender_count: usize,
}

struct SenderQueue {
    /// Queued transactions ordered by nonce; the mempool only ever offers
    /// the lowest-nonce entry (the "head") for inclusion.
    by_nonce: BTreeMap<u64, MempoolEntry>,
}

pub struct Mempool {
    chain_id: u64,
    min_gas_price: U256,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_sender: HashMap<Address, SenderQueue>,
    by_hash: HashSet<H256>,
}

impl Mempool {
    pub fn new(chain_id: u64, min_gas_price: U256) -> Self {
        Self {
            chain_id,
            min_gas_price,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Admits `raw_tx` into the pool. The caller (the RPC layer, at
    /// `eth_sendRawTransaction`) is responsible for decoding the raw
    /// envelope and recovering `from` from its signature before calling
    /// this; `add` re-validates the admission invariants that are the
    /// mempool's own responsibility: chain id, fee floor, duplicate hash,
    /// and nonce-too-low.
    pub fn add(&self, raw_tx: RawTransaction, onchain_nonce: u64) -> Result<(), MempoolError> {
        if raw_tx.chain_id != self.chain_id {
            return Err(MempoolError::ChainIdMismatch(self.chain_id));
        }
        if raw_tx.gas_price < self.min_gas_price
            && raw_tx.max_fee_per_gas.unwrap_or(raw_tx.gas_price) < self.min_gas_price
        {
            return Err(MempoolError::GasPriceTooLow);
        }
        if raw_tx.nonce < onchain_nonce {
            return Err(MempoolError::NonceTooLow);
        }

        let mut inner = self.inner.write();
        if inner.by_hash.contains(&raw_tx.hash) {
            return Err(MempoolError::AlreadyPending);
        }

        let entry = MempoolEntry {
            hash: raw_tx.hash,
            from: raw_tx.from,
            nonce: raw_tx.nonce,
            gas_price: raw_tx.gas_price,
            gas_limit: raw_tx.gas_limit,
            raw_tx,
        };
        inner.by_hash.insert(entry.hash);
        inner
            .by_sender
            .entry(entry.from)
            .or_insert_with(|| SenderQueue {
                by_nonce: BTreeMap::new(),
            })
            .by_nonce
            .insert(entry.nonce, entry);
        Ok(())
    }

    pub fn remove(&self, hash: H256) {
        let mut inner = self.inner.write();
        if !inner.by_hash.remove(&hash) {
            return;
        }
        let mut empty_sender = None;
        for (sender, queue) in inner.by_sender.iter_mut() {
            if let Some(nonce) = queue
                .by_nonce
                .iter()
                .find(|(_, e)| e.hash == hash)
                .map(|(n, _)| *n)
            {
                queue.by_nonce.remove(&nonce);
                if queue.by_nonce.is_empty() {
                    empty_sender = Some(*sender);
                }
                break;
            }
        }
        if let Some(sender) = empty_sender {
            inner.by_sender.remove(&sender);
        }
    }

    /// `onchainNonce + number of contiguous queued txs` for `addr` (§4.5, §8 invariant).
    pub fn pending_nonce(&self, addr: Address, onchain_nonce: u64) -> u64 {
        let inner = self.inner.read();
        let Some(queue) = inner.by_sender.get(&addr) else {
            return onchain_nonce;
        };
        let mut expected = onchain_nonce;
        for nonce in queue.by_nonce.keys() {
            if *nonce == expected {
                expected += 1;
            } else if *nonce > expected {
                break;
            }
        }
        expected
    }

    /// Selects up to `max_count` transactions, maximizing
    /// `effectiveGasPrice(tx, nextBaseFee)`, honoring per-sender nonce
    /// monotonicity: only the contiguous-from-onchain-nonce head of each
    /// sender's queue is eligible, and once a head tx is taken, the next one
    /// from that sender becomes eligible.
    pub fn pick_for_block<F>(
        &self,
        max_count: usize,
        onchain_nonce: F,
        next_base_fee: U256,
    ) -> Vec<RawTransaction>
    where
        F: Fn(Address) -> u64,
    {
        let inner = self.inner.read();
        let mut heads: HashMap<Address, u64> = HashMap::new();
        for sender in inner.by_sender.keys() {
            heads.insert(*sender, onchain_nonce(*sender));
        }

        let mut selected = Vec::new();
        loop {
            if selected.len() >= max_count {
                break;
            }
            let mut best: Option<(Address, U256)> = None;
            for (sender, expected_nonce) in heads.iter() {
                let Some(queue) = inner.by_sender.get(sender) else {
                    continue;
                };
                let Some(entry) = queue.by_nonce.get(expected_nonce) else {
                    continue;
                };
                let price = entry.raw_tx.effective_gas_price(next_base_fee);
                let is_better = match best {
                    None => true,
                    Some((_, best_price)) => price > best_price,
                };
                if is_better {
                    best = Some((*sender, price));
                }
            }
            let Some((sender, _)) = best else {
                break;
            };
            let expected_nonce = heads[&sender];
            let entry = inner.by_sender[&sender].by_nonce[&expected_nonce].clone();
            selected.push(entry.raw_tx);
            heads.insert(sender, expected_nonce + 1);
        }
        selected
    }

    pub fn stats(&self) -> MempoolStats {
        let inner = self.inner.read();
        MempoolStats {
            pending_count: inner.by_hash.len(),
            sender_count: inner.by_sender.len(),
        }
    }

    pub fn get_all(&self) -> Vec<MempoolEntry> {
        let inner = self.inner.read();
        inner
            .by_sender
            .values()
            .flat_map(|q| q.by_nonce.values().cloned())
            .collect()
    }

    pub fn contains(&self, hash: H256) -> bool {
        self.inner.read().by_hash.contains(&hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(from: Address, nonce: u64, gas_price: u64) -> RawTransaction {
        RawTransaction {
            hash: coc_common::keccak256(format!("{from:?}{nonce}").as_bytes()),
            from,
            to: None,
            nonce,
            gas_price: U256::from(gas_price),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            gas_limit: 21_000,
            value: U256::zero(),
            chain_id: 1,
            raw: vec![],
        }
    }

    #[test]
    fn rejects_nonce_below_onchain() {
        let pool = Mempool::new(1, U256::zero());
        let from = Address::from_low_u64_be(1);
        assert!(matches!(
            pool.add(tx(from, 0, 1), 1),
            Err(MempoolError::NonceTooLow)
        ));
    }

    #[test]
    fn rejects_duplicate_hash() {
        let pool = Mempool::new(1, U256::zero());
        let from = Address::from_low_u64_be(1);
        pool.add(tx(from, 0, 1), 0).unwrap();
        assert!(matches!(
            pool.add(tx(from, 0, 1), 0),
            Err(MempoolError::AlreadyPending)
        ));
    }

    #[test]
    fn pending_nonce_is_contiguous_range() {
        let pool = Mempool::new(1, U256::zero());
        let from = Address::from_low_u64_be(1);
        pool.add(tx(from, 0, 1), 0).unwrap();
        pool.add(tx(from, 1, 1), 0).unwrap();
        pool.add(tx(from, 3, 1), 0).unwrap(); // gap at nonce 2
        assert_eq!(pool.pending_nonce(from, 0), 2);
    }

    #[test]
    fn pick_for_block_respects_nonce_order_and_price() {
        let pool = Mempool::new(1, U256::zero());
        let from = Address::from_low_u64_be(1);
        pool.add(tx(from, 0, 5), 0).unwrap();
        pool.add(tx(from, 1, 100), 0).unwrap(); // higher price but not eligible until nonce 0 is taken
        let picked = pool.pick_for_block(1, |_| 0, U256::zero());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].nonce, 0);
    }
}
