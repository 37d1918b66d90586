//! Block entity and its canonical hash preimage (§3, §4.7).

use serde::{Deserialize, Serialize};

use crate::hash::keccak256_concat;
use crate::transaction::RawTransaction;
use crate::{NodeId, H256, U256};

/// A proposed or applied block.
///
/// `hash` binds `number`, `parentHash`, `proposer`, `timestampMs`, the joined
/// tx hashes, `baseFee`, and `cumulativeWeight`. `gasUsed` is deliberately
/// excluded from the preimage: it is only known after EVM execution and is
/// verified against the declared value post-apply for remote blocks (§4.7
/// step 9), never bound into the hash itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: H256,
    pub parent_hash: H256,
    pub proposer: NodeId,
    pub timestamp_ms: u64,
    pub txs: Vec<RawTransaction>,
    pub base_fee: U256,
    pub gas_used: U256,
    pub cumulative_weight: u64,
    pub finalized: bool,
    pub signature: Option<[u8; 65]>,
}

impl Block {
    /// Recomputes the canonical hash preimage and returns its keccak256.
    /// `applyBlock` step 7 checks this equals the block's declared `hash`.
    pub fn compute_hash(&self) -> H256 {
        let txs_joined = self
            .txs
            .iter()
            .map(|tx| format!("0x{}", hex::encode(tx.hash.as_bytes())))
            .collect::<Vec<_>>()
            .join(",");

        keccak256_concat(&[
            &self.number.to_be_bytes(),
            self.parent_hash.as_bytes(),
            self.proposer.as_bytes(),
            &self.timestamp_ms.to_be_bytes(),
            txs_joined.as_bytes(),
            &u256_be(self.base_fee),
            &self.cumulative_weight.to_be_bytes(),
        ])
    }

    pub fn is_genesis(&self) -> bool {
        self.number == 1 && self.parent_hash == H256::zero()
    }
}

fn u256_be(v: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_block() -> Block {
        Block {
            number: 1,
            hash: H256::zero(),
            parent_hash: H256::zero(),
            proposer: H256::zero(),
            timestamp_ms: 1_000,
            txs: vec![],
            base_fee: U256::from(1_000_000_000u64),
            gas_used: U256::zero(),
            cumulative_weight: 1,
            finalized: false,
            signature: None,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let b = empty_block();
        assert_eq!(b.compute_hash(), b.compute_hash());
    }

    #[test]
    fn hash_ignores_gas_used() {
        let mut a = empty_block();
        let mut b = empty_block();
        a.gas_used = U256::from(21_000);
        b.gas_used = U256::from(999_999);
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn hash_changes_with_timestamp() {
        let mut a = empty_block();
        let b = empty_block();
        a.timestamp_ms += 1;
        assert_ne!(a.compute_hash(), b.compute_hash());
    }
}
