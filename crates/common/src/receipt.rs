//! Transaction receipt and log entities (§3 `Receipt`).

use serde::{Deserialize, Serialize};

use crate::{keccak256, Address, H256, U256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    #[serde(with = "crate::transaction::hex_bytes")]
    pub data: Vec<u8>,
    pub block_number: u64,
    pub block_hash: H256,
    pub tx_hash: H256,
    pub log_index: u32,
    pub tx_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: H256,
    pub block_number: u64,
    pub block_hash: H256,
    pub status: bool,
    pub gas_used: u64,
    pub logs: Vec<Log>,
    pub logs_bloom: [u8; 256],
    pub effective_gas_price: U256,
}

/// Standard Ethereum bloom filter over a log's address and topics: each
/// item contributes 3 set bits, derived from the low 11 bits of each of the
/// first three 16-bit halves of its keccak256 hash.
pub fn logs_bloom(logs: &[Log]) -> [u8; 256] {
    let mut bloom = [0u8; 256];
    for log in logs {
        bloom_add(&mut bloom, log.address.as_bytes());
        for topic in &log.topics {
            bloom_add(&mut bloom, topic.as_bytes());
        }
    }
    bloom
}

fn bloom_add(bloom: &mut [u8; 256], data: &[u8]) {
    let hash = keccak256(data);
    let hash = hash.as_bytes();
    for chunk in [0usize, 2, 4] {
        let bit = (((hash[chunk] as usize) << 8) | hash[chunk + 1] as usize) & 0x7ff;
        let byte_pos = 255 - bit / 8;
        let bit_pos = bit % 8;
        bloom[byte_pos] |= 1 << bit_pos;
    }
}
