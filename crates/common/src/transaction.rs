//! Transaction payload and mempool entry types (§3 `Transaction`, `MempoolEntry`).
//!
//! The EVM execution engine (C6) owns full EIP-155/1559 decode/validate
//! semantics; this crate only carries the fields the chain engine and
//! mempool need without re-executing the transaction.

use serde::{Deserialize, Serialize};

use crate::{Address, H256, U256};

/// A signed transaction as admitted to the mempool. `raw` is the exact wire
/// encoding handed to the EVM at apply time; the remaining fields are parsed
/// out once at admission so the mempool never has to re-decode `raw`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas_price: U256,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub gas_limit: u64,
    pub value: U256,
    pub chain_id: u64,
    #[serde(with = "hex_bytes")]
    pub raw: Vec<u8>,
}

impl RawTransaction {
    /// `effectiveGasPrice(tx, baseFee)`: for legacy/EIP-2930 txs this is the
    /// flat `gasPrice`; for EIP-1559 txs it is `min(maxFeePerGas, baseFee + maxPriorityFeePerGas)`.
    pub fn effective_gas_price(&self, base_fee: U256) -> U256 {
        match (self.max_fee_per_gas, self.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority)) => {
                let capped_priority = max_fee.saturating_sub(base_fee).min(priority);
                (base_fee + capped_priority).min(max_fee)
            }
            _ => self.gas_price,
        }
    }
}

/// A pool-resident transaction, keyed by sender so the mempool can enforce
/// per-sender nonce ordering (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolEntry {
    pub hash: H256,
    pub from: Address,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub raw_tx: RawTransaction,
}

pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
