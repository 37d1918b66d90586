//! Hex-quantity parsing/encoding helpers for the Ethereum JSON-RPC wire
//! format: `0x`-prefixed, big-endian, no leading zeroes on quantities.

use coc_common::{Address, BatchRecord, Block, Log, NodeRecord, RawTransaction, Receipt, SampleProof, H256, U256};
use serde_json::{json, Value};

use crate::error::RpcErr;

pub fn parse_u64(v: &Value) -> Result<u64, RpcErr> {
    let s = v.as_str().ok_or_else(|| RpcErr::InvalidParams("expected a hex string".into()))?;
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(if s.is_empty() { "0" } else { s }, 16)
        .map_err(|_| RpcErr::InvalidParams(format!("invalid hex quantity: {v}")))
}

pub fn parse_u32(v: &Value) -> Result<u32, RpcErr> {
    Ok(parse_u64(v)? as u32)
}

pub fn parse_u256(v: &Value) -> Result<U256, RpcErr> {
    let s = v.as_str().ok_or_else(|| RpcErr::InvalidParams("expected a hex string".into()))?;
    U256::from_str_radix(s, 16).map_err(|_| RpcErr::InvalidParams(format!("invalid hex quantity: {v}")))
}

pub fn parse_address(v: &Value) -> Result<Address, RpcErr> {
    let s = v.as_str().ok_or_else(|| RpcErr::InvalidParams("expected an address".into()))?;
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|_| RpcErr::InvalidParams(format!("invalid address: {s}")))?;
    if bytes.len() != 20 {
        return Err(RpcErr::InvalidParams(format!("address must be 20 bytes: {s}")));
    }
    Ok(Address::from_slice(&bytes))
}

pub fn parse_h256(v: &Value) -> Result<H256, RpcErr> {
    let s = v.as_str().ok_or_else(|| RpcErr::InvalidParams("expected a 32-byte hex value".into()))?;
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|_| RpcErr::InvalidParams(format!("invalid hash: {s}")))?;
    if bytes.len() != 32 {
        return Err(RpcErr::InvalidParams(format!("hash must be 32 bytes: {s}")));
    }
    Ok(H256::from_slice(&bytes))
}

pub fn parse_bytes(v: &Value) -> Result<Vec<u8>, RpcErr> {
    let s = v.as_str().ok_or_else(|| RpcErr::InvalidParams("expected a hex byte string".into()))?;
    hex::decode(s.trim_start_matches("0x")).map_err(|_| RpcErr::InvalidParams(format!("invalid hex bytes: {s}")))
}

/// Resolves an `eth_*` block tag (`"latest"`, `"pending"`, `"earliest"`, or a
/// hex quantity) against the current chain height, per §4.10.
pub fn parse_block_tag(v: Option<&Value>, current_height: u64) -> Result<u64, RpcErr> {
    match v.and_then(Value::as_str) {
        None | Some("latest") | Some("pending") => Ok(current_height),
        Some("earliest") => Ok(0),
        Some(_) => parse_u64(v.unwrap()),
    }
}

pub fn enc_u64(v: u64) -> Value {
    json!(format!("0x{v:x}"))
}

pub fn enc_u256(v: U256) -> Value {
    json!(format!("0x{v:x}"))
}

pub fn enc_address(v: Address) -> Value {
    json!(format!("0x{}", hex::encode(v.as_bytes())))
}

pub fn enc_h256(v: H256) -> Value {
    json!(format!("0x{}", hex::encode(v.as_bytes())))
}

pub fn enc_bytes(v: &[u8]) -> Value {
    json!(format!("0x{}", hex::encode(v)))
}

pub fn tx_to_json(tx: &RawTransaction, block_number: Option<u64>, tx_index: Option<u32>) -> Value {
    json!({
        "hash": enc_h256(tx.hash),
        "from": enc_address(tx.from),
        "to": tx.to.map(enc_address),
        "nonce": enc_u64(tx.nonce),
        "gasPrice": enc_u256(tx.gas_price),
        "maxFeePerGas": tx.max_fee_per_gas.map(enc_u256),
        "maxPriorityFeePerGas": tx.max_priority_fee_per_gas.map(enc_u256),
        "gas": enc_u64(tx.gas_limit),
        "value": enc_u256(tx.value),
        "chainId": enc_u64(tx.chain_id),
        "input": enc_bytes(&tx.raw),
        "blockNumber": block_number.map(enc_u64),
        "transactionIndex": tx_index.map(enc_u64),
    })
}

pub fn log_to_json(log: &Log) -> Value {
    json!({
        "address": enc_address(log.address),
        "topics": log.topics.iter().map(|t| enc_h256(*t)).collect::<Vec<_>>(),
        "data": enc_bytes(&log.data),
        "blockNumber": enc_u64(log.block_number),
        "blockHash": enc_h256(log.block_hash),
        "transactionHash": enc_h256(log.tx_hash),
        "transactionIndex": enc_u64(log.tx_index),
        "logIndex": enc_u64(log.log_index),
        "removed": false,
    })
}

pub fn receipt_to_json(receipt: &Receipt, tx: &RawTransaction, tx_index: u32) -> Value {
    json!({
        "transactionHash": enc_h256(receipt.tx_hash),
        "transactionIndex": enc_u64(tx_index),
        "blockHash": enc_h256(receipt.block_hash),
        "blockNumber": enc_u64(receipt.block_number),
        "from": enc_address(tx.from),
        "to": tx.to.map(enc_address),
        "status": enc_u64(receipt.status as u64),
        "gasUsed": enc_u64(receipt.gas_used),
        "cumulativeGasUsed": enc_u64(receipt.gas_used),
        "effectiveGasPrice": enc_u256(receipt.effective_gas_price),
        "logsBloom": enc_bytes(&receipt.logs_bloom),
        "logs": receipt.logs.iter().map(log_to_json).collect::<Vec<_>>(),
    })
}

pub fn sample_proof_to_json(proof: &SampleProof) -> Value {
    json!({
        "leaf": enc_h256(proof.leaf),
        "merkleProof": proof.merkle_proof.iter().map(|h| enc_h256(*h)).collect::<Vec<_>>(),
        "leafIndex": enc_u64(proof.leaf_index as u64),
    })
}

pub fn parse_sample_proof(v: &Value) -> Result<SampleProof, RpcErr> {
    let leaf = parse_h256(v.get("leaf").ok_or_else(|| RpcErr::InvalidParams("sample proof missing leaf".into()))?)?;
    let leaf_index = parse_u32(
        v.get("leafIndex")
            .ok_or_else(|| RpcErr::InvalidParams("sample proof missing leafIndex".into()))?,
    )?;
    let merkle_proof = v
        .get("merkleProof")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcErr::InvalidParams("sample proof missing merkleProof".into()))?
        .iter()
        .map(parse_h256)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SampleProof { leaf, merkle_proof, leaf_index })
}

pub fn node_record_to_json(node: &NodeRecord) -> Value {
    json!({
        "nodeId": enc_h256(node.node_id),
        "operator": enc_address(node.operator),
        "pubkey": enc_bytes(&node.pubkey),
        "serviceFlags": node.service_flags,
        "serviceCommitment": enc_h256(node.service_commitment),
        "endpointCommitment": enc_h256(node.endpoint_commitment),
        "bondAmount": enc_u256(node.bond_amount),
        "metadataHash": enc_h256(node.metadata_hash),
        "registeredAtEpoch": enc_u64(node.registered_at_epoch),
        "unlockEpoch": enc_u64(node.unlock_epoch),
        "active": node.active,
        "unbondRequested": node.unbond_requested,
    })
}

pub fn batch_record_to_json(batch: &BatchRecord) -> Value {
    json!({
        "batchId": enc_h256(batch.batch_id),
        "epochId": enc_u64(batch.epoch_id),
        "merkleRoot": enc_h256(batch.merkle_root),
        "summaryHash": enc_h256(batch.summary_hash),
        "aggregator": enc_h256(batch.aggregator),
        "submittedAtEpoch": enc_u64(batch.submitted_at_epoch),
        "disputeDeadlineEpoch": enc_u64(batch.dispute_deadline_epoch),
        "finalized": batch.finalized,
        "disputed": batch.disputed,
        "sampleProofs": batch.sample_proofs.iter().map(sample_proof_to_json).collect::<Vec<_>>(),
    })
}

pub fn block_to_json(block: &Block, full_txs: bool) -> Value {
    let txs: Vec<Value> = if full_txs {
        block
            .txs
            .iter()
            .enumerate()
            .map(|(i, tx)| tx_to_json(tx, Some(block.number), Some(i as u32)))
            .collect()
    } else {
        block.txs.iter().map(|tx| enc_h256(tx.hash)).collect()
    };

    json!({
        "number": enc_u64(block.number),
        "hash": enc_h256(block.hash),
        "parentHash": enc_h256(block.parent_hash),
        "proposer": enc_h256(block.proposer),
        "miner": enc_address(Address::from_slice(&block.proposer.as_bytes()[12..])),
        "timestamp": enc_u64(block.timestamp_ms / 1000),
        "timestampMs": enc_u64(block.timestamp_ms),
        "baseFeePerGas": enc_u256(block.base_fee),
        "gasUsed": enc_u256(block.gas_used),
        "gasLimit": enc_u64(coc_common::BLOCK_GAS_LIMIT),
        "cumulativeWeight": enc_u64(block.cumulative_weight),
        "finalized": block.finalized,
        "transactions": txs,
    })
}
