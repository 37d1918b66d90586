//! `eth_sendRawTransaction` / `eth_sendTransaction` / `eth_getTransactionByHash`
//! / `eth_getTransactionReceipt` (§4.10).
//!
//! There is no RLP codec in this system (§REDESIGN FLAGS: the wire format is
//! canonical JSON everywhere, not RLP). A "raw transaction" is the hex
//! encoding of a signed canonical-JSON envelope:
//!
//! ```json
//! {"to": "0x..", "nonce": "0x..", "gasPrice": "0x..", "maxFeePerGas": "0x..",
//!  "maxPriorityFeePerGas": "0x..", "gas": "0x..", "value": "0x..",
//!  "chainId": "0x..", "data": "0x..", "signature": "0x.. (65 bytes)"}
//! ```
//!
//! The signature covers every field above except itself, hashed via
//! [`coc_common::canonical_json_bytes`] and wrapped in
//! [`coc_crypto::tx_message`] — the same "hash the canonical JSON, then wrap
//! in a purpose-tagged message" pattern used for wire handshakes and PoSe
//! HTTP envelopes (§4.2). `from` is never trusted from the envelope; it is
//! always the address recovered from `signature`. The transaction's `hash`
//! is `keccak256` of the exact bytes submitted, so two callers submitting
//! byte-identical envelopes always agree on its id.

use coc_common::{canonical_json_bytes, keccak256, Address, RawTransaction, H256, U256};
use serde_json::{json, Value};

use crate::context::RpcApiContext;
use crate::encoding::{
    enc_address, enc_bytes, enc_h256, enc_u256, enc_u64, parse_address, parse_bytes, parse_h256,
    parse_u256, parse_u64, receipt_to_json, tx_to_json,
};
use crate::error::RpcErr;
use crate::types::RpcRequest;

/// The envelope fields covered by the signature, in a fixed field set so
/// both the sender and this node hash exactly the same JSON object.
fn unsigned_fields(v: &Value) -> Value {
    json!({
        "to": v.get("to").cloned().unwrap_or(Value::Null),
        "nonce": v.get("nonce").cloned().unwrap_or(Value::Null),
        "gasPrice": v.get("gasPrice").cloned().unwrap_or(Value::Null),
        "maxFeePerGas": v.get("maxFeePerGas").cloned().unwrap_or(Value::Null),
        "maxPriorityFeePerGas": v.get("maxPriorityFeePerGas").cloned().unwrap_or(Value::Null),
        "gas": v.get("gas").cloned().unwrap_or(Value::Null),
        "value": v.get("value").cloned().unwrap_or(Value::Null),
        "chainId": v.get("chainId").cloned().unwrap_or(Value::Null),
        "data": v.get("data").cloned().unwrap_or(Value::Null),
    })
}

fn parse_optional_u256(v: Option<&Value>) -> Result<Option<U256>, RpcErr> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(other) => Ok(Some(parse_u256(other)?)),
    }
}

fn parse_optional_address(v: Option<&Value>) -> Result<Option<Address>, RpcErr> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(other) => Ok(Some(parse_address(other)?)),
    }
}

/// Decodes and authenticates one signed raw-transaction envelope, recovering
/// `from` from its signature. `wire_bytes` is hashed verbatim to produce the
/// transaction's id, so re-submitting the same envelope always yields the
/// same hash (and therefore the mempool's duplicate check, not a new entry).
pub fn decode_raw_tx(wire_bytes: &[u8]) -> Result<RawTransaction, RpcErr> {
    let envelope: Value = serde_json::from_slice(wire_bytes)
        .map_err(|e| RpcErr::InvalidParams(format!("malformed transaction envelope: {e}")))?;

    let sig_hex = envelope
        .get("signature")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcErr::InvalidParams("transaction envelope missing signature".into()))?;
    let sig_bytes = hex::decode(sig_hex.trim_start_matches("0x"))
        .map_err(|_| RpcErr::InvalidParams("invalid signature hex".into()))?;
    if sig_bytes.len() != 65 {
        return Err(RpcErr::InvalidParams("signature must be 65 bytes".into()));
    }
    let mut sig = [0u8; 65];
    sig.copy_from_slice(&sig_bytes);

    let unsigned = unsigned_fields(&envelope);
    let unsigned_hash = keccak256(&canonical_json_bytes(&unsigned));
    let message = coc_crypto::tx_message(unsigned_hash);
    let from = coc_crypto::recover_address(&message, &sig)
        .map_err(|e| RpcErr::InvalidParams(format!("bad transaction signature: {e}")))?;

    let to = parse_optional_address(envelope.get("to"))?;
    let nonce = parse_u64(envelope.get("nonce").unwrap_or(&Value::Null))?;
    let gas_price = parse_optional_u256(envelope.get("gasPrice"))?.unwrap_or_default();
    let max_fee_per_gas = parse_optional_u256(envelope.get("maxFeePerGas"))?;
    let max_priority_fee_per_gas = parse_optional_u256(envelope.get("maxPriorityFeePerGas"))?;
    let gas_limit = parse_u64(envelope.get("gas").unwrap_or(&Value::Null))?;
    let value = parse_optional_u256(envelope.get("value"))?.unwrap_or_default();
    let chain_id = parse_u64(envelope.get("chainId").unwrap_or(&Value::Null))?;
    let data = match envelope.get("data") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => parse_bytes(v)?,
    };

    Ok(RawTransaction {
        hash: keccak256(wire_bytes),
        from,
        to,
        nonce,
        gas_price,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        gas_limit,
        value,
        chain_id,
        raw: data,
    })
}

pub fn send_raw_transaction(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let wire_bytes = parse_bytes(req.required_param(0, "signedTransactionData")?)?;
    let tx = decode_raw_tx(&wire_bytes)?;
    if tx.chain_id != ctx.chain_id {
        return Err(RpcErr::InvalidParams(format!(
            "chain id mismatch: node is {}, transaction is {}",
            ctx.chain_id, tx.chain_id
        )));
    }
    let onchain_nonce = ctx.evm.get_nonce(tx.from);
    let hash = tx.hash;
    ctx.mempool.add(tx, onchain_nonce)?;
    ctx.pending_tx_log.record(hash);
    Ok(enc_h256(hash))
}

/// Developer convenience (§4.10): signs with the node's attached
/// [`crate::context::DevSigner`] instead of requiring the caller to produce
/// a signed envelope themselves. Disabled when no dev signer is configured.
pub fn send_transaction(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let signer = ctx
        .dev_signer
        .as_ref()
        .ok_or_else(|| RpcErr::InvalidParams("no dev signer configured on this node".into()))?;
    let params = req.required_param(0, "transaction")?;

    let from = params
        .get("from")
        .map(parse_address)
        .transpose()?
        .unwrap_or(signer.address);
    if from != signer.address {
        return Err(RpcErr::InvalidParams(
            "eth_sendTransaction: from must be the node's dev signer address".into(),
        ));
    }

    let nonce = match params.get("nonce") {
        Some(v) if !v.is_null() => parse_u64(v)?,
        _ => ctx.mempool.pending_nonce(from, ctx.evm.get_nonce(from)),
    };
    let envelope_unsigned = json!({
        "to": params.get("to").cloned().unwrap_or(Value::Null),
        "nonce": enc_u64(nonce),
        "gasPrice": params.get("gasPrice").cloned().unwrap_or(json!("0x0")),
        "maxFeePerGas": params.get("maxFeePerGas").cloned().unwrap_or(Value::Null),
        "maxPriorityFeePerGas": params.get("maxPriorityFeePerGas").cloned().unwrap_or(Value::Null),
        "gas": params.get("gas").cloned().unwrap_or(json!("0x5208")),
        "value": params.get("value").cloned().unwrap_or(json!("0x0")),
        "chainId": enc_u64(ctx.chain_id),
        "data": params.get("data").cloned().unwrap_or(json!("0x")),
    });
    let unsigned_hash = keccak256(&canonical_json_bytes(&envelope_unsigned));
    let message = coc_crypto::tx_message(unsigned_hash);
    let sig = coc_crypto::sign(&message, &signer.secret_key)
        .map_err(|e| RpcErr::Internal(format!("dev signer failed: {e}")))?;

    let mut envelope = envelope_unsigned;
    envelope["signature"] = json!(format!("0x{}", hex::encode(sig)));
    let wire_bytes = serde_json::to_vec(&envelope).expect("envelope always serializes");

    let tx = decode_raw_tx(&wire_bytes)?;
    let onchain_nonce = ctx.evm.get_nonce(tx.from);
    let hash = tx.hash;
    ctx.mempool.add(tx, onchain_nonce)?;
    ctx.pending_tx_log.record(hash);
    Ok(enc_h256(hash))
}

fn pending_tx_json(entry: &coc_common::MempoolEntry) -> Value {
    let mut v = tx_to_json(&entry.raw_tx, None, None);
    v["blockHash"] = Value::Null;
    v
}

pub async fn get_transaction_by_hash(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let hash = parse_h256(req.required_param(0, "transactionHash")?)?;
    if let Some(record) = ctx.index.get_tx(hash).await? {
        return Ok(tx_to_json(&record.raw_tx, Some(record.block_number), None));
    }
    for entry in ctx.mempool.get_all() {
        if entry.hash == hash {
            return Ok(pending_tx_json(&entry));
        }
    }
    Ok(Value::Null)
}

pub async fn get_transaction_receipt(req: &RpcRequest, ctx: &RpcApiContext) -> Result<Value, RpcErr> {
    let hash = parse_h256(req.required_param(0, "transactionHash")?)?;
    match ctx.index.get_tx(hash).await? {
        Some(record) => {
            let tx_index = ctx
                .index
                .get_block(record.block_number)
                .await?
                .and_then(|b| b.txs.iter().position(|tx| tx.hash == hash))
                .unwrap_or(0) as u32;
            Ok(receipt_to_json(&record.receipt, &record.raw_tx, tx_index))
        }
        None => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    fn signer() -> (SecretKey, Address) {
        let sk = SecretKey::new(&mut OsRng);
        let pubkey = PublicKey::from_secret_key(SECP256K1, &sk);
        let uncompressed = pubkey.serialize_uncompressed();
        let hash = coc_common::keccak256(&uncompressed[1..]);
        (sk, Address::from_slice(&hash.as_bytes()[12..]))
    }

    fn signed_envelope(sk: &SecretKey, chain_id: u64, nonce: u64) -> Vec<u8> {
        let unsigned = json!({
            "to": "0x0000000000000000000000000000000000000042",
            "nonce": enc_u64(nonce),
            "gasPrice": "0x1",
            "maxFeePerGas": Value::Null,
            "maxPriorityFeePerGas": Value::Null,
            "gas": "0x5208",
            "value": "0x0",
            "chainId": enc_u64(chain_id),
            "data": "0x",
        });
        let unsigned_hash = keccak256(&canonical_json_bytes(&unsigned));
        let message = coc_crypto::tx_message(unsigned_hash);
        let sig = coc_crypto::sign(&message, sk).unwrap();
        let mut envelope = unsigned;
        envelope["signature"] = json!(format!("0x{}", hex::encode(sig)));
        serde_json::to_vec(&envelope).unwrap()
    }

    #[test]
    fn decodes_and_recovers_sender() {
        let (sk, addr) = signer();
        let wire = signed_envelope(&sk, 1, 0);
        let tx = decode_raw_tx(&wire).unwrap();
        assert_eq!(tx.from, addr);
        assert_eq!(tx.chain_id, 1);
        assert_eq!(tx.nonce, 0);
    }

    #[test]
    fn resubmitting_identical_bytes_is_the_same_hash() {
        let (sk, _) = signer();
        let wire = signed_envelope(&sk, 1, 0);
        let tx1 = decode_raw_tx(&wire).unwrap();
        let tx2 = decode_raw_tx(&wire).unwrap();
        assert_eq!(tx1.hash, tx2.hash);
    }

    #[test]
    fn tampered_envelope_recovers_a_different_sender() {
        let (sk, addr) = signer();
        let mut wire = signed_envelope(&sk, 1, 0);
        // Flip a byte in the JSON body, not the signature, to simulate tampering.
        let pos = wire.iter().position(|&b| b == b'1').unwrap();
        wire[pos] = b'2';
        let tx = decode_raw_tx(&wire).unwrap();
        assert_ne!(tx.from, addr);
    }

    #[test]
    fn rejects_missing_signature() {
        let envelope = json!({"nonce": "0x0"});
        let wire = serde_json::to_vec(&envelope).unwrap();
        assert!(matches!(decode_raw_tx(&wire), Err(RpcErr::InvalidParams(_))));
    }
}
