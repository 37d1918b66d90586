//! Secp256k1 sign/recover and the canonical message builders for every
//! signed envelope in the system (§4.2).

use coc_common::{Address, H256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use serde_json::Value;

use crate::error::CryptoError;

/// A 65-byte recoverable ECDSA signature: `r(32) || s(32) || v(1)`.
pub type Signature65 = [u8; 65];

const ETH_SIGNED_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Wraps `message` in the Ethereum Signed Message prefix convention used for
/// every node-signed input, then hashes it.
fn eth_signed_message_hash(message: &[u8]) -> H256 {
    let prefixed = format!("{ETH_SIGNED_MESSAGE_PREFIX}{}", message.len());
    coc_common::keccak256_concat(&[prefixed.as_bytes(), message])
}

/// Signs `message` (after the Ethereum Signed Message prefix) with `secret_key`.
pub fn sign(message: &[u8], secret_key: &SecretKey) -> Result<Signature65, CryptoError> {
    let digest = eth_signed_message_hash(message);
    let msg = Message::from_digest_slice(digest.as_bytes())
        .map_err(|e| CryptoError::InvalidMessage(e.to_string()))?;
    let (recovery_id, sig) = SECP256K1
        .sign_ecdsa_recoverable(&msg, secret_key)
        .serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig);
    out[64] = recovery_id.to_i32() as u8;
    Ok(out)
}

/// Recovers the signing address from `message` and a 65-byte recoverable signature.
pub fn recover_address(message: &[u8], sig: &Signature65) -> Result<Address, CryptoError> {
    let digest = eth_signed_message_hash(message);
    let msg = Message::from_digest_slice(digest.as_bytes())
        .map_err(|e| CryptoError::InvalidMessage(e.to_string()))?;

    let recovery_id = RecoveryId::from_i32(sig[64] as i32)
        .map_err(|_| CryptoError::InvalidSignature("bad recovery id".into()))?;
    let recoverable = RecoverableSignature::from_compact(&sig[..64], recovery_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    let pubkey = SECP256K1
        .recover_ecdsa(&msg, &recoverable)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

    Ok(public_key_to_address(&pubkey))
}

/// Verifies that `sig` over `message` recovers to exactly `claimed_address`.
pub fn verify_node_sig(message: &[u8], sig: &Signature65, claimed_address: Address) -> bool {
    matches!(recover_address(message, sig), Ok(addr) if addr == claimed_address)
}

/// The 64 raw (x, y) bytes of an uncompressed public key, with the `0x04`
/// prefix stripped — the input both a node's `NodeId` and its signing
/// address are hashed from.
fn raw_pubkey_bytes(pubkey: &PublicKey) -> [u8; 64] {
    let uncompressed = pubkey.serialize_uncompressed();
    let mut out = [0u8; 64];
    out.copy_from_slice(&uncompressed[1..]);
    out
}

fn public_key_to_address(pubkey: &PublicKey) -> Address {
    // The address is the low 20 bytes of keccak256(pubkey).
    let hash = coc_common::keccak256(&raw_pubkey_bytes(pubkey));
    Address::from_slice(&hash.as_bytes()[12..])
}

/// Derives the address a secret key signs as, the way `cmd/coc-node` derives
/// this node's own identity from its persisted signer key at startup.
pub fn address_from_secret_key(secret_key: &SecretKey) -> Address {
    public_key_to_address(&PublicKey::from_secret_key(SECP256K1, secret_key))
}

/// Derives a node's `NodeId` (`keccak256(pubkey)`, §3 `NodeRecord`) from its
/// secret key. `self_node_id`/`proposer`/settlement `registerNode`'s pubkey
/// all share this one derivation, so a node's address is recoverable as the
/// low 20 bytes of its own `NodeId` (mirrors `block.proposer -> miner`).
pub fn node_id_from_secret_key(secret_key: &SecretKey) -> H256 {
    let pubkey = PublicKey::from_secret_key(SECP256K1, secret_key);
    coc_common::keccak256(&raw_pubkey_bytes(&pubkey))
}

/// The raw 64-byte public key for a secret key, in the encoding
/// `registerNode`'s `pubkey` field and `NodeId`/address derivation expect.
pub fn raw_pubkey_for_secret_key(secret_key: &SecretKey) -> Vec<u8> {
    let pubkey = PublicKey::from_secret_key(SECP256K1, secret_key);
    raw_pubkey_bytes(&pubkey).to_vec()
}

/// Canonical message for a proposer's block signature: `"block:" || hex(blockHash)`.
pub fn block_message(block_hash: H256) -> Vec<u8> {
    format!("block:0x{}", hex::encode(block_hash.as_bytes())).into_bytes()
}

/// Canonical message for a wire handshake:
/// `"wire:handshake:" || chainId || ":" || nodeId || ":" || nonce`.
pub fn wire_handshake_message(chain_id: u64, node_id: H256, nonce: u64) -> Vec<u8> {
    format!(
        "wire:handshake:{chain_id}:0x{}:{nonce}",
        hex::encode(node_id.as_bytes())
    )
    .into_bytes()
}

/// Canonical message for a PoSe HTTP auth envelope:
/// `"pose:http:" || path || ":" || senderId || ":" || tsMillis || ":" || nonce || ":" || hex(payloadHash)`.
///
/// `payload` must already have its `_auth` envelope stripped; it is hashed via
/// the canonical stable serializer so both ends agree byte-for-byte.
pub fn pose_http_message(path: &str, sender_id: &str, ts_millis: u64, nonce: u64, payload: &Value) -> Vec<u8> {
    let payload_hash = coc_common::keccak256(&coc_common::canonical_json_bytes(payload));
    format!(
        "pose:http:{path}:{sender_id}:{ts_millis}:{nonce}:0x{}",
        hex::encode(payload_hash.as_bytes())
    )
    .into_bytes()
}

/// Canonical message for a signed transaction envelope submitted via
/// `eth_sendRawTransaction`: `"tx:" || hex(keccak256(canonical-json unsigned fields))`.
pub fn tx_message(unsigned_fields_hash: H256) -> Vec<u8> {
    format!("tx:0x{}", hex::encode(unsigned_fields_hash.as_bytes())).into_bytes()
}

/// Canonical message for a settlement node-registration ownership proof:
/// `"pose:register:" || hex(operator) || ":" || hex(keccak256(pubkey))`. The
/// operator signs this to prove control of both the registering address and
/// the node's claimed pubkey before `registerNode` admits it (§4.13).
pub fn node_ownership_message(operator: Address, pubkey: &[u8]) -> Vec<u8> {
    let pubkey_hash = coc_common::keccak256(pubkey);
    format!(
        "pose:register:0x{}:0x{}",
        hex::encode(operator.as_bytes()),
        hex::encode(pubkey_hash.as_bytes())
    )
    .into_bytes()
}

/// Canonical message for `eth_signTypedData_v4`:
/// `"typed-data:" || hex(keccak256(canonical-json {domain,types,primaryType,message}))`,
/// the same "hash the canonical JSON, then tag it" pattern as every other
/// signed envelope in the system (§4.2, §4.10). There is no ABI-encoded
/// `hashStruct` here; the non-canonical "hash the raw JSON bytes" variant is
/// forbidden precisely because it is not this — callers must hash through
/// `coc_common::canonical_json_bytes` first.
pub fn typed_data_message(canonical_hash: H256) -> Vec<u8> {
    format!("typed-data:0x{}", hex::encode(canonical_hash.as_bytes())).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn keypair() -> (SecretKey, Address) {
        let secret_key = SecretKey::new(&mut OsRng);
        let pubkey = PublicKey::from_secret_key(SECP256K1, &secret_key);
        (secret_key, public_key_to_address(&pubkey))
    }

    #[test]
    fn sign_and_recover_round_trip() {
        let (sk, addr) = keypair();
        let msg = block_message(H256::from([7u8; 32]));
        let sig = sign(&msg, &sk).unwrap();
        assert_eq!(recover_address(&msg, &sig).unwrap(), addr);
        assert!(verify_node_sig(&msg, &sig, addr));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let (sk, addr) = keypair();
        let msg = block_message(H256::from([7u8; 32]));
        let sig = sign(&msg, &sk).unwrap();
        let other_msg = block_message(H256::from([8u8; 32]));
        assert!(!verify_node_sig(&other_msg, &sig, addr));
    }

    #[test]
    fn wire_handshake_message_is_stable() {
        let m1 = wire_handshake_message(1, H256::zero(), 42);
        let m2 = wire_handshake_message(1, H256::zero(), 42);
        assert_eq!(m1, m2);
    }
}
