//! Receipt acceptance: signature, challenge binding, latency window, replay (§4.11).

use coc_common::{canonical_json_bytes, Address, ChallengeMessage, ReceiptMessage};
use coc_crypto::verify_node_sig;
use serde::Serialize;

use crate::challenge::ChallengeIssuer;
use crate::error::PoseError;
use crate::replay::ReplayRegistry;

/// The fields a node actually signs over: everything but its own signature.
#[derive(Serialize)]
struct ReceiptSigningPayload<'a> {
    challenge_id: coc_common::H256,
    node_id: coc_common::H256,
    response_at_ms: u64,
    #[serde(with = "coc_common_hex_ref")]
    response_body: &'a [u8],
}

mod coc_common_hex_ref {
    use serde::Serializer;
    pub fn serialize<S: Serializer>(bytes: &&[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }
}

/// Canonical message a node signs over a receipt: `keccak256(canonical(payload))`.
pub fn receipt_message(receipt: &ReceiptMessage) -> Vec<u8> {
    let payload = ReceiptSigningPayload {
        challenge_id: receipt.challenge_id,
        node_id: receipt.node_id,
        response_at_ms: receipt.response_at_ms,
        response_body: &receipt.response_body,
    };
    let value = serde_json::to_value(&payload).expect("ReceiptSigningPayload serializes");
    let hash = coc_common::keccak256(&canonical_json_bytes(&value));
    format!("pose:receipt:0x{}", hex::encode(hash.as_bytes())).into_bytes()
}

/// Verifies and accepts a receipt. `expected_signer` is the node operator's
/// address on record for `receipt.node_id` (looked up by the caller, e.g. in
/// the settlement node registry, since this crate doesn't own that state).
pub fn accept_receipt(
    issuer: &ChallengeIssuer,
    replay: &ReplayRegistry,
    challenge: Option<&ChallengeMessage>,
    receipt: &ReceiptMessage,
    expected_signer: Address,
    latency_window_ms: u64,
) -> Result<(), PoseError> {
    let node_sig: [u8; 65] = receipt
        .node_sig
        .as_slice()
        .try_into()
        .map_err(|_| PoseError::InvalidNodeSig)?;
    if !verify_node_sig(&receipt_message(receipt), &node_sig, expected_signer) {
        return Err(PoseError::InvalidNodeSig);
    }

    let issued = match challenge {
        Some(c) => c.clone(),
        None => issuer.lookup(receipt.challenge_id).ok_or(PoseError::ChallengeNotFound)?,
    };
    if issued.challenge_id != receipt.challenge_id {
        return Err(PoseError::ChallengeMismatch);
    }

    let elapsed = receipt.response_at_ms.saturating_sub(issued.issued_at_ms);
    if elapsed > latency_window_ms {
        return Err(PoseError::LatencyWindowExceeded);
    }

    let key = ReceiptMessage::replay_key(receipt.challenge_id);
    if !replay.check_and_record(key, receipt.response_at_ms) {
        return Err(PoseError::ReceiptReplayed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coc_common::{ChallengeMessage, H256};
    use coc_crypto::sign;
    use rand::rngs::OsRng;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    fn keypair() -> (SecretKey, Address) {
        let sk = SecretKey::new(&mut OsRng);
        let pk = PublicKey::from_secret_key(SECP256K1, &sk);
        let uncompressed = pk.serialize_uncompressed();
        let hash = coc_common::keccak256(&uncompressed[1..]);
        (sk, Address::from_slice(&hash.as_bytes()[12..]))
    }

    fn signed_receipt(sk: &SecretKey, challenge_id: H256, response_at_ms: u64) -> ReceiptMessage {
        let mut r = ReceiptMessage {
            challenge_id,
            node_id: H256::from_low_u64_be(1),
            response_at_ms,
            response_body: vec![1, 2, 3],
            node_sig: vec![],
        };
        let sig = sign(&receipt_message(&r), sk).unwrap();
        r.node_sig = sig.to_vec();
        r
    }

    #[test]
    fn accepts_a_valid_receipt_once() {
        let (sk, addr) = keypair();
        let issuer = ChallengeIssuer::new(10);
        let replay = ReplayRegistry::in_memory();
        let challenge_id = H256::from_low_u64_be(7);
        let challenge = ChallengeMessage {
            challenge_id,
            node_id: H256::from_low_u64_be(1),
            epoch_id: 0,
            issued_at_ms: 1_000,
            challenger_sig: vec![],
        };
        let receipt = signed_receipt(&sk, challenge_id, 1_500);

        accept_receipt(&issuer, &replay, Some(&challenge), &receipt, addr, 5_000).unwrap();
        assert!(matches!(
            accept_receipt(&issuer, &replay, Some(&challenge), &receipt, addr, 5_000),
            Err(PoseError::ReceiptReplayed)
        ));
    }

    #[test]
    fn rejects_response_outside_latency_window() {
        let (sk, addr) = keypair();
        let issuer = ChallengeIssuer::new(10);
        let replay = ReplayRegistry::in_memory();
        let challenge_id = H256::from_low_u64_be(7);
        let challenge = ChallengeMessage {
            challenge_id,
            node_id: H256::from_low_u64_be(1),
            epoch_id: 0,
            issued_at_ms: 1_000,
            challenger_sig: vec![],
        };
        let receipt = signed_receipt(&sk, challenge_id, 10_000);
        assert!(matches!(
            accept_receipt(&issuer, &replay, Some(&challenge), &receipt, addr, 5_000),
            Err(PoseError::LatencyWindowExceeded)
        ));
    }
}
