use std::sync::Arc;

use coc_common::Address;
use coc_pose::{accept_receipt, ChallengeIssuer, ReplayRegistry};
use coc_storage::backend::memory::InMemoryStore;
use coc_storage::KvStore;
use rand::rngs::OsRng;
use secp256k1::{PublicKey, SecretKey, SECP256K1};

fn keypair() -> (SecretKey, Address, Vec<u8>) {
    let sk = SecretKey::new(&mut OsRng);
    let pk = PublicKey::from_secret_key(SECP256K1, &sk);
    let uncompressed = pk.serialize_uncompressed();
    let hash = coc_common::keccak256(&uncompressed[1..]);
    (sk, Address::from_slice(&hash.as_bytes()[12..]), pk.serialize().to_vec())
}

/// A full challenge -> receipt -> replay round trip against a KV-backed
/// replay registry, including recovery of the durable set after "restart".
#[tokio::test]
async fn challenge_and_receipt_round_trip_with_durable_replay() {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
    let issuer = ChallengeIssuer::new(5);
    let replay = ReplayRegistry::new(store.clone(), 10_000);

    let (challenger_sk, _challenger_addr, challenger_pubkey) = keypair();
    let (node_sk, node_addr, _node_pubkey) = keypair();
    let node_id = coc_common::H256::from_low_u64_be(42);

    let challenge = issuer
        .issue(node_id, 0, 1_000, 7, &challenger_pubkey, &challenger_sk)
        .expect("quota not exhausted");

    let mut receipt = coc_common::ReceiptMessage {
        challenge_id: challenge.challenge_id,
        node_id,
        response_at_ms: 1_200,
        response_body: vec![9, 9, 9],
        node_sig: vec![],
    };
    let sig = coc_crypto::sign(&coc_pose::receipt_message(&receipt), &node_sk).unwrap();
    receipt.node_sig = sig.to_vec();

    accept_receipt(&issuer, &replay, Some(&challenge), &receipt, node_addr, 5_000).expect("valid receipt accepted");
    replay.persist(coc_common::ReceiptMessage::replay_key(receipt.challenge_id), receipt.response_at_ms).await.unwrap();

    // Simulate a restart: a fresh in-memory mirror reloaded from the store
    // must still reject the same receipt as a replay.
    let reloaded = ReplayRegistry::new(store, 10_000);
    reloaded.load().await.unwrap();
    assert!(!reloaded.check_and_record(coc_common::ReceiptMessage::replay_key(receipt.challenge_id), receipt.response_at_ms));
}

/// A receipt whose `challengeId` does not match any issued challenge is rejected.
#[tokio::test]
async fn rejects_receipt_for_unknown_challenge() {
    let issuer = ChallengeIssuer::new(5);
    let replay = ReplayRegistry::in_memory();
    let (node_sk, node_addr, _pubkey) = keypair();

    let mut receipt = coc_common::ReceiptMessage {
        challenge_id: coc_common::H256::from_low_u64_be(999),
        node_id: coc_common::H256::from_low_u64_be(1),
        response_at_ms: 1_200,
        response_body: vec![],
        node_sig: vec![],
    };
    let sig = coc_crypto::sign(&coc_pose::receipt_message(&receipt), &node_sk).unwrap();
    receipt.node_sig = sig.to_vec();

    let err = accept_receipt(&issuer, &replay, None, &receipt, node_addr, 5_000).unwrap_err();
    assert!(matches!(err, coc_pose::PoseError::ChallengeNotFound));
}
