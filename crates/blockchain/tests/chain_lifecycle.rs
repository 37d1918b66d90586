//! End-to-end propose/apply and snapshot-sync scenarios (§8).

use std::sync::Arc;

use coc_blockchain::{ChainEngine, Mempool, SignatureMode};
use coc_common::{H256, U256};
use coc_storage::backend::memory::InMemoryStore;
use coc_storage::{BlockIndex, KvStore};
use coc_vm::ExecutionEngine;

fn new_engine() -> (ChainEngine, Arc<BlockIndex>) {
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
    let index = Arc::new(BlockIndex::new(store));
    let evm = Arc::new(ExecutionEngine::create(7));
    let mempool = Arc::new(Mempool::new(7, U256::zero()));
    let engine = ChainEngine::new(
        7,
        H256::zero(),
        vec![],
        2,
        SignatureMode::Off,
        evm,
        index.clone(),
        mempool,
        Box::new(|| 10_000_000),
    );
    (engine, index)
}

#[tokio::test]
async fn proposes_a_run_of_empty_blocks_and_finalizes() {
    let (engine, _index) = new_engine();
    for _ in 0..5 {
        engine.propose_next_block(50, |_| None).await.unwrap();
    }
    assert_eq!(engine.height(), 5);
    // finality_depth = 2: height 5 finalizes up to 3.
    assert_eq!(engine.finalized_height(), 3);
}

#[tokio::test]
async fn rejects_a_block_proposed_out_of_sequence() {
    let (engine, _index) = new_engine();
    engine.propose_next_block(50, |_| None).await.unwrap();

    let mut skipped = coc_common::Block {
        number: 3,
        hash: H256::zero(),
        parent_hash: engine.tip_hash(),
        proposer: engine.expected_proposer(3),
        timestamp_ms: 20_000_000,
        txs: vec![],
        base_fee: U256::from(coc_blockchain::GENESIS_BASE_FEE_WEI),
        gas_used: U256::zero(),
        cumulative_weight: 2,
        finalized: false,
        signature: None,
    };
    skipped.hash = skipped.compute_hash();

    let result = engine.apply_block(skipped, true).await;
    assert!(result.is_err());
    assert_eq!(engine.height(), 1);
}

#[tokio::test]
async fn adopts_a_longer_verified_snapshot() {
    let (local, _local_index) = new_engine();
    local.propose_next_block(50, |_| None).await.unwrap();
    assert_eq!(local.height(), 1);

    let (remote, remote_index) = new_engine();
    for _ in 0..4 {
        remote.propose_next_block(50, |_| None).await.unwrap();
    }
    assert_eq!(remote.height(), 4);

    let mut blocks = Vec::new();
    for number in 1..=remote.height() {
        let block = remote_index.get_block(number).await.unwrap().unwrap();
        blocks.push(block);
    }

    // Both engines use an empty validator set, so every node is its own
    // expected proposer and `remote`'s chain verifies fine under `local`'s
    // rules even though the two never shared a signer.
    let adopted = local.maybe_adopt_snapshot(blocks).await.unwrap();
    assert!(adopted);
    assert_eq!(local.height(), 4);
}

#[tokio::test]
async fn does_not_adopt_a_shorter_snapshot() {
    let (local, _local_index) = new_engine();
    for _ in 0..3 {
        local.propose_next_block(50, |_| None).await.unwrap();
    }

    let (remote, remote_index) = new_engine();
    remote.propose_next_block(50, |_| None).await.unwrap();
    let block = remote_index.get_block(1).await.unwrap().unwrap();

    let adopted = local.maybe_adopt_snapshot(vec![block]).await.unwrap();
    assert!(!adopted);
    assert_eq!(local.height(), 3);
}
