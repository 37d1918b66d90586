//! Chain engine (C7, §4.7) — the heart of the node: owns the canonical
//! chain, admits transactions, proposes blocks on our turn, validates and
//! applies externally-received blocks, persists state, computes finality.

use std::cell::Cell;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{info, warn};

use coc_common::{Block, Log, NodeId, Receipt, H256, U256};
use coc_crypto::{block_message, verify_node_sig, Signature65};
use coc_storage::BlockIndex;
use coc_vm::ExecutionEngine;

use crate::basefee::{next_base_fee, GENESIS_BASE_FEE_WEI};
use crate::error::ChainError;
use crate::mempool::Mempool;

tokio::task_local! {
    static IN_APPLY: Cell<bool>;
}

/// `off` never checks signatures; `monitor` logs violations but continues;
/// `enforce` rejects unsigned/invalid remote blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMode {
    Off,
    Monitor,
    Enforce,
}

/// Event stream emitted by the chain engine for RPC subscribers (§4.7 step 13).
#[derive(Debug, Clone)]
pub enum ChainEvent {
    NewBlock(Arc<Block>, Arc<Vec<Receipt>>),
    Log(Log),
}

struct Tip {
    number: u64,
    hash: H256,
    timestamp_ms: u64,
    cumulative_weight: u64,
    gas_used: u64,
    base_fee: U256,
    finalized_number: u64,
}

pub struct ChainEngine {
    chain_id: u64,
    self_node_id: NodeId,
    validators: Vec<NodeId>,
    finality_depth: u64,
    signature_mode: SignatureMode,
    now_fn: Box<dyn Fn() -> u64 + Send + Sync>,

    evm: Arc<ExecutionEngine>,
    index: Arc<BlockIndex>,
    mempool: Arc<Mempool>,

    tip: RwLock<Tip>,
    /// Serializes legitimate concurrent callers (RPC-triggered proposal,
    /// P2P-received block, WS handler side effects); held for the entire
    /// apply so no two applies interleave (§5).
    apply_lock: AsyncMutex<()>,
    events: broadcast::Sender<ChainEvent>,
}

impl ChainEngine {
    pub fn new(
        chain_id: u64,
        self_node_id: NodeId,
        validators: Vec<NodeId>,
        finality_depth: u64,
        signature_mode: SignatureMode,
        evm: Arc<ExecutionEngine>,
        index: Arc<BlockIndex>,
        mempool: Arc<Mempool>,
        now_fn: Box<dyn Fn() -> u64 + Send + Sync>,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            chain_id,
            self_node_id,
            validators,
            finality_depth,
            signature_mode,
            now_fn,
            evm,
            index,
            mempool,
            tip: RwLock::new(Tip {
                number: 0,
                hash: H256::zero(),
                timestamp_ms: 0,
                cumulative_weight: 0,
                gas_used: 0,
                base_fee: U256::from(GENESIS_BASE_FEE_WEI),
                finalized_number: 0,
            }),
            apply_lock: AsyncMutex::new(()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    pub fn height(&self) -> u64 {
        self.tip.read().number
    }

    pub fn tip_hash(&self) -> H256 {
        self.tip.read().hash
    }

    /// The tip's declared base fee, for `eth_gasPrice`/`eth_feeHistory` (§4.8, §4.10).
    pub fn base_fee(&self) -> U256 {
        self.tip.read().base_fee
    }

    /// Gas used by the most recently applied block, for `eth_feeHistory`'s
    /// `gasUsedRatio` column.
    pub fn tip_gas_used(&self) -> u64 {
        self.tip.read().gas_used
    }

    pub fn validators(&self) -> &[NodeId] {
        &self.validators
    }

    pub fn self_node_id(&self) -> NodeId {
        self.self_node_id
    }

    /// `expectedProposer(height) = validators[(height-1) mod N]`; an empty
    /// validator set means we are the sole proposer.
    pub fn expected_proposer(&self, height: u64) -> NodeId {
        if self.validators.is_empty() {
            return self.self_node_id;
        }
        let idx = ((height - 1) as usize) % self.validators.len();
        self.validators[idx]
    }

    /// Proposes and applies the next block: picks transactions from the
    /// mempool, builds an unsigned block, hashes and (if a signer is
    /// attached by the caller) signs it, then applies it locally. If apply
    /// fails, the offending transactions are dropped and an empty block at
    /// the same height is built and applied instead — this must not fail.
    pub async fn propose_next_block(
        &self,
        max_tx_per_block: usize,
        sign: impl Fn(H256) -> Option<Signature65>,
    ) -> Result<Arc<Block>, ChainError> {
        let (parent_number, parent_hash, parent_cumulative_weight, parent_gas_used, parent_base_fee) = {
            let tip = self.tip.read();
            (
                tip.number,
                tip.hash,
                tip.cumulative_weight,
                tip.gas_used,
                tip.base_fee,
            )
        };

        let next_base_fee_wei = if parent_number == 0 {
            U256::from(GENESIS_BASE_FEE_WEI)
        } else {
            next_base_fee(parent_base_fee, parent_gas_used)
        };

        let height = parent_number + 1;
        let txs = self
            .mempool
            .pick_for_block(max_tx_per_block, |addr| self.evm.get_nonce(addr), next_base_fee_wei);

        let block = self.build_and_sign_block(height, parent_hash, parent_cumulative_weight, &txs, next_base_fee_wei, &sign);

        match self.apply_block(block.clone(), false).await {
            Ok(applied) => Ok(applied),
            Err(_) => {
                warn!(height, "block application failed, falling back to empty block");
                for tx in &txs {
                    self.mempool.remove(tx.hash);
                }
                let empty_block = self.build_and_sign_block(
                    height,
                    parent_hash,
                    parent_cumulative_weight,
                    &[],
                    next_base_fee_wei,
                    &sign,
                );
                self.apply_block(empty_block, false).await
            }
        }
    }

    fn build_and_sign_block(
        &self,
        height: u64,
        parent_hash: H256,
        parent_cumulative_weight: u64,
        txs: &[coc_common::RawTransaction],
        base_fee: U256,
        sign: &impl Fn(H256) -> Option<Signature65>,
    ) -> Block {
        let mut block = Block {
            number: height,
            hash: H256::zero(),
            parent_hash,
            proposer: self.self_node_id,
            timestamp_ms: (self.now_fn)(),
            txs: txs.to_vec(),
            base_fee,
            gas_used: U256::zero(),
            cumulative_weight: parent_cumulative_weight + 1,
            finalized: false,
            signature: None,
        };
        block.hash = block.compute_hash();
        block.signature = sign(block.hash);
        block
    }

    /// The central state machine (§4.7 "Apply"). `is_remote` gates the
    /// checks that only apply to externally-received blocks (signature,
    /// timestamp, declared-vs-measured gasUsed) — a block we proposed
    /// ourselves is trusted for those by construction.
    pub async fn apply_block(&self, block: Block, is_remote: bool) -> Result<Arc<Block>, ChainError> {
        if IN_APPLY.try_with(|flag| flag.get()).unwrap_or(false) {
            return Err(ChainError::ReentrantApply);
        }

        let _permit = self.apply_lock.lock().await;
        IN_APPLY
            .scope(Cell::new(true), self.apply_block_locked(block, is_remote))
            .await
    }

    async fn apply_block_locked(&self, block: Block, is_remote: bool) -> Result<Arc<Block>, ChainError> {
        // Step 1: duplicate detection.
        if block.hash == self.tip.read().hash && block.number == self.tip.read().number && block.number != 0 {
            return Ok(Arc::new(block));
        }

        let (tip_number, tip_hash, tip_cumulative_weight) = {
            let tip = self.tip.read();
            (tip.number, tip.hash, tip.cumulative_weight)
        };

        // Step 2: block link.
        let is_genesis_case = tip_number == 0 && block.number == 1 && block.parent_hash == H256::zero();
        if !is_genesis_case && (block.number != tip_number + 1 || block.parent_hash != tip_hash) {
            return Err(ChainError::InvalidLink {
                expected_number: tip_number + 1,
                expected_parent: tip_hash,
            });
        }

        // Step 3: proposer matches expected proposer.
        if block.proposer != self.expected_proposer(block.number) {
            return Err(ChainError::InvalidProposer);
        }

        // Step 4: proposer signature (remote only).
        if is_remote && self.signature_mode != SignatureMode::Off {
            match &block.signature {
                None => {
                    if self.signature_mode == SignatureMode::Enforce {
                        return Err(ChainError::MissingSignature);
                    }
                    warn!(number = block.number, "remote block missing signature (monitor mode)");
                }
                Some(sig) => {
                    let addr = coc_common::Address::from_slice(&block.proposer.as_bytes()[12..]);
                    if !verify_node_sig(&block_message(block.hash), sig, addr) {
                        return Err(ChainError::InvalidSignature);
                    }
                }
            }
        }

        // Step 5: timestamp (remote only).
        if is_remote {
            let now = (self.now_fn)();
            let parent_timestamp = if is_genesis_case { 0 } else { self.tip.read().timestamp_ms };
            if block.timestamp_ms <= parent_timestamp || block.timestamp_ms > now + 60_000 {
                return Err(ChainError::InvalidTimestamp);
            }
        }

        // Step 6: cumulative weight (uniform variant).
        let expected_weight = if is_genesis_case { 1 } else { tip_cumulative_weight + 1 };
        if block.cumulative_weight != expected_weight {
            return Err(ChainError::InvalidLink {
                expected_number: tip_number + 1,
                expected_parent: tip_hash,
            });
        }

        // Step 7: recomputed hash.
        if block.compute_hash() != block.hash {
            return Err(ChainError::InvalidHash);
        }

        // Step 8: execute every tx sequentially.
        let mut receipts = Vec::with_capacity(block.txs.len());
        let mut total_gas_used: u64 = 0;
        for (tx_index, tx) in block.txs.iter().enumerate() {
            let result = self
                .evm
                .execute_raw_tx(tx, block.number, tx_index as u32, block.hash, block.base_fee)
                .map_err(ChainError::Evm)?;
            total_gas_used += result.gas_used;
            if total_gas_used > coc_common::BLOCK_GAS_LIMIT {
                return Err(ChainError::GasLimitExceeded {
                    used: total_gas_used,
                    limit: coc_common::BLOCK_GAS_LIMIT,
                });
            }
            if let Some(receipt) = self.evm.get_receipt(tx.hash) {
                receipts.push(receipt);
            }
        }

        // Step 9: declared vs measured gasUsed (remote only).
        if is_remote && !block.gas_used.is_zero() && block.gas_used != U256::from(total_gas_used) {
            return Err(ChainError::GasUsedMismatch {
                declared: block.gas_used.as_u64(),
                measured: total_gas_used,
            });
        }

        let mut applied = block;
        applied.gas_used = U256::from(total_gas_used);

        // Step 10: append, persist receipts, drop included txs from mempool.
        if let Err(e) = self.index.put_applied_block(&applied, &receipts).await {
            // Step 12: persistence failure is logged, not rolled back — memory
            // stays the source of truth for the remainder of the session.
            warn!(error = %e, number = applied.number, "failed to persist applied block");
        }
        for tx in &applied.txs {
            self.mempool.remove(tx.hash);
        }

        // Step 11: recompute finality, scanning only from the boundary down.
        let finalized_number = applied.number.saturating_sub(self.finality_depth);

        {
            let mut tip = self.tip.write();
            tip.number = applied.number;
            tip.hash = applied.hash;
            tip.timestamp_ms = applied.timestamp_ms;
            tip.cumulative_weight = applied.cumulative_weight;
            tip.gas_used = total_gas_used;
            tip.base_fee = applied.base_fee;
            if applied.number >= self.finality_depth {
                tip.finalized_number = finalized_number;
            }
        }

        info!(number = applied.number, hash = ?applied.hash, txs = applied.txs.len(), "block applied");

        // Step 13: emit events for subscribers.
        let receipts = Arc::new(receipts);
        let applied = Arc::new(applied);
        let _ = self.events.send(ChainEvent::NewBlock(applied.clone(), receipts.clone()));
        for receipt in receipts.iter() {
            for log in &receipt.logs {
                let _ = self.events.send(ChainEvent::Log(log.clone()));
            }
        }

        Ok(applied)
    }

    /// Accepts a snapshot sync candidate only if its tip exceeds ours and
    /// the entire chain verifies (§4.7 `maybeAdoptSnapshot`).
    pub async fn maybe_adopt_snapshot(&self, blocks: Vec<Block>) -> Result<bool, ChainError> {
        let Some(candidate_tip) = blocks.last() else {
            return Ok(false);
        };
        if candidate_tip.number <= self.height() {
            return Ok(false);
        }
        if !self.verify_block_chain(&blocks) {
            return Ok(false);
        }

        self.evm.reset_execution();
        {
            let mut tip = self.tip.write();
            *tip = Tip {
                number: 0,
                hash: H256::zero(),
                timestamp_ms: 0,
                cumulative_weight: 0,
                gas_used: 0,
                base_fee: U256::from(GENESIS_BASE_FEE_WEI),
                finalized_number: 0,
            };
        }
        for block in blocks {
            self.apply_block(block, true).await?;
        }
        Ok(true)
    }

    fn verify_block_chain(&self, blocks: &[Block]) -> bool {
        let mut prev: Option<&Block> = None;
        for block in blocks {
            if block.compute_hash() != block.hash {
                return false;
            }
            match prev {
                None => {
                    if !block.is_genesis() {
                        return false;
                    }
                }
                Some(parent) => {
                    if block.parent_hash != parent.hash
                        || block.number != parent.number + 1
                        || block.timestamp_ms <= parent.timestamp_ms
                    {
                        return false;
                    }
                }
            }
            if !self.validators.is_empty() && !self.validators.contains(&block.proposer) {
                return false;
            }
            if self.signature_mode == SignatureMode::Enforce {
                match &block.signature {
                    None => return false,
                    Some(sig) => {
                        let addr = coc_common::Address::from_slice(&block.proposer.as_bytes()[12..]);
                        if !verify_node_sig(&block_message(block.hash), sig, addr) {
                            return false;
                        }
                    }
                }
            }
            prev = Some(block);
        }
        true
    }

    pub fn finalized_height(&self) -> u64 {
        self.tip.read().finalized_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coc_storage::backend::memory::InMemoryStore;
    use std::sync::Arc as StdArc;

    fn test_engine() -> ChainEngine {
        let store: StdArc<dyn coc_storage::KvStore> = StdArc::new(InMemoryStore::new());
        let index = StdArc::new(BlockIndex::new(store));
        let evm = StdArc::new(ExecutionEngine::create(1));
        let mempool = StdArc::new(Mempool::new(1, U256::zero()));
        ChainEngine::new(
            1,
            H256::zero(),
            vec![],
            3,
            SignatureMode::Off,
            evm,
            index,
            mempool,
            Box::new(|| 1_000_000),
        )
    }

    #[tokio::test]
    async fn propose_and_apply_first_block() {
        let engine = test_engine();
        let block = engine.propose_next_block(100, |_| None).await.unwrap();
        assert_eq!(block.number, 1);
        assert_eq!(block.parent_hash, H256::zero());
        assert_eq!(block.cumulative_weight, 1);
        assert_eq!(engine.height(), 1);
    }

    #[tokio::test]
    async fn applying_same_block_twice_is_idempotent() {
        let engine = test_engine();
        let block = (*engine.propose_next_block(100, |_| None).await.unwrap()).clone();
        let result = engine.apply_block(block, false).await;
        assert!(result.is_ok());
        assert_eq!(engine.height(), 1);
    }

    #[tokio::test]
    async fn rejects_wrong_proposer() {
        let engine = test_engine();
        let mut block = Block {
            number: 1,
            hash: H256::zero(),
            parent_hash: H256::zero(),
            proposer: H256::from_low_u64_be(999),
            timestamp_ms: 1,
            txs: vec![],
            base_fee: U256::from(GENESIS_BASE_FEE_WEI),
            gas_used: U256::zero(),
            cumulative_weight: 1,
            finalized: false,
            signature: None,
        };
        block.hash = block.compute_hash();
        assert!(matches!(
            engine.apply_block(block, true).await,
            Err(ChainError::InvalidProposer)
        ));
    }

    #[tokio::test]
    async fn rejects_tampered_hash() {
        let engine = test_engine();
        let mut block = Block {
            number: 1,
            hash: H256::zero(),
            parent_hash: H256::zero(),
            proposer: H256::zero(),
            timestamp_ms: 1,
            txs: vec![],
            base_fee: U256::from(GENESIS_BASE_FEE_WEI),
            gas_used: U256::zero(),
            cumulative_weight: 1,
            finalized: false,
            signature: None,
        };
        block.hash = block.compute_hash();
        block.hash.0[0] ^= 0xFF;
        assert!(matches!(
            engine.apply_block(block, true).await,
            Err(ChainError::InvalidHash)
        ));
    }
}
