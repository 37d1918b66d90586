//! Relayer and dispute observer (C12): finalizes epochs once their dispute
//! window has elapsed and dispatches liveness slashes derived from scoring;
//! the dispute observer challenges batches that omit a provable receipt.

use coc_common::{Address, EpochId, NodeId, SlashEvidence, H256};
use tracing::{info, warn};

use crate::error::SettlementError;
use crate::state::SettlementState;

/// A node's combined PoSe score for one epoch (computed by the PoSe engine;
/// passed in rather than recomputed here to keep this crate decoupled from
/// `coc-pose`).
#[derive(Debug, Clone, Copy)]
pub struct NodeScore {
    pub node_id: NodeId,
    pub combined_score: f64,
}

/// Below this combined score a node is liveness-slashed (reason code 3, 5%).
pub const LIVENESS_SLASH_THRESHOLD: f64 = 0.5;
const LIVENESS_REASON_CODE: u8 = 3;

pub struct Relayer {
    slasher_identity: Address,
}

impl Relayer {
    pub fn new(slasher_identity: Address) -> Self {
        Self { slasher_identity }
    }

    /// Finalizes every epoch whose dispute window has elapsed and has no
    /// outstanding disputed batches blocking it, starting at `from_epoch`.
    pub fn try_finalize_epoch(&self, state: &SettlementState, epoch_id: EpochId, current_epoch: EpochId) -> Result<u32, SettlementError> {
        let count = state.finalize_epoch(epoch_id, current_epoch)?;
        info!(epoch_id, valid_batches = count, "epoch finalized");
        Ok(count)
    }

    /// Submits a liveness slash for every node whose combined score fell
    /// below the threshold this epoch.
    pub fn dispatch_liveness_slashes(&self, state: &SettlementState, scores: &[NodeScore]) {
        for score in scores {
            if score.combined_score >= LIVENESS_SLASH_THRESHOLD {
                continue;
            }
            let evidence = SlashEvidence {
                node_id: score.node_id,
                evidence_hash: coc_common::keccak256(
                    format!("liveness:{:.4}", score.combined_score).as_bytes(),
                ),
                reason_code: LIVENESS_REASON_CODE,
                raw_evidence: format!("liveness:{:.4}", score.combined_score).into_bytes(),
            };
            match state.slash(self.slasher_identity, evidence) {
                Ok(amount) => info!(node_id = ?score.node_id, ?amount, "liveness slash applied"),
                Err(e) => warn!(node_id = ?score.node_id, error = %e, "liveness slash failed"),
            }
        }
    }
}

/// Watches finalized/pending batches for an omission the observer can prove:
/// a receipt leaf known to the observer but absent from the batch's sampled
/// set, proving the aggregator should have included it.
pub struct DisputeObserver {
    observer_identity: Address,
}

impl DisputeObserver {
    pub fn new(observer_identity: Address) -> Self {
        Self { observer_identity }
    }

    pub fn challenge_if_omitted(
        &self,
        state: &SettlementState,
        batch_id: H256,
        known_leaf: H256,
        known_leaf_proof: Vec<H256>,
        current_epoch: EpochId,
    ) -> Result<bool, SettlementError> {
        let _ = self.observer_identity;
        match state.challenge_batch(self.observer_identity, batch_id, known_leaf, known_leaf_proof, current_epoch) {
            Ok(()) => Ok(true),
            Err(SettlementError::InvalidBatch) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coc_common::MIN_BOND_WEI;
    use coc_common::U256;

    #[test]
    fn dispatches_liveness_slash_below_threshold() {
        let state = SettlementState::new();
        let op = Address::from_low_u64_be(1);
        let node_id = state
            .register_node(op, vec![1u8; 64], 0, H256::zero(), H256::from_low_u64_be(1), H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();

        let slasher = Address::from_low_u64_be(2);
        state.set_slasher(slasher, true);
        let relayer = Relayer::new(slasher);
        relayer.dispatch_liveness_slashes(&state, &[NodeScore { node_id, combined_score: 0.2 }]);

        let node = state.get_node(node_id).unwrap();
        assert!(node.bond_amount < U256::from(MIN_BOND_WEI));
    }

    #[test]
    fn skips_nodes_above_threshold() {
        let state = SettlementState::new();
        let op = Address::from_low_u64_be(1);
        let node_id = state
            .register_node(op, vec![1u8; 64], 0, H256::zero(), H256::from_low_u64_be(1), H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();
        let slasher = Address::from_low_u64_be(2);
        state.set_slasher(slasher, true);
        let relayer = Relayer::new(slasher);
        relayer.dispatch_liveness_slashes(&state, &[NodeScore { node_id, combined_score: 0.9 }]);

        let node = state.get_node(node_id).unwrap();
        assert_eq!(node.bond_amount, U256::from(MIN_BOND_WEI));
    }
}
