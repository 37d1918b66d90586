//! The settlement contract's top-level state (§4.13): wires node lifecycle,
//! batch lifecycle and slashing together behind the ABI-shaped entry points
//! the chain engine calls when a transaction targets the settlement system
//! address (§13.3 of the expanded spec).

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use coc_common::{Address, BatchRecord, EpochId, NodeId, NodeRecord, SampleProof, SlashEvidence, H256, U256};

use crate::batch::BatchRegistry;
use crate::error::SettlementError;
use crate::node_registry::NodeRegistry;
use crate::slashing::{evidence_is_valid, slash_amount};

struct Inner {
    nodes: NodeRegistry,
    batches: BatchRegistry,
    slashers: HashSet<Address>,
    slash_replay_keys: HashSet<H256>,
}

pub struct SettlementState {
    inner: RwLock<Inner>,
}

impl SettlementState {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: NodeRegistry::new(),
                batches: BatchRegistry::new(),
                slashers: HashSet::new(),
                slash_replay_keys: HashSet::new(),
            }),
        }
    }

    pub fn set_slasher(&self, slasher: Address, enabled: bool) {
        let mut inner = self.inner.write();
        if enabled {
            inner.slashers.insert(slasher);
        } else {
            inner.slashers.remove(&slasher);
        }
    }

    pub fn required_bond(&self, operator: Address) -> U256 {
        self.inner.read().nodes.required_bond(operator)
    }

    pub fn get_node(&self, node_id: H256) -> Option<NodeRecord> {
        self.inner.read().nodes.get(node_id).cloned()
    }

    pub fn get_batch(&self, batch_id: H256) -> Option<BatchRecord> {
        self.inner.read().batches.get(batch_id).cloned()
    }

    pub fn get_epoch_batch_ids(&self, epoch_id: EpochId) -> Vec<H256> {
        self.inner.read().batches.epoch_batch_ids(epoch_id)
    }

    pub fn get_batch_sample_info(&self, batch_id: H256) -> Option<Vec<SampleProof>> {
        self.inner.read().batches.get(batch_id).map(|b| b.sample_proofs.clone())
    }

    pub fn is_sample_leaf(&self, batch_id: H256, leaf_index: u32) -> bool {
        self.inner.read().batches.is_sample_leaf(batch_id, leaf_index)
    }

    pub fn epoch_finalized(&self, epoch_id: EpochId) -> bool {
        self.inner.read().batches.epoch_finalized(epoch_id)
    }

    pub fn epoch_settlement_root(&self, epoch_id: EpochId) -> H256 {
        self.inner.read().batches.epoch_settlement_root(epoch_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn register_node(
        &self,
        operator: Address,
        pubkey: Vec<u8>,
        service_flags: u8,
        service_commitment: H256,
        endpoint_commitment: H256,
        metadata_hash: H256,
        bond_sent: U256,
        current_epoch: EpochId,
        ownership_proof_valid: bool,
    ) -> Result<H256, SettlementError> {
        self.inner.write().nodes.register(
            operator,
            pubkey,
            service_flags,
            service_commitment,
            endpoint_commitment,
            metadata_hash,
            bond_sent,
            current_epoch,
            ownership_proof_valid,
        )
    }

    pub fn update_commitment(&self, node_id: H256, caller: Address, service_commitment: H256) -> Result<(), SettlementError> {
        self.inner.write().nodes.update_commitment(node_id, caller, service_commitment)
    }

    pub fn request_unbond(&self, node_id: H256, caller: Address, current_epoch: EpochId) -> Result<(), SettlementError> {
        self.inner.write().nodes.request_unbond(node_id, caller, current_epoch)
    }

    pub fn withdraw(&self, node_id: H256, caller: Address, current_epoch: EpochId) -> Result<U256, SettlementError> {
        self.inner.write().nodes.withdraw(node_id, caller, current_epoch)
    }

    pub fn submit_batch(
        &self,
        epoch_id: EpochId,
        merkle_root: H256,
        summary_hash: H256,
        sample_proofs: Vec<SampleProof>,
        aggregator: NodeId,
        current_epoch: EpochId,
    ) -> Result<H256, SettlementError> {
        self.inner
            .write()
            .batches
            .submit_batch(epoch_id, merkle_root, summary_hash, sample_proofs, aggregator, current_epoch)
    }

    pub fn challenge_batch(
        &self,
        caller: Address,
        batch_id: H256,
        receipt_leaf: H256,
        merkle_proof: Vec<H256>,
        current_epoch: EpochId,
    ) -> Result<(), SettlementError> {
        let inner = &mut *self.inner.write();
        if !inner.slashers.contains(&caller) {
            return Err(SettlementError::NotSlasher);
        }
        inner.batches.challenge_batch(batch_id, receipt_leaf, merkle_proof, current_epoch)
    }

    pub fn finalize_epoch(&self, epoch_id: EpochId, current_epoch: EpochId) -> Result<u32, SettlementError> {
        self.inner.write().batches.finalize_epoch(epoch_id, current_epoch)
    }

    /// `slash(nodeId, evidence)`: slasher-role only; validates evidence,
    /// checks the replay key, deducts `slashAmount` from the node's bond.
    pub fn slash(&self, caller: Address, evidence: SlashEvidence) -> Result<U256, SettlementError> {
        let mut inner = self.inner.write();
        if !inner.slashers.contains(&caller) {
            return Err(SettlementError::NotSlasher);
        }
        if !evidence_is_valid(&evidence) {
            return Err(SettlementError::InvalidSlashEvidence);
        }
        let node = inner.nodes.get(evidence.node_id).ok_or(SettlementError::NodeNotFound)?;
        if node.bond_amount.is_zero() {
            return Err(SettlementError::NodeNotSlashable);
        }
        let bond = node.bond_amount;

        let replay_key = SlashEvidence::replay_key(evidence.node_id, evidence.reason_code, evidence.evidence_hash);
        if inner.slash_replay_keys.contains(&replay_key) {
            return Err(SettlementError::EvidenceAlreadyUsed);
        }
        inner.slash_replay_keys.insert(replay_key);

        let amount = slash_amount(bond, evidence.reason_code);
        inner.nodes.apply_slash(evidence.node_id, amount)
    }
}

impl Default for SettlementState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coc_common::MIN_BOND_WEI;

    fn register_one(state: &SettlementState) -> (Address, H256) {
        let op = Address::from_low_u64_be(1);
        let node_id = state
            .register_node(op, vec![1u8; 64], 0, H256::zero(), H256::from_low_u64_be(1), H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();
        (op, node_id)
    }

    #[test]
    fn slash_requires_slasher_role() {
        let state = SettlementState::new();
        let (_op, node_id) = register_one(&state);
        let caller = Address::from_low_u64_be(99);
        let evidence = SlashEvidence {
            node_id,
            evidence_hash: coc_common::keccak256(b"proof"),
            reason_code: 1,
            raw_evidence: b"proof".to_vec(),
        };
        assert!(matches!(
            state.slash(caller, evidence),
            Err(SettlementError::NotSlasher)
        ));
    }

    #[test]
    fn slash_rejects_replayed_evidence() {
        let state = SettlementState::new();
        let (_op, node_id) = register_one(&state);
        let slasher = Address::from_low_u64_be(2);
        state.set_slasher(slasher, true);

        let evidence = SlashEvidence {
            node_id,
            evidence_hash: coc_common::keccak256(b"proof"),
            reason_code: 1,
            raw_evidence: b"proof".to_vec(),
        };
        state.slash(slasher, evidence.clone()).unwrap();
        assert!(matches!(
            state.slash(slasher, evidence),
            Err(SettlementError::EvidenceAlreadyUsed)
        ));
    }

    #[test]
    fn endpoint_sybil_protection() {
        let state = SettlementState::new();
        let endpoint = H256::from_low_u64_be(7);
        let op1 = Address::from_low_u64_be(1);
        let op2 = Address::from_low_u64_be(2);
        state
            .register_node(op1, vec![1u8; 64], 0, H256::zero(), endpoint, H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap();
        let err = state
            .register_node(op2, vec![2u8; 64], 0, H256::zero(), endpoint, H256::zero(), U256::from(MIN_BOND_WEI), 0, true)
            .unwrap_err();
        assert!(matches!(err, SettlementError::EndpointAlreadyRegistered));
    }
}
