//! Batch lifecycle: submit → (optional dispute) → finalize (§4.13, §3 `BatchRecord`).

use std::collections::{HashMap, HashSet};

use coc_common::{keccak256_concat, BatchRecord, EpochId, NodeId, SampleProof, H256, DISPUTE_WINDOW_EPOCHS};
use coc_crypto::verify_merkle_proof;

use crate::error::SettlementError;

#[derive(Default)]
pub struct BatchRegistry {
    batches: HashMap<H256, BatchRecord>,
    by_epoch: HashMap<EpochId, Vec<H256>>,
    replay_keys: HashSet<H256>,
    epoch_finalized: HashMap<EpochId, bool>,
    epoch_settlement_root: HashMap<EpochId, H256>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, batch_id: H256) -> Option<&BatchRecord> {
        self.batches.get(&batch_id)
    }

    pub fn epoch_batch_ids(&self, epoch_id: EpochId) -> Vec<H256> {
        self.by_epoch.get(&epoch_id).cloned().unwrap_or_default()
    }

    pub fn epoch_finalized(&self, epoch_id: EpochId) -> bool {
        *self.epoch_finalized.get(&epoch_id).unwrap_or(&false)
    }

    pub fn epoch_settlement_root(&self, epoch_id: EpochId) -> H256 {
        *self.epoch_settlement_root.get(&epoch_id).unwrap_or(&H256::zero())
    }

    /// Is `leaf_index` one of `batch_id`'s sampled leaf positions?
    pub fn is_sample_leaf(&self, batch_id: H256, leaf_index: u32) -> bool {
        self.batches
            .get(&batch_id)
            .map(|b| b.sample_proofs.iter().any(|p| p.leaf_index == leaf_index))
            .unwrap_or(false)
    }

    pub fn submit_batch(
        &mut self,
        epoch_id: EpochId,
        merkle_root: H256,
        summary_hash: H256,
        sample_proofs: Vec<SampleProof>,
        aggregator: NodeId,
        current_epoch: EpochId,
    ) -> Result<H256, SettlementError> {
        if epoch_id > current_epoch {
            return Err(SettlementError::InvalidEpoch);
        }
        if self.epoch_finalized(epoch_id) {
            return Err(SettlementError::EpochAlreadyFinalized);
        }
        if merkle_root.is_zero() || summary_hash.is_zero() {
            return Err(SettlementError::InvalidBatch);
        }
        if sample_proofs.is_empty() || sample_proofs.len() > 65_535 {
            return Err(SettlementError::InvalidBatch);
        }

        let mut seen_leaves = HashSet::new();
        let mut last_index: Option<u32> = None;
        for proof in &sample_proofs {
            if proof.leaf.is_zero() {
                return Err(SettlementError::InvalidBatch);
            }
            if let Some(prev) = last_index {
                if proof.leaf_index <= prev {
                    return Err(SettlementError::InvalidBatch);
                }
            }
            last_index = Some(proof.leaf_index);
            if !seen_leaves.insert(proof.leaf) {
                return Err(SettlementError::InvalidBatch);
            }
            if !verify_merkle_proof(&proof.merkle_proof, merkle_root, proof.leaf) {
                return Err(SettlementError::InvalidBatch);
            }
        }

        let fold = coc_crypto::sample_commitment_fold(
            &sample_proofs.iter().map(|p| (p.leaf_index, p.leaf)).collect::<Vec<_>>(),
        );
        let expected_summary = keccak256_concat(&[
            &epoch_id.to_be_bytes(),
            merkle_root.as_bytes(),
            fold.as_bytes(),
            &(sample_proofs.len() as u64).to_be_bytes(),
        ]);
        if expected_summary != summary_hash {
            return Err(SettlementError::InvalidBatch);
        }

        let batch_id = BatchRecord::compute_batch_id(epoch_id, merkle_root, summary_hash, aggregator);
        if self.batches.contains_key(&batch_id) {
            return Err(SettlementError::BatchAlreadySubmitted);
        }

        let record = BatchRecord {
            batch_id,
            epoch_id,
            merkle_root,
            summary_hash,
            aggregator,
            submitted_at_epoch: current_epoch,
            dispute_deadline_epoch: current_epoch + DISPUTE_WINDOW_EPOCHS,
            finalized: false,
            disputed: false,
            sample_proofs,
        };
        self.batches.insert(batch_id, record);
        self.by_epoch.entry(epoch_id).or_default().push(batch_id);
        Ok(batch_id)
    }

    pub fn challenge_batch(
        &mut self,
        batch_id: H256,
        receipt_leaf: H256,
        merkle_proof: Vec<H256>,
        current_epoch: EpochId,
    ) -> Result<(), SettlementError> {
        let batch = self.batches.get(&batch_id).ok_or(SettlementError::InvalidBatch)?;
        if batch.finalized {
            return Err(SettlementError::BatchAlreadyFinalized);
        }
        if batch.disputed {
            return Err(SettlementError::BatchAlreadyDisputed);
        }
        if current_epoch > batch.dispute_deadline_epoch {
            return Err(SettlementError::DisputeWindowClosed);
        }
        if !verify_merkle_proof(&merkle_proof, batch.merkle_root, receipt_leaf) {
            return Err(SettlementError::InvalidBatch);
        }
        // The challenged leaf proves an omission: it must NOT be among the
        // batch's own sampled leaves.
        if batch.sample_proofs.iter().any(|p| p.leaf == receipt_leaf) {
            return Err(SettlementError::InvalidBatch);
        }

        let batch = self.batches.get_mut(&batch_id).unwrap();
        batch.disputed = true;
        Ok(())
    }

    /// Finalizes every undisputed, past-deadline batch in `epoch_id`, folding
    /// each into a rolling settlement root. Requires at least one valid batch.
    pub fn finalize_epoch(&mut self, epoch_id: EpochId, current_epoch: EpochId) -> Result<u32, SettlementError> {
        if self.epoch_finalized(epoch_id) {
            return Err(SettlementError::EpochAlreadyFinalized);
        }
        if current_epoch <= epoch_id + DISPUTE_WINDOW_EPOCHS {
            return Err(SettlementError::DisputeWindowNotElapsed);
        }

        let batch_ids = self.epoch_batch_ids(epoch_id);
        let mut root = self.epoch_settlement_root(epoch_id);
        let mut valid_count = 0u32;

        for batch_id in batch_ids {
            let batch = self.batches.get(&batch_id).unwrap();
            if batch.disputed || batch.finalized {
                continue;
            }
            if current_epoch <= batch.dispute_deadline_epoch {
                continue;
            }
            root = keccak256_concat(&[
                root.as_bytes(),
                batch.summary_hash.as_bytes(),
                batch.merkle_root.as_bytes(),
                batch.aggregator.as_bytes(),
            ]);
            valid_count += 1;
            self.batches.get_mut(&batch_id).unwrap().finalized = true;
        }

        if valid_count == 0 {
            return Err(SettlementError::NoFinalizableBatch);
        }

        self.epoch_settlement_root.insert(epoch_id, root);
        self.epoch_finalized.insert(epoch_id, true);
        Ok(valid_count)
    }

    pub fn check_and_record_replay(&mut self, key: H256) -> bool {
        self.replay_keys.insert(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coc_crypto::{merkle_proof, merkle_root};

    fn two_leaf_batch() -> (H256, H256, Vec<SampleProof>) {
        let l1 = H256::from([1u8; 32]);
        let l2 = H256::from([2u8; 32]);
        let leaves = vec![l1, l2];
        let root = merkle_root(&leaves);
        let proofs = vec![
            SampleProof { leaf: l1, merkle_proof: merkle_proof(&leaves, 0), leaf_index: 0 },
            SampleProof { leaf: l2, merkle_proof: merkle_proof(&leaves, 1), leaf_index: 1 },
        ];
        let fold = coc_crypto::sample_commitment_fold(&[(0, l1), (1, l2)]);
        let summary = keccak256_concat(&[&0u64.to_be_bytes(), root.as_bytes(), fold.as_bytes(), &2u64.to_be_bytes()]);
        (root, summary, proofs)
    }

    #[test]
    fn submits_and_finalizes_a_valid_batch() {
        let mut reg = BatchRegistry::new();
        let (root, summary, proofs) = two_leaf_batch();
        let aggregator = H256::from_low_u64_be(1);
        reg.submit_batch(0, root, summary, proofs, aggregator, 0).unwrap();

        assert!(matches!(
            reg.finalize_epoch(0, 2),
            Err(SettlementError::DisputeWindowNotElapsed)
        ));
        let count = reg.finalize_epoch(0, 3).unwrap();
        assert_eq!(count, 1);
        assert!(reg.epoch_finalized(0));
        assert_ne!(reg.epoch_settlement_root(0), H256::zero());
    }

    #[test]
    fn rejects_duplicate_submission() {
        let mut reg = BatchRegistry::new();
        let (root, summary, proofs) = two_leaf_batch();
        let aggregator = H256::from_low_u64_be(1);
        reg.submit_batch(0, root, summary, proofs.clone(), aggregator, 0).unwrap();
        assert!(matches!(
            reg.submit_batch(0, root, summary, proofs, aggregator, 0),
            Err(SettlementError::BatchAlreadySubmitted)
        ));
    }
}
