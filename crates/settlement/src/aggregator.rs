//! PoSe aggregator (C12): builds one epoch's Merkle batch from accepted
//! receipts and submits it to the settlement state.

use coc_common::{canonical_json_bytes, keccak256_concat, EpochId, NodeId, ReceiptMessage, SampleProof, H256};
use coc_crypto::{merkle_proof, merkle_root, sample_commitment_fold};

use crate::error::SettlementError;
use crate::state::SettlementState;

/// `leaf = keccak256(canonical(receipt))`.
pub fn receipt_leaf(receipt: &ReceiptMessage) -> H256 {
    let value = serde_json::to_value(receipt).expect("ReceiptMessage serializes");
    coc_common::keccak256(&canonical_json_bytes(&value))
}

/// Picks a deterministic sample of leaf indices, seeded by
/// `keccak256(epochId || aggregatorId)`, targeting roughly 10% of the set
/// (at least one, at most the full set).
pub fn pick_sample_indices(leaf_count: usize, epoch_id: EpochId, aggregator: NodeId) -> Vec<usize> {
    if leaf_count == 0 {
        return vec![];
    }
    let target = (leaf_count / 10).max(1).min(leaf_count);
    let seed = keccak256_concat(&[&epoch_id.to_be_bytes(), aggregator.as_bytes()]);

    let mut picked = std::collections::BTreeSet::new();
    let mut counter: u64 = 0;
    while picked.len() < target {
        let digest = keccak256_concat(&[seed.as_bytes(), &counter.to_be_bytes()]);
        let idx = (u64::from_be_bytes(digest.as_bytes()[..8].try_into().unwrap()) as usize) % leaf_count;
        picked.insert(idx);
        counter += 1;
        if counter > (leaf_count as u64) * 64 {
            break; // degenerate safeguard; should never trigger for realistic leaf_count
        }
    }
    picked.into_iter().collect()
}

/// Builds and submits the batch for one epoch's accepted receipts.
pub fn build_and_submit_batch(
    state: &SettlementState,
    receipts: &[ReceiptMessage],
    epoch_id: EpochId,
    aggregator: NodeId,
    current_epoch: EpochId,
) -> Result<H256, SettlementError> {
    let leaves: Vec<H256> = receipts.iter().map(receipt_leaf).collect();
    let root = merkle_root(&leaves);

    let sample_indices = pick_sample_indices(leaves.len(), epoch_id, aggregator);
    let sample_proofs: Vec<SampleProof> = sample_indices
        .into_iter()
        .map(|idx| SampleProof {
            leaf: leaves[idx],
            merkle_proof: merkle_proof(&leaves, idx),
            leaf_index: idx as u32,
        })
        .collect();

    let fold = sample_commitment_fold(
        &sample_proofs.iter().map(|p| (p.leaf_index, p.leaf)).collect::<Vec<_>>(),
    );
    let summary_hash = keccak256_concat(&[
        &epoch_id.to_be_bytes(),
        root.as_bytes(),
        fold.as_bytes(),
        &(sample_proofs.len() as u64).to_be_bytes(),
    ]);

    state.submit_batch(epoch_id, root, summary_hash, sample_proofs, aggregator, current_epoch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(n: u64) -> ReceiptMessage {
        ReceiptMessage {
            challenge_id: H256::from_low_u64_be(n),
            node_id: H256::from_low_u64_be(1),
            response_at_ms: n,
            response_body: vec![],
            node_sig: vec![0u8; 65],
        }
    }

    #[test]
    fn sample_indices_are_deterministic_and_sorted() {
        let receipts: Vec<_> = (0..20).map(receipt).collect();
        let a = pick_sample_indices(receipts.len(), 5, H256::from_low_u64_be(1));
        let b = pick_sample_indices(receipts.len(), 5, H256::from_low_u64_be(1));
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn builds_and_submits_a_valid_batch() {
        let state = SettlementState::new();
        let receipts: Vec<_> = (0..10).map(receipt).collect();
        let aggregator = H256::from_low_u64_be(1);
        let batch_id = build_and_submit_batch(&state, &receipts, 0, aggregator, 0).unwrap();
        assert!(state.get_batch(batch_id).is_some());
    }
}
