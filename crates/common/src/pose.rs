//! PoSe and settlement entities (§3): node registry records, batches, sample
//! proofs, slash evidence, and the challenge/receipt wire messages.

use serde::{Deserialize, Serialize};

use crate::transaction::hex_bytes;
use crate::{keccak256_concat, Address, EpochId, NodeId, H256, U256};

/// A node's registration record as held by the settlement state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: NodeId,
    /// The registering address; owns `operatorNodeCount`/`requiredBond` accounting.
    pub operator: Address,
    #[serde(with = "hex_bytes")]
    pub pubkey: Vec<u8>,
    pub service_flags: u8,
    pub service_commitment: H256,
    pub endpoint_commitment: H256,
    pub bond_amount: U256,
    pub metadata_hash: H256,
    pub registered_at_epoch: EpochId,
    pub unlock_epoch: EpochId,
    pub active: bool,
    pub unbond_requested: bool,
}

impl NodeRecord {
    pub fn compute_node_id(pubkey: &[u8]) -> NodeId {
        crate::keccak256(pubkey)
    }
}

/// A Merkle commitment to one epoch's accepted PoSe receipts, submitted by an aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: H256,
    pub epoch_id: EpochId,
    pub merkle_root: H256,
    pub summary_hash: H256,
    pub aggregator: NodeId,
    pub submitted_at_epoch: EpochId,
    pub dispute_deadline_epoch: EpochId,
    pub finalized: bool,
    pub disputed: bool,
    pub sample_proofs: Vec<SampleProof>,
}

impl BatchRecord {
    pub fn compute_batch_id(
        epoch_id: EpochId,
        merkle_root: H256,
        summary_hash: H256,
        aggregator: NodeId,
    ) -> H256 {
        keccak256_concat(&[
            &epoch_id.to_be_bytes(),
            merkle_root.as_bytes(),
            summary_hash.as_bytes(),
            aggregator.as_bytes(),
        ])
    }
}

/// A receipt's membership proof included in a batch submission (§3 `SampleProof`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleProof {
    pub leaf: H256,
    pub merkle_proof: Vec<H256>,
    pub leaf_index: u32,
}

/// Evidence submitted to justify a slash, replay-protected by a deterministic key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashEvidence {
    pub node_id: NodeId,
    pub evidence_hash: H256,
    pub reason_code: u8,
    #[serde(with = "hex_bytes")]
    pub raw_evidence: Vec<u8>,
}

impl SlashEvidence {
    /// `keccak256("slash-evidence" || nodeId || reasonCode || evidenceHash)`.
    pub fn replay_key(node_id: NodeId, reason_code: u8, evidence_hash: H256) -> H256 {
        keccak256_concat(&[
            b"slash-evidence",
            node_id.as_bytes(),
            &[reason_code],
            evidence_hash.as_bytes(),
        ])
    }
}

/// A challenge issued by a challenger to a node for one epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeMessage {
    pub challenge_id: H256,
    pub node_id: NodeId,
    pub epoch_id: EpochId,
    pub issued_at_ms: u64,
    #[serde(with = "hex_bytes")]
    pub challenger_sig: Vec<u8>,
}

/// A node's signed response to a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptMessage {
    pub challenge_id: H256,
    pub node_id: NodeId,
    pub response_at_ms: u64,
    #[serde(with = "hex_bytes")]
    pub response_body: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub node_sig: Vec<u8>,
}

impl ReceiptMessage {
    /// `keccak256("pose-receipt" || challengeId)` — the replay key checked before acceptance.
    pub fn replay_key(challenge_id: H256) -> H256 {
        keccak256_concat(&[b"pose-receipt", challenge_id.as_bytes()])
    }
}
