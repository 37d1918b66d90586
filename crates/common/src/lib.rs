//! Shared primitive types for the chain-of-custody node: blocks, transactions,
//! receipts, mempool entries and the PoSe/settlement entities from the data model.

pub mod block;
pub mod canonical_json;
pub mod errors;
pub mod governance;
pub mod hash;
pub mod pose;
pub mod receipt;
pub mod transaction;

pub use ethereum_types::{Address, H256, U256};

pub use block::Block;
pub use canonical_json::canonical_json_bytes;
pub use errors::ErrorKind;
pub use hash::{keccak256, keccak256_concat};
pub use governance::{GovernanceVote, Proposal, ProposalState, VoteChoice};
pub use pose::{
    BatchRecord, ChallengeMessage, NodeRecord, ReceiptMessage, SampleProof, SlashEvidence,
};
pub use receipt::{logs_bloom, Log, Receipt};
pub use transaction::{MempoolEntry, RawTransaction};

/// A node identifier: `keccak256(pubkey)`.
pub type NodeId = H256;

/// Epoch index: `floor(unix_seconds / EPOCH_SECONDS)`.
pub type EpochId = u64;

/// Epoch length in seconds, per the GLOSSARY's default.
pub const EPOCH_SECONDS: u64 = 3600;

/// Number of epochs in the settlement dispute window.
pub const DISPUTE_WINDOW_EPOCHS: u64 = 2;

/// Block gas limit used by the base-fee controller and apply-time enforcement.
pub const BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Minimum bond per registered node (wei), doubled per additional node an operator runs.
pub const MIN_BOND_WEI: u128 = 100_000_000_000_000_000; // 0.1 ETH

/// Maximum nodes a single operator address may register.
pub const MAX_NODES_PER_OPERATOR: u32 = 5;

/// Default finality depth: blocks older than `tip - depth` are irreversible.
pub const DEFAULT_FINALITY_DEPTH: u64 = 3;

pub fn current_epoch(now_unix_secs: u64) -> EpochId {
    now_unix_secs / EPOCH_SECONDS
}
