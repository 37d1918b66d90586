//! Governance proposal/vote entities. The governance contract itself is an
//! external collaborator (§1); this crate only carries the shapes the chain
//! engine and RPC surface need to reference it.

use serde::{Deserialize, Serialize};

use crate::{Address, H256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    Pending,
    Approved,
    Rejected,
    Queued,
    Executed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub kind: String,
    pub title: String,
    pub description_hash: H256,
    pub execution_target: Option<Address>,
    #[serde(with = "crate::transaction::hex_bytes")]
    pub execution_calldata: Vec<u8>,
    pub proposer: Address,
    pub created_at_block: u64,
    pub voting_deadline: u64,
    pub state: ProposalState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceVote {
    pub proposal_id: u64,
    pub voter: Address,
    pub choice: VoteChoice,
}
