use coc_common::ErrorKind;

/// Settlement contract error taxonomy (§4.13).
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("invalid node id")]
    InvalidNodeId,
    #[error("node already registered")]
    NodeAlreadyRegistered,
    #[error("node not found")]
    NodeNotFound,
    #[error("caller is not the node operator")]
    NotNodeOperator,
    #[error("caller is not an authorized slasher")]
    NotSlasher,
    #[error("invalid batch")]
    InvalidBatch,
    #[error("batch already submitted")]
    BatchAlreadySubmitted,
    #[error("batch already disputed")]
    BatchAlreadyDisputed,
    #[error("batch already finalized")]
    BatchAlreadyFinalized,
    #[error("invalid epoch")]
    InvalidEpoch,
    #[error("dispute window closed")]
    DisputeWindowClosed,
    #[error("dispute window has not elapsed")]
    DisputeWindowNotElapsed,
    #[error("epoch already finalized")]
    EpochAlreadyFinalized,
    #[error("no finalizable batch in epoch")]
    NoFinalizableBatch,
    #[error("invalid slash evidence")]
    InvalidSlashEvidence,
    #[error("evidence already used")]
    EvidenceAlreadyUsed,
    #[error("node is already unbonding")]
    AlreadyUnbonding,
    #[error("unlock epoch not reached")]
    UnlockNotReached,
    #[error("no bond to withdraw")]
    NoBondToWithdraw,
    #[error("bond transfer failed")]
    TransferFailed,
    #[error("insufficient bond")]
    InsufficientBond,
    #[error("operator has reached the node cap")]
    TooManyNodes,
    #[error("invalid ownership proof")]
    InvalidOwnershipProof,
    #[error("endpoint commitment already registered")]
    EndpointAlreadyRegistered,
    #[error("node not eligible for slashing")]
    NodeNotSlashable,
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        use SettlementError::*;
        match self {
            InvalidNodeId | InvalidBatch | InvalidEpoch | InvalidSlashEvidence
            | InvalidOwnershipProof => ErrorKind::InvalidInput,
            NodeAlreadyRegistered | BatchAlreadySubmitted | BatchAlreadyDisputed
            | BatchAlreadyFinalized | EpochAlreadyFinalized | EvidenceAlreadyUsed
            | AlreadyUnbonding | EndpointAlreadyRegistered => ErrorKind::Conflict,
            NodeNotFound => ErrorKind::NotFound,
            NotNodeOperator | NotSlasher => ErrorKind::AuthFailure,
            DisputeWindowClosed | DisputeWindowNotElapsed | UnlockNotReached
            | NoFinalizableBatch | NoBondToWithdraw | InsufficientBond | TooManyNodes
            | NodeNotSlashable => ErrorKind::Precondition,
            TransferFailed => ErrorKind::Transient,
        }
    }
}
