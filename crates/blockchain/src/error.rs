use coc_common::{ErrorKind, H256};
use coc_storage::StoreError;
use coc_vm::EvmError;

#[derive(Debug, thiserror::Error)]
pub enum MempoolError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("chain id mismatch: expected {0}")]
    ChainIdMismatch(u64),
    #[error("transaction already pending")]
    AlreadyPending,
    #[error("transaction already confirmed")]
    AlreadyConfirmed,
    #[error("nonce too low")]
    NonceTooLow,
    #[error("gas price below floor")]
    GasPriceTooLow,
}

impl MempoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MempoolError::InvalidSignature => ErrorKind::AuthFailure,
            MempoolError::ChainIdMismatch(_) | MempoolError::GasPriceTooLow => {
                ErrorKind::InvalidInput
            }
            MempoolError::AlreadyPending | MempoolError::AlreadyConfirmed => ErrorKind::Conflict,
            MempoolError::NonceTooLow => ErrorKind::Precondition,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("duplicate block, already applied")]
    DuplicateBlock,
    #[error("invalid block link: expected number {expected_number} parent {expected_parent:?}")]
    InvalidLink {
        expected_number: u64,
        expected_parent: H256,
    },
    #[error("invalid proposer")]
    InvalidProposer,
    #[error("missing proposer signature")]
    MissingSignature,
    #[error("invalid proposer signature")]
    InvalidSignature,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("recomputed hash does not match declared hash")]
    InvalidHash,
    #[error("block gas used {used} exceeds limit {limit}")]
    GasLimitExceeded { used: u64, limit: u64 },
    #[error("declared gasUsed {declared} does not match measured {measured}")]
    GasUsedMismatch { declared: u64, measured: u64 },
    #[error("re-entrant applyBlock call rejected")]
    ReentrantApply,
    #[error(transparent)]
    Evm(#[from] EvmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::DuplicateBlock => ErrorKind::Conflict,
            ChainError::InvalidLink { .. }
            | ChainError::InvalidProposer
            | ChainError::InvalidTimestamp
            | ChainError::InvalidHash
            | ChainError::GasLimitExceeded { .. }
            | ChainError::GasUsedMismatch { .. } => ErrorKind::InvalidInput,
            ChainError::MissingSignature | ChainError::InvalidSignature => ErrorKind::AuthFailure,
            ChainError::ReentrantApply => ErrorKind::BugInvariant,
            ChainError::Evm(e) => e.kind(),
            ChainError::Store(e) => e.kind(),
            ChainError::Mempool(e) => e.kind(),
        }
    }
}
