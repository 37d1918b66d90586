use coc_common::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("transaction not found: {0:?}")]
    TransactionNotFound(coc_common::H256),
    #[error("re-entrant EVM call rejected")]
    ReentrantCall,
    #[error("revm execution error: {0}")]
    Backend(String),
}

impl EvmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvmError::Reverted(_) => ErrorKind::InvalidInput,
            EvmError::TransactionNotFound(_) => ErrorKind::NotFound,
            EvmError::ReentrantCall => ErrorKind::BugInvariant,
            EvmError::Backend(_) => ErrorKind::Transient,
        }
    }
}
