use coc_common::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("libmdbx error: {0}")]
    Libmdbx(#[from] libmdbx::Error),
    #[error("store task panicked: {0}")]
    TaskPanicked(String),
    #[error("store is corrupted: {0}")]
    Corrupted(String),
    #[error("key not found")]
    NotFound,
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Libmdbx(_) | StoreError::TaskPanicked(_) => ErrorKind::Transient,
            StoreError::Corrupted(_) => ErrorKind::CorruptState,
            StoreError::NotFound => ErrorKind::NotFound,
            StoreError::Serialization(_) => ErrorKind::InvalidInput,
        }
    }
}
